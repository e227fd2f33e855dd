//! fdtrace-io: Geometry and calibration files and ray-record output.
//!
//! Geometry files come in two encodings: a JSON document and a compact
//! little-endian binary image read through memmap2. Calibration files are
//! partial JSON overrides of the default camera window.
//!

pub mod binary;
mod error;
mod reader;
pub mod schema;
mod writer;

pub use error::{Error, Result};
pub use reader::{load_calibration, load_geometry, MappedFileReader};
pub use schema::{calibration_from_json, geometry_from_json, geometry_to_json};
pub use writer::{save_geometry, GeometryFileWriter, GeometryFormat, RecordWriter};
