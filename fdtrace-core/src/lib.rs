//! fdtrace-core: Core types for fluorescence-detector point-source ray tracing.
//!
//! This crate provides the data model shared by the optics engine, the file
//! loaders and the command-line driver: station identifiers, mirror and
//! camera geometry, camera-window calibration, run configuration, and the
//! per-ray outcomes and output records.
//!

pub mod calibration;
pub mod error;
pub mod geometry;
pub mod ray;
pub mod run;
pub mod site;

pub use calibration::{OpticalCalibration, OpticalLayer, RaytraceToggles};
pub use error::{Error, Result};
pub use geometry::{
    flips_camera_y, nominal_mirror_ring, MirrorGeometry, SegmentGeometry, SiteGeometry,
    MAX_SEGMENTS,
};
pub use ray::{LossReason, Ray, RayRecord, TraceOutcome, TraceResult, MISSED_TUBE};
pub use run::{
    seed_for_thread, OutputTarget, RefocusParams, RunConfig, SegmentDeflection, SegmentOverrides,
};
pub use site::SiteId;
