//! Memory-mapped geometry and calibration readers.
//!

use crate::{binary, schema, Error, Result};
use fdtrace_core::{OpticalCalibration, SiteGeometry};
use log::info;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without copying them into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Contents as UTF-8 text.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the file is not valid UTF-8.
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(self.as_bytes()).map_err(|e| {
            Error::InvalidFormat(format!("{} is not UTF-8 text: {e}", self.path.display()))
        })
    }
}

/// Loads a site geometry.
///
/// Files ending in `.json` are parsed as JSON; anything else must be the
/// binary `FDGEOM` format. The whole file is validated before a geometry is
/// returned.
///
/// # Errors
/// Returns an error if the file cannot be read, is malformed, or describes
/// an invalid geometry.
pub fn load_geometry<P: AsRef<Path>>(path: P) -> Result<SiteGeometry> {
    let reader = MappedFileReader::open(&path)?;
    if reader.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "{} is empty",
            reader.path().display()
        )));
    }

    let is_json = reader
        .path()
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let geometry = if is_json {
        schema::geometry_from_json(reader.as_str()?)?
    } else {
        binary::decode(reader.as_bytes())?
    };

    info!(
        "loaded {} geometry {} ({} mirror(s)) from {}",
        geometry.site(),
        geometry.uniq_id(),
        geometry.mirror_count(),
        reader.path().display()
    );
    Ok(geometry)
}

/// Loads a JSON calibration override on top of `base`.
///
/// # Errors
/// Returns an error if the file cannot be read or is invalid.
pub fn load_calibration<P: AsRef<Path>>(
    path: P,
    base: OpticalCalibration,
) -> Result<OpticalCalibration> {
    let reader = MappedFileReader::open(&path)?;
    if reader.is_empty() {
        return Ok(base);
    }
    schema::calibration_from_json(reader.as_str()?, base)
}
