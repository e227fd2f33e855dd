//! Geometry writers and the ray-record text sink.

use crate::{binary, schema, Result};
use fdtrace_core::{OutputTarget, RayRecord, SiteGeometry};
use fdtrace_optics::RecordSink;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// On-disk geometry encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryFormat {
    /// Pretty-printed JSON document.
    Json,
    /// Little-endian `FDGEOM` image.
    Binary,
}

impl GeometryFormat {
    /// Format implied by a file name: `.json` is JSON, anything else binary.
    pub fn from_path(path: &Path) -> Self {
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            GeometryFormat::Json
        } else {
            GeometryFormat::Binary
        }
    }
}

/// Writer for geometry files.
pub struct GeometryFileWriter {
    writer: BufWriter<File>,
}

impl GeometryFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes `geometry` in `format` and flushes.
    ///
    /// # Errors
    /// Returns an error if encoding or writing fails.
    pub fn write(&mut self, geometry: &SiteGeometry, format: GeometryFormat) -> Result<()> {
        match format {
            GeometryFormat::Json => {
                self.writer
                    .write_all(schema::geometry_to_json(geometry)?.as_bytes())?;
                self.writer.write_all(b"\n")?;
            }
            GeometryFormat::Binary => self.writer.write_all(&binary::encode(geometry))?,
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes `geometry` to `path`, choosing the format from the extension.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save_geometry<P: AsRef<Path>>(path: P, geometry: &SiteGeometry) -> Result<()> {
    let format = GeometryFormat::from_path(path.as_ref());
    GeometryFileWriter::create(path)?.write(geometry, format)
}

/// Text sink for ray records, one `<camera> <tube> <x> <y>` line each.
pub struct RecordWriter {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl RecordWriter {
    /// Opens `target` for writing, truncating an existing file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn open(target: &OutputTarget) -> Result<Self> {
        let inner: Box<dyn Write + Send> = match target {
            OutputTarget::Stdout => Box::new(io::stdout()),
            OutputTarget::File(path) => Box::new(File::create(path)?),
        };
        Ok(Self::from_writer(inner))
    }

    /// Wraps an arbitrary destination.
    pub fn from_writer(inner: Box<dyn Write + Send>) -> Self {
        Self {
            writer: BufWriter::new(inner),
        }
    }
}

impl RecordSink for RecordWriter {
    fn write_record(&mut self, record: &RayRecord) -> io::Result<()> {
        writeln!(self.writer, "{record}")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_geometry;
    use fdtrace_core::{SiteId, TraceOutcome, TraceResult};
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(GeometryFormat::from_path(Path::new("a/geobr.JSON")), GeometryFormat::Json);
        assert_eq!(GeometryFormat::from_path(Path::new("geobr.fdg")), GeometryFormat::Binary);
        assert_eq!(GeometryFormat::from_path(Path::new("geobr")), GeometryFormat::Binary);
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempdir().unwrap();
        let geom = SiteGeometry::nominal(SiteId::MiddleDrum, 77, 2).unwrap();
        for name in ["geo.json", "geo.fdg"] {
            let path = dir.path().join(name);
            save_geometry(&path, &geom).unwrap();
            let back = load_geometry(&path).unwrap();
            assert_eq!(back.site(), SiteId::MiddleDrum);
            assert_eq!(back.uniq_id(), 77);
            assert_eq!(back.mirror_count(), 2);
        }
    }

    #[test]
    fn test_record_writer_lines() {
        let dir = tempdir().unwrap();
        let path: PathBuf = dir.path().join("out.txt");
        let target = OutputTarget::File(path.clone());
        let mut writer = RecordWriter::open(&target).unwrap();

        let hit = TraceResult::landed(TraceOutcome::Tube(12), 0.1, -0.05);
        let gap = TraceResult::landed(TraceOutcome::Gap, -0.3, 0.2);
        for result in [hit, gap] {
            let record = RayRecord::from_trace(2, &result, false).unwrap();
            writer.write_record(&record).unwrap();
        }
        writer.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "2 12 0.100000 -0.050000\n2 -2 -0.300000 0.200000\n");
    }
}
