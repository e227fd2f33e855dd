//! Run configuration for a point-source ray trace.

use crate::geometry::MAX_SEGMENTS;
use crate::{Error, Result};
use nalgebra::Vector3;
use std::fmt;
use std::path::PathBuf;

/// Default number of trial rays.
pub const DEFAULT_RAYS: u64 = 1_000_000;

/// z of the screen centre on the camera window (meters, mirror frame):
/// nominal curvature radius -6.067 m plus the measured 2.957 m
/// mirror-to-screen distance.
pub const NOMINAL_SCREEN_CENTER_Z: f64 = -3.110;

/// Default base seed of the random streams.
pub const DEFAULT_SEED: u64 = 1;

/// Output name meaning "standard output".
pub const STDOUT_SENTINEL: &str = "NULL";

/// Seed of worker `index` derived from the run's base seed.
#[inline]
pub fn seed_for_thread(base: u64, index: usize) -> u64 {
    base.wrapping_add(index as u64)
}

/// Where ray records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// Interprets a command-line destination; `NULL` selects stdout.
    pub fn from_arg(arg: &str) -> Self {
        if arg == STDOUT_SENTINEL {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(PathBuf::from(arg))
        }
    }
}

impl Default for OutputTarget {
    fn default() -> Self {
        OutputTarget::File(PathBuf::from("out.txt"))
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("standard output"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Angular re-pointing of one facet (degrees).
///
/// Positive azimuth turns the facet's view to the right, positive altitude
/// turns it up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SegmentDeflection {
    pub az_deg: f64,
    pub alt_deg: f64,
}

impl SegmentDeflection {
    /// Creates a deflection.
    #[inline]
    pub fn new(az_deg: f64, alt_deg: f64) -> Self {
        Self { az_deg, alt_deg }
    }

    /// True when both angles are exactly zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.az_deg == 0.0 && self.alt_deg == 0.0
    }
}

/// Per-facet modifications requested for the traced mirror, keyed by
/// facet index in `0..MAX_SEGMENTS`. Unset entries leave the geometry alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentOverrides {
    deflections: [SegmentDeflection; MAX_SEGMENTS],
    spot_deg: [Option<f64>; MAX_SEGMENTS],
    global_spot_deg: Option<f64>,
}

impl SegmentOverrides {
    /// No modifications.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_index(index: usize) -> Result<()> {
        if index < MAX_SEGMENTS {
            Ok(())
        } else {
            Err(Error::parameter(
                "segment",
                format!("index {index} outside 0..{MAX_SEGMENTS}"),
            ))
        }
    }

    fn check_spot(spot_deg: f64) -> Result<()> {
        if spot_deg.is_finite() && spot_deg >= 0.0 {
            Ok(())
        } else {
            Err(Error::parameter(
                "spot size",
                format!("{spot_deg} must be a non-negative angle"),
            ))
        }
    }

    /// Records a deflection for facet `index`.
    ///
    /// # Errors
    /// Fails for `index >= MAX_SEGMENTS` or non-finite angles.
    pub fn set_deflection(&mut self, index: usize, deflection: SegmentDeflection) -> Result<()> {
        Self::check_index(index)?;
        if !(deflection.az_deg.is_finite() && deflection.alt_deg.is_finite()) {
            return Err(Error::parameter(
                "deflection",
                format!("({}, {}) is not finite", deflection.az_deg, deflection.alt_deg),
            ));
        }
        self.deflections[index] = deflection;
        Ok(())
    }

    /// Records a spot-size override for facet `index`.
    ///
    /// # Errors
    /// Fails for `index >= MAX_SEGMENTS` or a negative spot size.
    pub fn set_spot(&mut self, index: usize, spot_deg: f64) -> Result<()> {
        Self::check_index(index)?;
        Self::check_spot(spot_deg)?;
        self.spot_deg[index] = Some(spot_deg);
        Ok(())
    }

    /// Records a spot-size override for every facet without its own.
    ///
    /// # Errors
    /// Fails for a negative spot size.
    pub fn set_global_spot(&mut self, spot_deg: f64) -> Result<()> {
        Self::check_spot(spot_deg)?;
        self.global_spot_deg = Some(spot_deg);
        Ok(())
    }

    /// Deflection for facet `index` (zero when unset or out of range).
    #[inline]
    pub fn deflection(&self, index: usize) -> SegmentDeflection {
        self.deflections.get(index).copied().unwrap_or_default()
    }

    /// Spot size for facet `index`: its own override, else the global one.
    #[inline]
    pub fn spot(&self, index: usize) -> Option<f64> {
        self.spot_deg
            .get(index)
            .copied()
            .flatten()
            .or(self.global_spot_deg)
    }

    /// True when nothing would change.
    pub fn is_empty(&self) -> bool {
        self.global_spot_deg.is_none()
            && self.spot_deg.iter().all(Option::is_none)
            && self.deflections.iter().all(SegmentDeflection::is_zero)
    }

    /// Highest facet index carrying an override, if any.
    pub fn highest_index(&self) -> Option<usize> {
        (0..MAX_SEGMENTS)
            .rev()
            .find(|&i| !self.deflections[i].is_zero() || self.spot_deg[i].is_some())
    }
}

/// Parameters for rebuilding facet centres of curvature.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RefocusParams {
    /// Axial offset of the facet focus (meters); `None` uses the per-ring
    /// default.
    pub banana_error: Option<f64>,
    /// Facet curvature radius (meters); `None` uses the nominal value.
    pub segment_rcurve: Option<f64>,
}

/// Complete description of one trace run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Mirror (and camera) to trace.
    pub mirror: usize,
    /// Number of trial rays.
    pub rays: u64,
    /// Point-source position (meters, mirror frame).
    pub source: Vector3<f64>,
    /// Facet deflections and spot-size overrides.
    pub overrides: SegmentOverrides,
    /// Optional facet refocusing, applied before the overrides.
    pub refocus: Option<RefocusParams>,
    /// Base seed of the random streams.
    pub seed: u64,
    /// Number of workers (at least 1).
    pub threads: usize,
    /// Destination of ray records.
    pub output: OutputTarget,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mirror: 0,
            rays: DEFAULT_RAYS,
            source: Vector3::new(0.0, 0.0, NOMINAL_SCREEN_CENTER_Z),
            overrides: SegmentOverrides::default(),
            refocus: None,
            seed: DEFAULT_SEED,
            threads: 1,
            output: OutputTarget::default(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mirror index.
    #[must_use]
    pub fn with_mirror(mut self, mirror: usize) -> Self {
        self.mirror = mirror;
        self
    }

    /// Sets the number of trial rays.
    #[must_use]
    pub fn with_rays(mut self, rays: u64) -> Self {
        self.rays = rays;
        self
    }

    /// Places the source `x` meters left of and `y` meters above the screen
    /// centre, keeping its distance.
    #[must_use]
    pub fn with_source_xy(mut self, x: f64, y: f64) -> Self {
        self.source.x = x;
        self.source.y = y;
        self
    }

    /// Places the source `dz` meters farther from the mirror than the screen.
    #[must_use]
    pub fn with_source_dz(mut self, dz: f64) -> Self {
        self.source.z = NOMINAL_SCREEN_CENTER_Z + dz;
        self
    }

    /// Sets the facet overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: SegmentOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Enables facet refocusing.
    #[must_use]
    pub fn with_refocus(mut self, params: RefocusParams) -> Self {
        self.refocus = Some(params);
        self
    }

    /// Sets the base seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the output destination.
    #[must_use]
    pub fn with_output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    /// Checks values that do not depend on the geometry.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] for a non-finite source or zero
    /// workers.
    pub fn validate(&self) -> Result<()> {
        if !self.source.iter().all(|c| c.is_finite()) {
            return Err(Error::parameter("source", "position is not finite"));
        }
        if self.threads == 0 {
            return Err(Error::parameter("threads", "at least one worker is required"));
        }
        if let Some(params) = &self.refocus {
            if let Some(r) = params.segment_rcurve {
                if !(r.is_finite() && r > 0.0) {
                    return Err(Error::parameter(
                        "segment radius",
                        format!("{r} must be positive"),
                    ));
                }
            }
            if params.banana_error.is_some_and(|b| !b.is_finite()) {
                return Err(Error::parameter("banana error", "value is not finite"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.mirror, 0);
        assert_eq!(config.rays, 1_000_000);
        assert_relative_eq!(config.source.z, -3.110);
        assert_eq!(config.output, OutputTarget::File(PathBuf::from("out.txt")));
        assert!(config.overrides.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_placement() {
        let config = RunConfig::new().with_source_xy(0.1, -0.2).with_source_dz(0.5);
        assert_relative_eq!(config.source.x, 0.1);
        assert_relative_eq!(config.source.y, -0.2);
        assert_relative_eq!(config.source.z, -2.610, epsilon = 1e-12);
    }

    #[test]
    fn test_seed_for_thread() {
        assert_eq!(seed_for_thread(100, 0), 100);
        assert_eq!(seed_for_thread(100, 3), 103);
        assert_eq!(seed_for_thread(u64::MAX, 1), 0);
    }

    #[test]
    fn test_output_target() {
        assert_eq!(OutputTarget::from_arg("NULL"), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::from_arg("rays.txt"),
            OutputTarget::File(PathBuf::from("rays.txt"))
        );
    }

    #[test]
    fn test_overrides_bounds_checked() {
        let mut overrides = SegmentOverrides::new();
        assert!(overrides
            .set_deflection(17, SegmentDeflection::new(1.0, 0.0))
            .is_ok());
        assert!(matches!(
            overrides.set_deflection(18, SegmentDeflection::new(1.0, 0.0)),
            Err(Error::InvalidParameter {
                name: "segment",
                ..
            })
        ));
        assert!(overrides.set_spot(18, 0.1).is_err());
        assert!(overrides.set_spot(2, -0.1).is_err());
        assert_eq!(overrides.highest_index(), Some(17));
    }

    #[test]
    fn test_spot_precedence() {
        let mut overrides = SegmentOverrides::new();
        assert_eq!(overrides.spot(4), None);
        overrides.set_global_spot(0.2).unwrap();
        overrides.set_spot(4, 0.05).unwrap();
        assert_eq!(overrides.spot(4), Some(0.05));
        assert_eq!(overrides.spot(5), Some(0.2));
        assert!(!overrides.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let config = RunConfig::new().with_threads(0);
        assert!(config.validate().is_err());
    }
}
