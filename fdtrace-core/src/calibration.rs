//! Camera-window optical properties and raytrace toggles.

use crate::{Error, Result};
use std::fmt;

/// Thickness of the 3/16" poster board used as a projection screen (meters).
pub const SCREEN_BOARD_THICKNESS: f64 = 0.004_762_5;

/// Feature switches of the single-ray tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RaytraceToggles {
    /// Blur reflected rays by the facet spot-size parameter.
    pub wiggle: bool,
    /// Block rays whose path to the mirror crosses the camera box.
    pub hit_camera_box: bool,
    /// Absorb rays at the mirror according to facet reflectivity.
    pub mirror_absorbed: bool,
    /// Drop rays that arrive outside the camera window.
    pub missed_camera: bool,
    /// Absorb rays in the camera cover according to its transmittance.
    pub camcover_absorbed: bool,
    /// Refract rays through the camera cover.
    pub camcover_shift: bool,
    /// Absorb rays in the filter according to its transmittance.
    pub filter_absorbed: bool,
    /// Refract rays through the filter.
    pub filter_shift: bool,
    /// Report inter-tube gaps instead of snapping to the nearest tube.
    pub missed_tube: bool,
}

impl Default for RaytraceToggles {
    fn default() -> Self {
        Self {
            wiggle: true,
            hit_camera_box: false,
            mirror_absorbed: true,
            missed_camera: true,
            camcover_absorbed: true,
            camcover_shift: true,
            filter_absorbed: true,
            filter_shift: true,
            missed_tube: true,
        }
    }
}

impl RaytraceToggles {
    /// Names of the enabled toggles, in a fixed order.
    pub fn active(&self) -> Vec<&'static str> {
        [
            (self.wiggle, "WIGGLE"),
            (self.hit_camera_box, "HIT_CAMERABOX"),
            (self.mirror_absorbed, "MIR_ABSORBED"),
            (self.missed_camera, "MISSED_CAMERA"),
            (self.camcover_absorbed, "CAMCOVER_ABSORBED"),
            (self.camcover_shift, "CAMCOVER_SHIFT"),
            (self.filter_absorbed, "FILTER_ABSORBED"),
            (self.filter_shift, "FILTER_SHIFT"),
            (self.missed_tube, "MISSED_TUBE"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

impl fmt::Display for RaytraceToggles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.active().join(" "))
    }
}

/// A flat transmissive layer in front of the photomultipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpticalLayer {
    /// Refractive index.
    pub index: f64,
    /// Thickness along the optical axis (meters).
    pub thickness: f64,
    /// Transmittance at normal incidence through the full thickness.
    pub transmittance: f64,
}

/// Material constants of the camera window stack, immutable during a run.
///
/// Seen from the mirror, a ray crosses the camera cover, an air gap of
/// `incam_gap`, and the filter, which rests on the photomultiplier face.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticalCalibration {
    /// Refractive index of air.
    pub n_air: f64,
    /// UV-transmitting acrylic camera cover.
    pub cover: OpticalLayer,
    /// Air gap between the cover and the filter (meters).
    pub incam_gap: f64,
    /// UV band-pass filter glued to the tubes.
    pub filter: OpticalLayer,
    /// Depth of the camera box behind the cover (meters).
    pub camera_box_depth: f64,
    /// Runtime feature switches.
    pub toggles: RaytraceToggles,
}

impl Default for OpticalCalibration {
    fn default() -> Self {
        Self::ta_defaults()
    }
}

impl OpticalCalibration {
    /// Default Telescope Array camera window.
    pub fn ta_defaults() -> Self {
        Self {
            n_air: 1.000_29,
            cover: OpticalLayer {
                index: 1.49,
                thickness: 0.003,
                transmittance: 0.92,
            },
            incam_gap: 0.040,
            filter: OpticalLayer {
                index: 1.54,
                thickness: 0.004,
                transmittance: 0.85,
            },
            camera_box_depth: 0.25,
            toggles: RaytraceToggles::default(),
        }
    }

    /// Reconfigures the window for a screen taped over an open camera:
    /// the cover no longer refracts, the filter is gone, and the image forms
    /// on the board surface.
    #[must_use]
    pub fn with_screen(mut self) -> Self {
        self.cover.index = self.n_air;
        self.incam_gap = (self.incam_gap - SCREEN_BOARD_THICKNESS).max(0.0);
        self.filter.thickness = 0.0;
        self.filter.index = self.n_air;
        self
    }

    /// Sets the raytrace toggles.
    #[must_use]
    pub fn with_toggles(mut self, toggles: RaytraceToggles) -> Self {
        self.toggles = toggles;
        self
    }

    /// Distance from the photomultiplier face to the front of the cover.
    #[inline]
    pub fn stack_depth(&self) -> f64 {
        self.cover.thickness + self.incam_gap + self.filter.thickness
    }

    /// Checks that every constant is physical.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.n_air.is_finite() && self.n_air >= 1.0) {
            return Err(Error::parameter("n_air", format!("{} < 1", self.n_air)));
        }
        for (name, layer) in [("cover", &self.cover), ("filter", &self.filter)] {
            if !(layer.index.is_finite() && layer.index >= 1.0) {
                return Err(Error::parameter(name, format!("index {} < 1", layer.index)));
            }
            if !(layer.thickness.is_finite() && layer.thickness >= 0.0) {
                return Err(Error::parameter(
                    name,
                    format!("negative thickness {}", layer.thickness),
                ));
            }
            if !(0.0..=1.0).contains(&layer.transmittance) {
                return Err(Error::parameter(
                    name,
                    format!("transmittance {} outside [0, 1]", layer.transmittance),
                ));
            }
        }
        if !(self.incam_gap.is_finite() && self.incam_gap >= 0.0) {
            return Err(Error::parameter(
                "incam_gap",
                format!("negative gap {}", self.incam_gap),
            ));
        }
        if !(self.camera_box_depth.is_finite() && self.camera_box_depth >= 0.0) {
            return Err(Error::parameter(
                "camera_box_depth",
                format!("negative depth {}", self.camera_box_depth),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        let calib = OpticalCalibration::ta_defaults();
        assert!(calib.validate().is_ok());
        assert_relative_eq!(calib.stack_depth(), 0.047, epsilon = 1e-12);
    }

    #[test]
    fn test_screen_mode() {
        let calib = OpticalCalibration::ta_defaults().with_screen();
        assert_relative_eq!(calib.cover.index, calib.n_air);
        assert_relative_eq!(calib.filter.thickness, 0.0);
        assert_relative_eq!(calib.incam_gap, 0.040 - SCREEN_BOARD_THICKNESS, epsilon = 1e-12);
        assert!(calib.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_layer() {
        let mut calib = OpticalCalibration::ta_defaults();
        calib.filter.transmittance = 1.2;
        let err = calib.validate().unwrap_err();
        assert!(err.to_string().contains("filter"));
    }

    #[test]
    fn test_active_toggles() {
        let toggles = RaytraceToggles {
            wiggle: false,
            hit_camera_box: true,
            ..RaytraceToggles::default()
        };
        let active = toggles.active();
        assert!(!active.contains(&"WIGGLE"));
        assert_eq!(active[0], "HIT_CAMERABOX");
        assert!(toggles.to_string().contains("MISSED_TUBE"));
    }
}
