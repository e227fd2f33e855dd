//! JSON schemas for geometry and calibration files.
//!
//! Geometry documents look like:
//!
//! ```json
//! {
//!   "site": "br",
//!   "uniq_id": 1400000000,
//!   "mirrors": [
//!     {
//!       "ring": 2,
//!       "rcurve": 6.067,
//!       "camera_z": -3.058,
//!       "segment_size": 0.66,
//!       "segments": [
//!         { "direction": [0.1104, 0.0, -0.9939], "spot_deg": 0.05, "ring": 1 }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Mirror fields default to the nominal values (`ring` to the lower ring).
//! Segment fields other than `direction` are optional. Calibration documents
//! override any subset of the default camera-window constants.

use crate::{Error, Result};
use fdtrace_core::geometry::{
    LOWER_RING, NOMINAL_CAMERA_Z, NOMINAL_MIRROR_RCURVE, NOMINAL_REFLECTIVITY, NOMINAL_SEGMENT_SIZE,
    NOMINAL_SPOT_DEG,
};
use fdtrace_core::{
    MirrorGeometry, OpticalCalibration, OpticalLayer, RaytraceToggles, SegmentGeometry,
    SiteGeometry, SiteId,
};
use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
struct JsonGeometry {
    site: String,
    uniq_id: u32,
    mirrors: Vec<JsonMirror>,
}

#[derive(Deserialize, Serialize)]
#[serde(default)]
struct JsonMirror {
    ring: u8,
    rcurve: f64,
    camera_z: f64,
    segment_size: f64,
    segments: Vec<JsonSegment>,
}

impl Default for JsonMirror {
    fn default() -> Self {
        Self {
            ring: LOWER_RING,
            rcurve: NOMINAL_MIRROR_RCURVE,
            camera_z: NOMINAL_CAMERA_Z,
            segment_size: NOMINAL_SEGMENT_SIZE,
            segments: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize)]
struct JsonSegment {
    direction: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rcurve: Option<f64>,
    #[serde(default)]
    center: [f64; 3],
    #[serde(default = "default_spot")]
    spot_deg: f64,
    #[serde(default = "default_reflectivity")]
    reflectivity: f64,
    #[serde(default = "default_ring")]
    ring: u8,
}

fn default_spot() -> f64 {
    NOMINAL_SPOT_DEG
}

fn default_reflectivity() -> f64 {
    NOMINAL_REFLECTIVITY
}

fn default_ring() -> u8 {
    1
}

/// Parses a JSON geometry document.
///
/// Segment directions are normalized; a segment without `rcurve` takes the
/// mirror's.
///
/// # Errors
/// Returns [`Error::Json`] for malformed documents, [`Error::InvalidFormat`]
/// for an unknown site code, and [`Error::CoreError`] when the geometry fails
/// validation or a mirror ring is not 1 or 2.
pub fn geometry_from_json(json: &str) -> Result<SiteGeometry> {
    let doc: JsonGeometry = serde_json::from_str(json)?;
    let site = SiteId::from_code(&doc.site)
        .ok_or_else(|| Error::InvalidFormat(format!("unknown site code {:?}", doc.site)))?;

    let mut mirrors = Vec::with_capacity(doc.mirrors.len());
    for mirror in doc.mirrors {
        let segments = mirror
            .segments
            .into_iter()
            .map(|s| {
                let direction = Vector3::from(s.direction);
                let norm = direction.norm();
                if (norm - 1.0).abs() > 1e-9 {
                    debug!("normalizing segment direction of length {norm}");
                }
                SegmentGeometry {
                    direction: direction / norm,
                    rcurve: s.rcurve.unwrap_or(mirror.rcurve),
                    center: Vector3::from(s.center),
                    spot_deg: s.spot_deg,
                    reflectivity: s.reflectivity,
                    ring: s.ring,
                }
            })
            .collect();
        mirrors.push(
            MirrorGeometry::new(mirror.rcurve, mirror.camera_z, mirror.segment_size, segments)?
                .with_ring(mirror.ring)?,
        );
    }
    Ok(SiteGeometry::new(site, doc.uniq_id, mirrors)?)
}

/// Renders `geometry` as a pretty-printed JSON document.
///
/// # Errors
/// Returns [`Error::Json`] if serialization fails.
pub fn geometry_to_json(geometry: &SiteGeometry) -> Result<String> {
    let doc = JsonGeometry {
        site: geometry.site().code().to_string(),
        uniq_id: geometry.uniq_id(),
        mirrors: geometry
            .mirrors()
            .iter()
            .map(|m| JsonMirror {
                ring: m.ring(),
                rcurve: m.rcurve(),
                camera_z: m.camera_z(),
                segment_size: m.segment_size(),
                segments: m
                    .segments()
                    .iter()
                    .map(|s| JsonSegment {
                        direction: s.direction.into(),
                        rcurve: Some(s.rcurve),
                        center: s.center.into(),
                        spot_deg: s.spot_deg,
                        reflectivity: s.reflectivity,
                        ring: s.ring,
                    })
                    .collect(),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

// Calibration overrides: every field optional, applied over the defaults.
#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct JsonCalibration {
    n_air: Option<f64>,
    cover: JsonLayer,
    incam_gap: Option<f64>,
    filter: JsonLayer,
    camera_box_depth: Option<f64>,
    toggles: JsonToggles,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct JsonLayer {
    index: Option<f64>,
    thickness: Option<f64>,
    transmittance: Option<f64>,
}

impl JsonLayer {
    fn apply(&self, layer: &mut OpticalLayer) {
        if let Some(v) = self.index {
            layer.index = v;
        }
        if let Some(v) = self.thickness {
            layer.thickness = v;
        }
        if let Some(v) = self.transmittance {
            layer.transmittance = v;
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct JsonToggles {
    wiggle: Option<bool>,
    hit_camera_box: Option<bool>,
    mirror_absorbed: Option<bool>,
    missed_camera: Option<bool>,
    camcover_absorbed: Option<bool>,
    camcover_shift: Option<bool>,
    filter_absorbed: Option<bool>,
    filter_shift: Option<bool>,
    missed_tube: Option<bool>,
}

impl JsonToggles {
    fn apply(&self, toggles: &mut RaytraceToggles) {
        let pairs = [
            (self.wiggle, &mut toggles.wiggle),
            (self.hit_camera_box, &mut toggles.hit_camera_box),
            (self.mirror_absorbed, &mut toggles.mirror_absorbed),
            (self.missed_camera, &mut toggles.missed_camera),
            (self.camcover_absorbed, &mut toggles.camcover_absorbed),
            (self.camcover_shift, &mut toggles.camcover_shift),
            (self.filter_absorbed, &mut toggles.filter_absorbed),
            (self.filter_shift, &mut toggles.filter_shift),
            (self.missed_tube, &mut toggles.missed_tube),
        ];
        for (value, slot) in pairs {
            if let Some(v) = value {
                *slot = v;
            }
        }
    }
}

/// Applies a JSON calibration override to `base`.
///
/// # Errors
/// Returns [`Error::Json`] for malformed documents or unknown keys and
/// [`Error::CoreError`] when the result is unphysical.
pub fn calibration_from_json(json: &str, base: OpticalCalibration) -> Result<OpticalCalibration> {
    let doc: JsonCalibration = serde_json::from_str(json)?;
    let mut calib = base;
    if let Some(v) = doc.n_air {
        calib.n_air = v;
    }
    doc.cover.apply(&mut calib.cover);
    if let Some(v) = doc.incam_gap {
        calib.incam_gap = v;
    }
    doc.filter.apply(&mut calib.filter);
    if let Some(v) = doc.camera_box_depth {
        calib.camera_box_depth = v;
    }
    doc.toggles.apply(&mut calib.toggles);
    calib.validate()?;
    Ok(calib)
}
