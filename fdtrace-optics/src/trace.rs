//! Single-ray tracer: point source, segmented mirror, camera window, tubes.

use crate::camera::{CameraLayout, TubeHit, CAMERA_HALF_HEIGHT, CAMERA_HALF_WIDTH};
use crate::propagation::{
    crosses_box, cross_slab, in_hexagon, intersect_plane_z, intersect_sphere, orthonormal_basis,
    reflect, wiggle, SlabCrossing,
};
use fdtrace_core::{
    Error, LossReason, MirrorGeometry, OpticalCalibration, Ray, Result, SiteGeometry,
    TraceOutcome, TraceResult,
};
use nalgebra::Vector3;
use rand::Rng;
use std::f64::consts::{FRAC_PI_2, TAU};

/// Margin applied to the emission cone so rays graze every facet edge.
const CONE_MARGIN: f64 = 1.02;

/// Facet surface data precomputed for aperture tests.
#[derive(Debug, Clone)]
struct FacetFrame {
    center: Vector3<f64>,
    rcurve: f64,
    position: Vector3<f64>,
    u: Vector3<f64>,
    v: Vector3<f64>,
    spot_rad: f64,
    reflectivity: f64,
}

/// Traces rays from a fixed point source onto one camera.
///
/// The tracer borrows the geometry and calibration read-only and can be
/// shared between worker threads.
#[derive(Debug, Clone)]
pub struct RayTracer<'a> {
    calib: &'a OpticalCalibration,
    layout: &'static CameraLayout,
    source: Vector3<f64>,
    axis: Vector3<f64>,
    axis_u: Vector3<f64>,
    axis_v: Vector3<f64>,
    cos_half_angle: f64,
    facets: Vec<FacetFrame>,
    segment_size: f64,
    camera_z: f64,
    box_lo: Vector3<f64>,
    box_hi: Vector3<f64>,
}

impl<'a> RayTracer<'a> {
    /// Prepares a tracer for mirror `mirror` of `geometry`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMirror`] for a bad mirror index and
    /// [`Error::InvalidParameter`] when the source does not sit in front of
    /// the mirror or the calibration is unphysical.
    pub fn new(
        geometry: &SiteGeometry,
        mirror: usize,
        calib: &'a OpticalCalibration,
        source: Vector3<f64>,
    ) -> Result<Self> {
        calib.validate()?;
        let mirror_geom = geometry.mirror(mirror)?;
        let rcurve = mirror_geom.rcurve();
        if !(source.iter().all(|c| c.is_finite()) && source.z > -rcurve) {
            return Err(Error::InvalidParameter {
                name: "source",
                reason: format!(
                    "({:.3}, {:.3}, {:.3}) is not in front of the mirror",
                    source.x, source.y, source.z
                ),
            });
        }

        let vertex = Vector3::new(0.0, 0.0, -rcurve);
        let axis = (vertex - source).normalize();
        let (axis_u, axis_v) = orthonormal_basis(&axis);
        let facets = facet_frames(mirror_geom);
        let half_angle = emission_half_angle(mirror_geom, &source, &axis);

        let window_z = mirror_geom.camera_z() - calib.stack_depth();
        let box_lo = Vector3::new(-CAMERA_HALF_WIDTH, -CAMERA_HALF_HEIGHT, window_z);
        let box_hi = Vector3::new(
            CAMERA_HALF_WIDTH,
            CAMERA_HALF_HEIGHT,
            window_z + calib.camera_box_depth,
        );

        Ok(Self {
            calib,
            layout: CameraLayout::standard(),
            source,
            axis,
            axis_u,
            axis_v,
            cos_half_angle: half_angle.cos(),
            facets,
            segment_size: mirror_geom.segment_size(),
            camera_z: mirror_geom.camera_z(),
            box_lo,
            box_hi,
        })
    }

    /// Cosine of the emission cone half-angle.
    #[inline]
    pub fn cos_half_angle(&self) -> f64 {
        self.cos_half_angle
    }

    /// Samples a ray uniformly in solid angle inside the emission cone.
    pub fn emit<R: Rng + ?Sized>(&self, rng: &mut R) -> Ray {
        let cos_theta = 1.0 - rng.gen::<f64>() * (1.0 - self.cos_half_angle);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = rng.gen::<f64>() * TAU;
        let direction = self.axis * cos_theta
            + self.axis_u * (sin_theta * phi.cos())
            + self.axis_v * (sin_theta * phi.sin());
        Ray::new(self.source, direction)
    }

    /// Emits and propagates one ray.
    #[inline]
    pub fn trace<R: Rng + ?Sized>(&self, rng: &mut R) -> TraceResult {
        let ray = self.emit(rng);
        self.propagate(ray, rng)
    }

    /// Propagates `ray` from the source to the photomultiplier face.
    pub fn propagate<R: Rng + ?Sized>(&self, mut ray: Ray, rng: &mut R) -> TraceResult {
        let toggles = &self.calib.toggles;

        let Some((path, facet)) = self.find_facet(&ray) else {
            return TraceResult::lost(LossReason::MissedMirror);
        };
        if toggles.hit_camera_box && crosses_box(&ray, path, &self.box_lo, &self.box_hi) {
            return TraceResult::lost(LossReason::HitCameraBox);
        }

        ray.advance(path);
        if toggles.mirror_absorbed && rng.gen::<f64>() >= facet.reflectivity {
            return TraceResult::lost(LossReason::MirrorAbsorbed);
        }
        let normal = (ray.origin - facet.center) / facet.rcurve;
        let mut direction = reflect(&ray.direction, &normal);
        if toggles.wiggle {
            direction = wiggle(&direction, facet.spot_rad, rng);
        }
        ray.direction = direction;

        let window_z = self.camera_z - self.calib.stack_depth();
        if ray.direction.z <= 0.0 {
            return TraceResult::lost(LossReason::MissedCamera);
        }
        let Some(to_window) = intersect_plane_z(&ray, window_z) else {
            return TraceResult::lost(LossReason::MissedCamera);
        };
        ray.advance(to_window);
        if toggles.missed_camera && !CameraLayout::contains(ray.origin.x, ray.origin.y) {
            return TraceResult::lost(LossReason::MissedCamera);
        }

        let n_air = self.calib.n_air;
        if cross_slab(
            &mut ray,
            &self.calib.cover,
            n_air,
            toggles.camcover_shift,
            toggles.camcover_absorbed,
            rng,
        ) == SlabCrossing::Absorbed
        {
            return TraceResult::lost(LossReason::CoverAbsorbed);
        }
        ray.advance(self.calib.incam_gap / ray.direction.z);
        if cross_slab(
            &mut ray,
            &self.calib.filter,
            n_air,
            toggles.filter_shift,
            toggles.filter_absorbed,
            rng,
        ) == SlabCrossing::Absorbed
        {
            return TraceResult::lost(LossReason::FilterAbsorbed);
        }

        let (x, y) = (ray.origin.x, ray.origin.y);
        let outcome = if toggles.missed_tube {
            match self.layout.lookup(x, y) {
                TubeHit::Tube(tube) => TraceOutcome::Tube(tube),
                TubeHit::Gap => TraceOutcome::Gap,
            }
        } else {
            TraceOutcome::Tube(self.layout.nearest_tube(x, y))
        };
        TraceResult::landed(outcome, x, y)
    }

    /// Nearest facet whose aperture the ray strikes, with its path length.
    fn find_facet(&self, ray: &Ray) -> Option<(f64, &FacetFrame)> {
        self.facets
            .iter()
            .filter_map(|facet| {
                let s = intersect_sphere(ray, &facet.center, facet.rcurve)?;
                let offset = ray.at(s) - facet.position;
                in_hexagon(offset.dot(&facet.u), offset.dot(&facet.v), self.segment_size)
                    .then_some((s, facet))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}

fn facet_frames(mirror: &MirrorGeometry) -> Vec<FacetFrame> {
    mirror
        .segments()
        .iter()
        .map(|seg| {
            // Horizontal facet axis first, so the hexagon flats stay vertical.
            let u = Vector3::y().cross(&seg.direction).normalize();
            let v = seg.direction.cross(&u);
            FacetFrame {
                center: seg.center,
                rcurve: seg.rcurve,
                position: seg.position(mirror.rcurve()),
                u,
                v,
                spot_rad: seg.spot_deg.to_radians(),
                reflectivity: seg.reflectivity,
            }
        })
        .collect()
}

/// Half-angle about `axis` that covers every facet seen from `source`.
fn emission_half_angle(mirror: &MirrorGeometry, source: &Vector3<f64>, axis: &Vector3<f64>) -> f64 {
    let circumradius = mirror.segment_size() / 3f64.sqrt();
    let widest = mirror
        .segments()
        .iter()
        .map(|seg| {
            let to_facet = seg.position(mirror.rcurve()) - source;
            let distance = to_facet.norm();
            let off_axis = (to_facet.dot(axis) / distance).clamp(-1.0, 1.0).acos();
            off_axis + (circumradius / distance).atan()
        })
        .fold(0.0, f64::max);
    (widest * CONE_MARGIN).min(FRAC_PI_2)
}
