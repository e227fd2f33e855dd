//! Per-facet geometry modifications applied before tracing.
//!
//! Only the facet centres of curvature, curvature radii (when refocusing)
//! and spot sizes of the selected mirror are touched.

use fdtrace_core::geometry::{NOMINAL_SEGMENT_RCURVE, UPPER_RING};
use fdtrace_core::{
    Error, RefocusParams, Result, SegmentDeflection, SegmentGeometry, SegmentOverrides,
    SiteGeometry, SiteId,
};
use log::{debug, info};
use nalgebra::{Rotation3, Vector3};

/// Default axial focus offset of upper-ring mirrors (meters).
pub const UPPER_RING_BANANA_ERROR: f64 = 0.098;

/// Rotation taking a facet's curvature-centre offset to its deflected
/// direction.
///
/// A positive azimuth turns the reflected view to the right and a positive
/// altitude turns it up; both are realised as negative rotations of the
/// offset vector, azimuth about the vertical axis first.
pub fn deflection_rotation(deflection: SegmentDeflection) -> Rotation3<f64> {
    let az = Rotation3::from_axis_angle(&Vector3::y_axis(), -deflection.az_deg.to_radians());
    let alt = Rotation3::from_axis_angle(&Vector3::x_axis(), -deflection.alt_deg.to_radians());
    alt * az
}

/// Re-points `segment` by rotating its centre of curvature about its
/// surface centre.
pub fn deflect_segment(segment: &mut SegmentGeometry, mirror_rcurve: f64, deflection: SegmentDeflection) {
    rotate_center(segment, mirror_rcurve, &deflection_rotation(deflection));
}

/// Exact inverse of [`deflect_segment`] for the same deflection.
pub fn restore_segment(segment: &mut SegmentGeometry, mirror_rcurve: f64, deflection: SegmentDeflection) {
    rotate_center(segment, mirror_rcurve, &deflection_rotation(deflection).inverse());
}

fn rotate_center(segment: &mut SegmentGeometry, mirror_rcurve: f64, rotation: &Rotation3<f64>) {
    let position = segment.position(mirror_rcurve);
    let offset = segment.center - position;
    segment.center = position + rotation * offset;
}

/// Applies spot-size overrides and deflections to mirror `mirror`.
///
/// Facets without an override keep their values bit-for-bit. Returns the
/// number of facets that changed.
///
/// # Errors
/// Returns [`Error::InvalidMirror`] for a bad mirror index and
/// [`Error::InvalidSegment`] when an override names a facet the mirror does
/// not have. Nothing is modified on error.
pub fn apply_segment_overrides(
    geometry: &mut SiteGeometry,
    mirror: usize,
    overrides: &SegmentOverrides,
) -> Result<usize> {
    let target = geometry.mirror_mut(mirror)?;
    let count = target.segment_count();
    if let Some(index) = overrides.highest_index() {
        if index >= count {
            return Err(Error::InvalidSegment {
                mirror,
                index,
                count,
            });
        }
    }

    let rcurve = target.rcurve();
    let mut changed = 0;
    for (i, segment) in target.segments_mut().iter_mut().enumerate() {
        let mut touched = false;
        if let Some(spot) = overrides.spot(i) {
            debug!("mirror {mirror} segment {i}: spot {} -> {spot} deg", segment.spot_deg);
            segment.spot_deg = spot;
            touched = true;
        }
        let deflection = overrides.deflection(i);
        if !deflection.is_zero() {
            info!(
                "mirror {mirror} segment {i}: deflecting az {:.4} deg, alt {:.4} deg",
                deflection.az_deg, deflection.alt_deg
            );
            deflect_segment(segment, rcurve, deflection);
            touched = true;
        }
        changed += usize::from(touched);
    }
    Ok(changed)
}

/// Default focus offset shared by every facet of a mirror.
///
/// Upper-ring mirrors get [`UPPER_RING_BANANA_ERROR`], lower-ring mirrors
/// and Black Rock mirror 4 get none.
pub fn default_banana_error(site: SiteId, mirror: usize, mirror_ring: u8) -> f64 {
    if mirror_ring != UPPER_RING || (site == SiteId::BlackRock && mirror == 4) {
        0.0
    } else {
        UPPER_RING_BANANA_ERROR
    }
}

/// Rebuilds every facet centre of curvature of mirror `mirror`.
///
/// The direction from a facet's surface centre toward its centre of
/// curvature is taken parallel to the direction from the surface centre,
/// displaced by the banana error along the axis, to the mirror centre of
/// curvature.
///
/// # Errors
/// Returns [`Error::InvalidMirror`] for a bad mirror index and
/// [`Error::InvalidParameter`] for a non-positive facet radius.
pub fn refocus_segments(geometry: &mut SiteGeometry, mirror: usize, params: RefocusParams) -> Result<()> {
    let seg_rcurve = params.segment_rcurve.unwrap_or(NOMINAL_SEGMENT_RCURVE);
    if !(seg_rcurve.is_finite() && seg_rcurve > 0.0) {
        return Err(Error::InvalidParameter {
            name: "segment radius",
            reason: format!("{seg_rcurve} must be positive"),
        });
    }

    let site = geometry.site();
    let target = geometry.mirror_mut(mirror)?;
    let rcurve = target.rcurve();
    let banana = params
        .banana_error
        .unwrap_or_else(|| default_banana_error(site, mirror, target.ring()));
    for segment in target.segments_mut() {
        let mut shifted = segment.position(rcurve);
        shifted.z -= banana;
        let toward_center = shifted.normalize();
        let mut center = shifted - toward_center * seg_rcurve;
        center.z += banana;
        segment.center = center;
        segment.rcurve = seg_rcurve;
    }
    info!("mirror {mirror}: refocused with banana error {banana:.3} m, segment radius {seg_rcurve:.3} m");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fdtrace_core::MirrorGeometry;

    fn nominal_site() -> SiteGeometry {
        SiteGeometry::nominal(SiteId::LongRidge, 7, 2).unwrap()
    }

    fn displaced(segment: &SegmentGeometry) -> SegmentGeometry {
        let mut s = segment.clone();
        s.center = Vector3::new(0.012, -0.034, 0.021);
        s
    }

    #[test]
    fn test_zero_deflection_is_bitwise_noop() {
        let mut geom = nominal_site();
        let before = geom.clone();
        let mut overrides = SegmentOverrides::new();
        overrides
            .set_deflection(5, SegmentDeflection::new(0.0, 0.0))
            .unwrap();
        let changed = apply_segment_overrides(&mut geom, 0, &overrides).unwrap();
        assert_eq!(changed, 0);
        assert_eq!(geom, before);
    }

    #[test]
    fn test_overrides_touch_only_target_mirror() {
        let mut geom = nominal_site();
        let before = geom.clone();
        let mut overrides = SegmentOverrides::new();
        overrides
            .set_deflection(2, SegmentDeflection::new(0.5, -0.25))
            .unwrap();
        overrides.set_spot(3, 0.2).unwrap();
        let changed = apply_segment_overrides(&mut geom, 1, &overrides).unwrap();
        assert_eq!(changed, 2);

        assert_eq!(geom.mirror(0).unwrap(), before.mirror(0).unwrap());
        let m1 = geom.mirror(1).unwrap();
        assert_relative_eq!(m1.segments()[3].spot_deg, 0.2);
        assert!(m1.segments()[2].center.norm() > 1e-4);
        assert_eq!(m1.segments()[4], MirrorGeometry::nominal().segments()[4]);
    }

    #[test]
    fn test_global_spot_applies_to_all() {
        let mut geom = nominal_site();
        let mut overrides = SegmentOverrides::new();
        overrides.set_global_spot(0.3).unwrap();
        overrides.set_spot(0, 0.1).unwrap();
        let changed = apply_segment_overrides(&mut geom, 0, &overrides).unwrap();
        assert_eq!(changed, 18);
        let spots: Vec<f64> = geom.mirror(0).unwrap().segments().iter().map(|s| s.spot_deg).collect();
        assert_relative_eq!(spots[0], 0.1);
        assert!(spots[1..].iter().all(|&s| (s - 0.3).abs() < 1e-15));
    }

    #[test]
    fn test_out_of_range_segment_fails_cleanly() {
        let mirror = MirrorGeometry::new(
            6.067,
            -3.058,
            0.66,
            MirrorGeometry::nominal().segments()[..6].to_vec(),
        )
        .unwrap();
        let mut geom = SiteGeometry::new(SiteId::MiddleDrum, 3, vec![mirror]).unwrap();
        let before = geom.clone();
        let mut overrides = SegmentOverrides::new();
        overrides.set_spot(0, 0.4).unwrap();
        overrides
            .set_deflection(6, SegmentDeflection::new(1.0, 1.0))
            .unwrap();
        let err = apply_segment_overrides(&mut geom, 0, &overrides).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidSegment {
                mirror: 0,
                index: 6,
                count: 6
            }
        );
        assert_eq!(geom, before);
    }

    #[test]
    fn test_bad_mirror_index() {
        let mut geom = nominal_site();
        let err = apply_segment_overrides(&mut geom, 5, &SegmentOverrides::new()).unwrap_err();
        assert_eq!(err, Error::InvalidMirror { index: 5, count: 2 });
    }

    #[test]
    fn test_single_axis_negation_inverts() {
        let mirror = MirrorGeometry::nominal();
        let rcurve = mirror.rcurve();
        for (az, alt) in [(0.7, 0.0), (0.0, -1.3)] {
            let original = displaced(&mirror.segments()[8]);
            let mut seg = original.clone();
            deflect_segment(&mut seg, rcurve, SegmentDeflection::new(az, alt));
            deflect_segment(&mut seg, rcurve, SegmentDeflection::new(-az, -alt));
            assert_relative_eq!(seg.center, original.center, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_restore_inverts_combined_deflection() {
        let mirror = MirrorGeometry::nominal();
        let rcurve = mirror.rcurve();
        let original = displaced(&mirror.segments()[11]);
        let deflection = SegmentDeflection::new(1.1, -0.6);
        let mut seg = original.clone();
        deflect_segment(&mut seg, rcurve, deflection);
        assert!((seg.center - original.center).norm() > 1e-3);
        restore_segment(&mut seg, rcurve, deflection);
        assert_relative_eq!(seg.center, original.center, epsilon = 1e-12);
    }

    #[test]
    fn test_deflection_preserves_offset_length() {
        let mirror = MirrorGeometry::nominal();
        let rcurve = mirror.rcurve();
        let mut seg = mirror.segments()[0].clone();
        let position = seg.position(rcurve);
        let before = (seg.center - position).norm();
        deflect_segment(&mut seg, rcurve, SegmentDeflection::new(2.0, 3.0));
        assert_relative_eq!((seg.center - position).norm(), before, epsilon = 1e-12);
    }

    #[test]
    fn test_positive_azimuth_rotates_center_negatively_about_y() {
        let mirror = MirrorGeometry::nominal();
        let rcurve = mirror.rcurve();
        // Offset from a facet at the vertex to the mirror centre is +z.
        let mut seg = SegmentGeometry::aligned(Vector3::new(0.0, 0.0, -1.0), rcurve, 1);
        deflect_segment(&mut seg, rcurve, SegmentDeflection::new(1.0, 0.0));
        // Ry(-a) takes +z toward -x.
        assert!(seg.center.x < 0.0);
        assert_relative_eq!(seg.center.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_refocus_without_banana_is_concentric() {
        let mut geom = nominal_site();
        let params = RefocusParams {
            banana_error: Some(0.0),
            segment_rcurve: Some(6.067),
        };
        refocus_segments(&mut geom, 0, params).unwrap();
        for seg in geom.mirror(0).unwrap().segments() {
            assert_relative_eq!(seg.center, Vector3::zeros(), epsilon = 1e-9);
            assert_relative_eq!(seg.rcurve, 6.067);
        }
    }

    // Centre of curvature of a refocused facet, written out in full.
    fn refocused_center(seg: &SegmentGeometry, rcurve: f64, banana: f64, seg_rcurve: f64) -> Vector3<f64> {
        let (x, y, z) = (seg.direction.x * rcurve, seg.direction.y * rcurve, seg.direction.z * rcurve - banana);
        let len = (x * x + y * y + z * z).sqrt();
        Vector3::new(
            x - x / len * seg_rcurve,
            y - y / len * seg_rcurve,
            z - z / len * seg_rcurve + banana,
        )
    }

    #[test]
    fn test_refocus_defaults_share_mirror_banana_error() {
        let mut geom = nominal_site();
        let pristine = geom.clone();
        refocus_segments(&mut geom, 0, RefocusParams::default()).unwrap();
        refocus_segments(&mut geom, 1, RefocusParams::default()).unwrap();

        for (index, banana) in [(0, UPPER_RING_BANANA_ERROR), (1, 0.0)] {
            let mirror = geom.mirror(index).unwrap();
            let original = pristine.mirror(index).unwrap();
            // Facet 0 is on the inner ring, facet 6 on the outer ring.
            for facet in [0, 6] {
                assert_eq!(original.segments()[facet].ring, if facet == 0 { 1 } else { 2 });
                let expected = refocused_center(
                    &original.segments()[facet],
                    original.rcurve(),
                    banana,
                    NOMINAL_SEGMENT_RCURVE,
                );
                assert_relative_eq!(mirror.segments()[facet].center, expected, epsilon = 1e-12);
            }
            for (seg, orig) in mirror.segments().iter().zip(original.segments()) {
                assert_relative_eq!(seg.rcurve, NOMINAL_SEGMENT_RCURVE);
                let expected = refocused_center(orig, original.rcurve(), banana, NOMINAL_SEGMENT_RCURVE);
                assert_relative_eq!(seg.center, expected, epsilon = 1e-12);
            }
        }

        // An upper-ring inner facet is moved off its own axis by the shared offset.
        let inner = &geom.mirror(0).unwrap().segments()[0];
        assert!((inner.center - refocused_center(inner, 6.067, 0.0, NOMINAL_SEGMENT_RCURVE)).norm() > 1e-3);
    }

    #[test]
    fn test_default_banana_error_by_mirror_ring() {
        assert_relative_eq!(default_banana_error(SiteId::LongRidge, 0, UPPER_RING), 0.098);
        assert_relative_eq!(default_banana_error(SiteId::LongRidge, 1, 1), 0.0);
        assert_relative_eq!(default_banana_error(SiteId::BlackRock, 4, UPPER_RING), 0.0);
        assert_relative_eq!(default_banana_error(SiteId::BlackRock, 6, UPPER_RING), 0.098);
    }

    #[test]
    fn test_black_rock_mirror_four_has_no_default_offset() {
        let mut geom = SiteGeometry::nominal(SiteId::BlackRock, 7, 6).unwrap();
        let pristine = geom.clone();
        assert_eq!(geom.mirror(4).unwrap().ring(), UPPER_RING);
        refocus_segments(&mut geom, 4, RefocusParams::default()).unwrap();
        let mirror = geom.mirror(4).unwrap();
        for (seg, orig) in mirror.segments().iter().zip(pristine.mirror(4).unwrap().segments()) {
            let expected = refocused_center(orig, mirror.rcurve(), 0.0, NOMINAL_SEGMENT_RCURVE);
            assert_relative_eq!(seg.center, expected, epsilon = 1e-12);
        }
    }
}
