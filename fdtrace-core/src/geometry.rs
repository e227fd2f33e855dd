//! Site geometry: mirrors, segments and camera placement.
//!
//! All vectors are expressed in the mirror frame: the origin sits at the
//! mirror's centre of curvature, +z points from the mirror toward that
//! centre, +y is up and +x is toward the viewer's left when looking at the
//! mirror from the camera. Segments therefore lie near `z = -rcurve` and the
//! camera face is a plane of constant `z` between the mirror and the origin.
#![allow(clippy::cast_precision_loss)]

use crate::{Error, Result, SiteId};
use nalgebra::Vector3;

/// Maximum number of segments on a single mirror.
pub const MAX_SEGMENTS: usize = 18;

/// Nominal mirror curvature radius (meters).
pub const NOMINAL_MIRROR_RCURVE: f64 = 6.067;

/// Nominal segment curvature radius after refocusing (meters).
pub const NOMINAL_SEGMENT_RCURVE: f64 = 6.058;

/// Segment flat-to-flat size (meters).
pub const NOMINAL_SEGMENT_SIZE: f64 = 0.660;

/// Clearance between neighbouring segments (meters).
pub const NOMINAL_SEGMENT_GAP: f64 = 0.010;

/// Nominal z of the photomultiplier face plane (meters).
pub const NOMINAL_CAMERA_Z: f64 = -3.058;

/// Nominal spot-size parameter (degrees).
pub const NOMINAL_SPOT_DEG: f64 = 0.05;

/// Nominal segment reflectivity.
pub const NOMINAL_REFLECTIVITY: f64 = 0.90;

/// Geometry vintages whose camera y axis points down.
///
/// Files carrying one of these identifiers were produced before the camera
/// convention was fixed; ray records traced against them need `y -> -y`.
pub const LEGACY_Y_FLIP_IDS: [u32; 2] = [0, 1_320_019_200];

/// Returns true when records traced against geometry `uniq_id` must flip y.
#[inline]
pub fn flips_camera_y(uniq_id: u32) -> bool {
    LEGACY_Y_FLIP_IDS.contains(&uniq_id)
}

/// One hexagonal mirror facet.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentGeometry {
    /// Unit vector from the mirror centre of curvature to the segment centre.
    pub direction: Vector3<f64>,
    /// Curvature radius of the segment surface (meters).
    pub rcurve: f64,
    /// Centre of curvature of the segment (meters, mirror frame).
    pub center: Vector3<f64>,
    /// Angular blur applied to reflected rays (degrees, 1 sigma per axis).
    pub spot_deg: f64,
    /// Probability that a ray striking the facet is reflected.
    pub reflectivity: f64,
    /// Ring the facet belongs to (1 = inner, 2 = outer).
    pub ring: u8,
}

impl SegmentGeometry {
    /// Creates a facet whose centre of curvature coincides with the mirror's.
    pub fn aligned(direction: Vector3<f64>, rcurve: f64, ring: u8) -> Self {
        Self {
            direction: direction.normalize(),
            rcurve,
            center: Vector3::zeros(),
            spot_deg: NOMINAL_SPOT_DEG,
            reflectivity: NOMINAL_REFLECTIVITY,
            ring,
        }
    }

    /// Surface centre of the facet for a mirror of curvature `mirror_rcurve`.
    #[inline]
    pub fn position(&self, mirror_rcurve: f64) -> Vector3<f64> {
        self.direction * mirror_rcurve
    }
}

/// Elevation ring of a mirror: 1 views low elevations, 2 high ones.
pub const LOWER_RING: u8 = 1;

/// Upper elevation ring.
pub const UPPER_RING: u8 = 2;

/// Nominal elevation ring of mirror `index`: even mirrors look up, odd
/// mirrors look down.
#[inline]
pub fn nominal_mirror_ring(index: usize) -> u8 {
    if index % 2 == 0 {
        UPPER_RING
    } else {
        LOWER_RING
    }
}

/// One mirror and the camera that views it.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorGeometry {
    ring: u8,
    rcurve: f64,
    camera_z: f64,
    segment_size: f64,
    segments: Vec<SegmentGeometry>,
}

impl MirrorGeometry {
    /// Creates a lower-ring mirror, validating its segment list.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if any dimension is unphysical or
    /// the segment count is outside `1..=MAX_SEGMENTS`.
    pub fn new(
        rcurve: f64,
        camera_z: f64,
        segment_size: f64,
        segments: Vec<SegmentGeometry>,
    ) -> Result<Self> {
        let mirror = Self {
            ring: LOWER_RING,
            rcurve,
            camera_z,
            segment_size,
            segments,
        };
        mirror.validate()?;
        Ok(mirror)
    }

    /// Places the mirror in elevation ring `ring`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] unless `ring` is 1 or 2.
    pub fn with_ring(mut self, ring: u8) -> Result<Self> {
        if !(LOWER_RING..=UPPER_RING).contains(&ring) {
            return Err(Error::InvalidGeometry(format!(
                "mirror ring {ring} must be {LOWER_RING} or {UPPER_RING}"
            )));
        }
        self.ring = ring;
        Ok(self)
    }

    /// Elevation ring of the mirror.
    #[inline]
    pub fn ring(&self) -> u8 {
        self.ring
    }

    /// Mirror curvature radius (meters).
    #[inline]
    pub fn rcurve(&self) -> f64 {
        self.rcurve
    }

    /// z of the photomultiplier face plane (meters).
    #[inline]
    pub fn camera_z(&self) -> f64 {
        self.camera_z
    }

    /// Flat-to-flat size of each facet (meters).
    #[inline]
    pub fn segment_size(&self) -> f64 {
        self.segment_size
    }

    /// Facets of this mirror.
    #[inline]
    pub fn segments(&self) -> &[SegmentGeometry] {
        &self.segments
    }

    /// Mutable access to the facets. The facet count cannot change.
    #[inline]
    pub fn segments_mut(&mut self) -> &mut [SegmentGeometry] {
        &mut self.segments
    }

    /// Number of facets.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn validate(&self) -> Result<()> {
        let check = |ok: bool, msg: String| {
            if ok {
                Ok(())
            } else {
                Err(Error::InvalidGeometry(msg))
            }
        };

        check(
            self.rcurve.is_finite() && self.rcurve > 0.0,
            format!("mirror radius {} must be positive", self.rcurve),
        )?;
        check(
            self.camera_z.is_finite() && self.camera_z < 0.0 && self.camera_z > -self.rcurve,
            format!(
                "camera plane z={} must lie between the mirror and its centre of curvature",
                self.camera_z
            ),
        )?;
        check(
            self.segment_size.is_finite() && self.segment_size > 0.0,
            format!("segment size {} must be positive", self.segment_size),
        )?;
        check(
            !self.segments.is_empty() && self.segments.len() <= MAX_SEGMENTS,
            format!(
                "segment count {} outside 1..={}",
                self.segments.len(),
                MAX_SEGMENTS
            ),
        )?;

        for (i, seg) in self.segments.iter().enumerate() {
            check(
                (seg.direction.norm() - 1.0).abs() < 1e-6,
                format!("segment {i} direction is not a unit vector"),
            )?;
            check(
                seg.rcurve.is_finite() && seg.rcurve > 0.0,
                format!("segment {i} radius {} must be positive", seg.rcurve),
            )?;
            check(
                seg.center.iter().all(|c| c.is_finite()),
                format!("segment {i} centre of curvature is not finite"),
            )?;
            check(
                seg.spot_deg.is_finite() && seg.spot_deg >= 0.0,
                format!("segment {i} spot size {} must be non-negative", seg.spot_deg),
            )?;
            check(
                (0.0..=1.0).contains(&seg.reflectivity),
                format!("segment {i} reflectivity {} outside [0, 1]", seg.reflectivity),
            )?;
        }
        Ok(())
    }

    /// Ideal lower-ring 18-facet mirror: 6 inner-ring and 12 outer-ring
    /// hexagons on a sphere of radius [`NOMINAL_MIRROR_RCURVE`], all facets
    /// sharing the mirror's centre of curvature.
    pub fn nominal() -> Self {
        let rcurve = NOMINAL_MIRROR_RCURVE;
        let pitch = NOMINAL_SEGMENT_SIZE + NOMINAL_SEGMENT_GAP;
        let mut segments = Vec::with_capacity(MAX_SEGMENTS);

        for (ring, offsets) in [(1u8, inner_ring(pitch)), (2u8, outer_ring(pitch))] {
            for (u, v) in offsets {
                let w = (rcurve * rcurve - u * u - v * v).sqrt();
                segments.push(SegmentGeometry::aligned(
                    Vector3::new(u, v, -w) / rcurve,
                    rcurve,
                    ring,
                ));
            }
        }

        Self {
            ring: LOWER_RING,
            rcurve,
            camera_z: NOMINAL_CAMERA_Z,
            segment_size: NOMINAL_SEGMENT_SIZE,
            segments,
        }
    }
}

fn inner_ring(pitch: f64) -> Vec<(f64, f64)> {
    (0..6)
        .map(|k| {
            let a = (60.0 * k as f64).to_radians();
            (pitch * a.cos(), pitch * a.sin())
        })
        .collect()
}

fn outer_ring(pitch: f64) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(12);
    for k in 0..6 {
        let corner = (60.0 * k as f64).to_radians();
        out.push((2.0 * pitch * corner.cos(), 2.0 * pitch * corner.sin()));
        let edge = corner + 30f64.to_radians();
        let r = 3f64.sqrt() * pitch;
        out.push((r * edge.cos(), r * edge.sin()));
    }
    out
}

/// Complete optical geometry of one detector station.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteGeometry {
    site: SiteId,
    uniq_id: u32,
    mirrors: Vec<MirrorGeometry>,
}

impl SiteGeometry {
    /// Creates a site geometry from validated mirrors.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if `mirrors` is empty.
    pub fn new(site: SiteId, uniq_id: u32, mirrors: Vec<MirrorGeometry>) -> Result<Self> {
        if mirrors.is_empty() {
            return Err(Error::InvalidGeometry("site has no mirrors".to_string()));
        }
        Ok(Self {
            site,
            uniq_id,
            mirrors,
        })
    }

    /// Ideal geometry with `mirror_count` nominal mirrors, alternating
    /// between the upper and lower ring starting with the upper.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if `mirror_count` is zero.
    pub fn nominal(site: SiteId, uniq_id: u32, mirror_count: usize) -> Result<Self> {
        let mirrors = (0..mirror_count)
            .map(|i| MirrorGeometry::nominal().with_ring(nominal_mirror_ring(i)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(site, uniq_id, mirrors)
    }

    /// Station this geometry describes.
    #[inline]
    pub fn site(&self) -> SiteId {
        self.site
    }

    /// Geometry vintage identifier.
    #[inline]
    pub fn uniq_id(&self) -> u32 {
        self.uniq_id
    }

    /// Whether records traced against this geometry have their y flipped.
    #[inline]
    pub fn flips_camera_y(&self) -> bool {
        flips_camera_y(self.uniq_id)
    }

    /// Number of mirrors.
    #[inline]
    pub fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }

    /// All mirrors in index order.
    #[inline]
    pub fn mirrors(&self) -> &[MirrorGeometry] {
        &self.mirrors
    }

    /// Mirror `index`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMirror`] when `index` is out of range.
    pub fn mirror(&self, index: usize) -> Result<&MirrorGeometry> {
        let count = self.mirrors.len();
        self.mirrors
            .get(index)
            .ok_or(Error::InvalidMirror { index, count })
    }

    /// Mutable mirror `index`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidMirror`] when `index` is out of range.
    pub fn mirror_mut(&mut self, index: usize) -> Result<&mut MirrorGeometry> {
        let count = self.mirrors.len();
        self.mirrors
            .get_mut(index)
            .ok_or(Error::InvalidMirror { index, count })
    }
}
