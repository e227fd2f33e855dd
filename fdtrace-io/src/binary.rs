//! Little-endian binary geometry format.
//!
//! Layout (all integers `u32`, all reals `f64`, little-endian):
//!
//! ```text
//! header   : magic "FDGEOM\0\0" | version | site id | uniq id | mirror count
//! mirror   : ring | rcurve | camera z | segment size | segment count
//! segment  : direction[3] | rcurve | center[3] | spot (deg) | reflectivity | ring
//! ```
//!
//! Mirrors follow the header in index order, each followed by its segments.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use crate::{Error, Result};
use fdtrace_core::{MirrorGeometry, SegmentGeometry, SiteGeometry, SiteId, MAX_SEGMENTS};
use nalgebra::Vector3;

/// File signature.
pub const MAGIC: &[u8; 8] = b"FDGEOM\0\0";

/// Current format version.
pub const VERSION: u32 = 2;

const HEADER_SIZE: usize = 8 + 4 * 4;
const MIRROR_SIZE: usize = 4 + 3 * 8 + 4;
const SEGMENT_SIZE: usize = 9 * 8 + 4;

/// Upper bound on mirrors accepted from a file.
const MAX_MIRRORS: usize = 64;

/// True when `data` starts with the binary geometry signature.
pub fn has_magic(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

/// Serializes `geometry` to the binary format.
pub fn encode(geometry: &SiteGeometry) -> Vec<u8> {
    let segments: usize = geometry.mirrors().iter().map(MirrorGeometry::segment_count).sum();
    let mut out =
        Vec::with_capacity(HEADER_SIZE + geometry.mirror_count() * MIRROR_SIZE + segments * SEGMENT_SIZE);

    out.extend_from_slice(MAGIC);
    put_u32(&mut out, VERSION);
    put_u32(&mut out, geometry.site().as_raw() as u32);
    put_u32(&mut out, geometry.uniq_id());
    put_u32(&mut out, geometry.mirror_count() as u32);

    for mirror in geometry.mirrors() {
        put_u32(&mut out, u32::from(mirror.ring()));
        put_f64(&mut out, mirror.rcurve());
        put_f64(&mut out, mirror.camera_z());
        put_f64(&mut out, mirror.segment_size());
        put_u32(&mut out, mirror.segment_count() as u32);
        for seg in mirror.segments() {
            put_vec(&mut out, &seg.direction);
            put_f64(&mut out, seg.rcurve);
            put_vec(&mut out, &seg.center);
            put_f64(&mut out, seg.spot_deg);
            put_f64(&mut out, seg.reflectivity);
            put_u32(&mut out, u32::from(seg.ring));
        }
    }
    out
}

/// Parses a binary geometry image.
///
/// # Errors
/// Returns [`Error::InvalidFormat`] for a bad signature, unsupported
/// version, truncated or trailing data, and [`Error::CoreError`] when the
/// decoded geometry fails validation.
pub fn decode(data: &[u8]) -> Result<SiteGeometry> {
    if !has_magic(data) {
        return Err(Error::InvalidFormat("missing FDGEOM signature".to_string()));
    }
    let mut cursor = ByteCursor::new(&data[MAGIC.len()..]);

    let version = cursor.u32("version")?;
    if version != VERSION {
        return Err(Error::InvalidFormat(format!(
            "unsupported geometry version {version} (expected {VERSION})"
        )));
    }
    let site = SiteId::from_raw(cursor.u32("site id")? as i32)?;
    let uniq_id = cursor.u32("uniq id")?;
    let mirror_count = cursor.u32("mirror count")? as usize;
    if mirror_count == 0 || mirror_count > MAX_MIRRORS {
        return Err(Error::InvalidFormat(format!(
            "mirror count {mirror_count} outside 1..={MAX_MIRRORS}"
        )));
    }

    let mut mirrors = Vec::with_capacity(mirror_count);
    for m in 0..mirror_count {
        let ring = u8::try_from(cursor.u32("mirror ring")?)
            .map_err(|_| Error::InvalidFormat(format!("mirror {m}: ring out of range")))?;
        let rcurve = cursor.f64("mirror radius")?;
        let camera_z = cursor.f64("camera z")?;
        let segment_size = cursor.f64("segment size")?;
        let segment_count = cursor.u32("segment count")? as usize;
        if segment_count > MAX_SEGMENTS {
            return Err(Error::InvalidFormat(format!(
                "mirror {m} declares {segment_count} segments (max {MAX_SEGMENTS})"
            )));
        }

        let mut segments = Vec::with_capacity(segment_count);
        for _ in 0..segment_count {
            let direction = cursor.vec3("segment direction")?;
            let seg_rcurve = cursor.f64("segment radius")?;
            let center = cursor.vec3("segment center")?;
            let spot_deg = cursor.f64("segment spot")?;
            let reflectivity = cursor.f64("segment reflectivity")?;
            let ring = u8::try_from(cursor.u32("segment ring")?)
                .map_err(|_| Error::InvalidFormat(format!("mirror {m}: ring out of range")))?;
            segments.push(SegmentGeometry {
                direction,
                rcurve: seg_rcurve,
                center,
                spot_deg,
                reflectivity,
                ring,
            });
        }
        mirrors.push(MirrorGeometry::new(rcurve, camera_z, segment_size, segments)?.with_ring(ring)?);
    }

    if cursor.remaining() != 0 {
        return Err(Error::InvalidFormat(format!(
            "{} trailing bytes after geometry",
            cursor.remaining()
        )));
    }
    Ok(SiteGeometry::new(site, uniq_id, mirrors)?)
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_vec(out: &mut Vec<u8>, v: &Vector3<f64>) {
    for c in v.iter() {
        put_f64(out, *c);
    }
}

struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or_else(|| Error::InvalidFormat(format!("truncated while reading {what}")))?;
        self.pos += N;
        Ok(bytes)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.take::<4>(what).map(u32::from_le_bytes)
    }

    fn f64(&mut self, what: &str) -> Result<f64> {
        self.take::<8>(what).map(f64::from_le_bytes)
    }

    fn vec3(&mut self, what: &str) -> Result<Vector3<f64>> {
        Ok(Vector3::new(self.f64(what)?, self.f64(what)?, self.f64(what)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SiteGeometry {
        SiteGeometry::nominal(SiteId::LongRidge, 1_320_019_200, 2).unwrap()
    }

    #[test]
    fn test_encoded_size() {
        let data = encode(&sample());
        assert_eq!(data.len(), HEADER_SIZE + 2 * MIRROR_SIZE + 36 * SEGMENT_SIZE);
        assert!(has_magic(&data));
    }

    #[test]
    fn test_decode_restores_geometry() {
        let geom = sample();
        let decoded = decode(&encode(&geom)).unwrap();
        assert_eq!(decoded, geom);
        assert!(decoded.flips_camera_y());
        assert_eq!(decoded.mirror(0).unwrap().ring(), 2);
        assert_eq!(decoded.mirror(1).unwrap().ring(), 1);
    }

    #[test]
    fn test_bad_mirror_ring_rejected() {
        let mut data = encode(&sample());
        // First mirror record starts right after the header.
        data[HEADER_SIZE] = 5;
        assert!(matches!(
            decode(&data),
            Err(Error::CoreError(fdtrace_core::Error::InvalidGeometry(_)))
        ));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let data = encode(&sample());
        let err = decode(&data[..data.len() - 3]).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(msg) if msg.contains("truncated")));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut data = encode(&sample());
        data.push(0);
        assert!(matches!(decode(&data), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_version_and_magic() {
        let mut data = encode(&sample());
        data[8] = 9;
        assert!(matches!(decode(&data), Err(Error::InvalidFormat(msg)) if msg.contains("version")));
        assert!(decode(b"not a geometry file").is_err());
    }

    #[test]
    fn test_unknown_site_rejected() {
        let mut data = encode(&sample());
        data[12] = 7;
        assert!(matches!(
            decode(&data),
            Err(Error::CoreError(fdtrace_core::Error::UnknownSite(7)))
        ));
    }
}
