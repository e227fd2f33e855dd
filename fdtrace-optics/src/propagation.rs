//! Geometric optics primitives: intersections, reflection, refraction,
//! spot blur and slab transmission.
//!
//! A ray is a point `p` and a unit direction `u`; tracing to a surface means
//! solving `p' = p + s u` for the path length `s`.

use fdtrace_core::{OpticalLayer, Ray};
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Smallest path length accepted as a forward intersection (meters).
pub const MIN_PATH: f64 = 1e-9;

const COS30: f64 = 0.866_025_403_784_438_7;

/// Path length from the ray to the far side of a sphere.
///
/// Mirror facets are concave toward the ray, so the far root is the
/// reflecting surface when the ray starts inside the sphere.
pub fn intersect_sphere(ray: &Ray, center: &Vector3<f64>, radius: f64) -> Option<f64> {
    let oc = ray.origin - center;
    let b = oc.dot(&ray.direction);
    let c = oc.norm_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let s = -b + disc.sqrt();
    (s > MIN_PATH).then_some(s)
}

/// Path length from the ray to the plane of constant `z`.
pub fn intersect_plane_z(ray: &Ray, z: f64) -> Option<f64> {
    if ray.direction.z.abs() < f64::EPSILON {
        return None;
    }
    let s = (z - ray.origin.z) / ray.direction.z;
    (s > MIN_PATH).then_some(s)
}

/// Whether the segment `origin .. origin + max_path * direction` crosses the
/// axis-aligned box `[lo, hi]`.
pub fn crosses_box(ray: &Ray, max_path: f64, lo: &Vector3<f64>, hi: &Vector3<f64>) -> bool {
    let mut t_near = 0.0f64;
    let mut t_far = max_path;
    for axis in 0..3 {
        let o = ray.origin[axis];
        let d = ray.direction[axis];
        if d.abs() < f64::EPSILON {
            if o < lo[axis] || o > hi[axis] {
                return false;
            }
            continue;
        }
        let (mut t0, mut t1) = ((lo[axis] - o) / d, (hi[axis] - o) / d);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return false;
        }
    }
    true
}

/// Mirror reflection: `u' = u - 2 (u . n) n`.
#[inline]
pub fn reflect(direction: &Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    (direction - normal * (2.0 * direction.dot(normal))).normalize()
}

/// Snell refraction from index `n1` into `n2` across a surface with unit
/// `normal`. Returns `None` on total internal reflection.
pub fn refract(
    direction: &Vector3<f64>,
    normal: &Vector3<f64>,
    n1: f64,
    n2: f64,
) -> Option<Vector3<f64>> {
    // Orient the normal against the incoming ray.
    let (n, cos_i) = {
        let c = -direction.dot(normal);
        if c < 0.0 {
            (-normal, -c)
        } else {
            (*normal, c)
        }
    };
    let eta = n1 / n2;
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
    if sin2_t > 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    Some((direction * eta + n * (eta * cos_i - cos_t)).normalize())
}

/// Two unit vectors completing `v` to a right-handed orthonormal frame.
pub fn orthonormal_basis(v: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if v.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let a = (helper - v * helper.dot(v)).normalize();
    let b = v.cross(&a);
    (a, b)
}

/// Perturbs `direction` by two independent Gaussian angles of width
/// `sigma_rad` about perpendicular axes.
pub fn wiggle<R: Rng + ?Sized>(direction: &Vector3<f64>, sigma_rad: f64, rng: &mut R) -> Vector3<f64> {
    if sigma_rad <= 0.0 {
        return *direction;
    }
    let Ok(normal) = Normal::new(0.0, sigma_rad) else {
        return *direction;
    };
    let (a, b) = orthonormal_basis(direction);
    let da: f64 = normal.sample(rng);
    let db: f64 = normal.sample(rng);
    (direction + a * da.tan() + b * db.tan()).normalize()
}

/// Point-in-hexagon test for a pointy-top hexagon (vertical flat sides)
/// centred at the origin with the given flat-to-flat size.
#[inline]
pub fn in_hexagon(dx: f64, dy: f64, flat_to_flat: f64) -> bool {
    let apothem = 0.5 * flat_to_flat;
    let ax = dx.abs();
    ax <= apothem && 0.5 * ax + COS30 * dy.abs() <= apothem
}

/// Outcome of crossing a flat layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabCrossing {
    /// The ray reached the back face.
    Transmitted,
    /// The ray was absorbed or totally reflected inside the layer.
    Absorbed,
}

/// Carries `ray` from the front face of a layer perpendicular to z to its
/// back face.
///
/// With `shift` the ray refracts into the layer (and back out, restoring its
/// direction); otherwise it crosses undeviated. With `absorb` the ray
/// survives with probability `T^(1/cos)`, where `cos` is the in-layer
/// direction cosine.
pub fn cross_slab<R: Rng + ?Sized>(
    ray: &mut Ray,
    layer: &OpticalLayer,
    n_outside: f64,
    shift: bool,
    absorb: bool,
    rng: &mut R,
) -> SlabCrossing {
    if layer.thickness <= 0.0 {
        return SlabCrossing::Transmitted;
    }
    let outside = ray.direction;
    let face_normal = Vector3::new(0.0, 0.0, -outside.z.signum());

    let inside = if shift {
        match refract(&outside, &face_normal, n_outside, layer.index) {
            Some(d) => d,
            None => return SlabCrossing::Absorbed,
        }
    } else {
        outside
    };

    let cos_inside = inside.z.abs();
    if cos_inside < f64::EPSILON {
        return SlabCrossing::Absorbed;
    }
    if absorb {
        let survival = layer.transmittance.powf(1.0 / cos_inside);
        if rng.gen::<f64>() >= survival {
            return SlabCrossing::Absorbed;
        }
    }

    ray.direction = inside;
    ray.advance(layer.thickness / cos_inside);
    ray.direction = outside;
    SlabCrossing::Transmitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_sphere_far_root_from_inside() {
        let ray = Ray::new(Vector3::new(0.0, 0.0, -3.0), Vector3::new(0.0, 0.0, -1.0));
        let s = intersect_sphere(&ray, &Vector3::zeros(), 6.0).unwrap();
        assert_relative_eq!(s, 3.0, epsilon = 1e-12);
        assert_relative_eq!(ray.at(s).z, -6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_miss() {
        let ray = Ray::new(Vector3::new(10.0, 0.0, 0.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(intersect_sphere(&ray, &Vector3::zeros(), 6.0).is_none());
    }

    #[test]
    fn test_plane_behind_ray() {
        let ray = Ray::new(Vector3::new(0.0, 0.0, -3.0), Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(intersect_plane_z(&ray, -1.0).unwrap(), 2.0);
        assert!(intersect_plane_z(&ray, -4.0).is_none());
    }

    #[test]
    fn test_reflect_normal_incidence() {
        let d = Vector3::new(0.0, 0.0, -1.0);
        let n = Vector3::new(0.0, 0.0, -1.0);
        assert_relative_eq!(reflect(&d, &n), Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_refract_snell() {
        let theta = 30f64.to_radians();
        let d = Vector3::new(theta.sin(), 0.0, theta.cos());
        let n = Vector3::new(0.0, 0.0, -1.0);
        let t = refract(&d, &n, 1.0, 1.5).unwrap();
        assert_relative_eq!(t.x, theta.sin() / 1.5, epsilon = 1e-12);
        assert_relative_eq!(t.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_total_internal_reflection() {
        let theta = 60f64.to_radians();
        let d = Vector3::new(theta.sin(), 0.0, theta.cos());
        let n = Vector3::new(0.0, 0.0, -1.0);
        assert!(refract(&d, &n, 1.5, 1.0).is_none());
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let v = Vector3::new(0.3, -0.2, 0.9).normalize();
        let (a, b) = orthonormal_basis(&v);
        assert_relative_eq!(a.dot(&v), 0.0, epsilon = 1e-12);
        assert_relative_eq!(b.dot(&v), 0.0, epsilon = 1e-12);
        assert_relative_eq!(a.dot(&b), 0.0, epsilon = 1e-12);
        assert_relative_eq!(b.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wiggle_zero_sigma_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let d = Vector3::new(0.0, 0.6, 0.8);
        assert_eq!(wiggle(&d, 0.0, &mut rng), d);
    }

    #[test]
    fn test_wiggle_spread_matches_sigma() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let d = Vector3::new(0.0, 0.0, 1.0);
        let sigma = 0.01;
        let n = 20_000;
        let mean_sq: f64 = (0..n)
            .map(|_| {
                let w = wiggle(&d, sigma, &mut rng);
                w.x * w.x
            })
            .sum::<f64>()
            / f64::from(n);
        assert_relative_eq!(mean_sq.sqrt(), sigma, max_relative = 0.05);
    }

    #[test]
    fn test_hexagon() {
        assert!(in_hexagon(0.0, 0.0, 0.06));
        assert!(in_hexagon(0.0299, 0.0, 0.06));
        assert!(!in_hexagon(0.0301, 0.0, 0.06));
        assert!(in_hexagon(0.0, 0.034, 0.06));
        assert!(!in_hexagon(0.0, 0.035, 0.06));
    }

    #[test]
    fn test_slab_normal_incidence_no_shift() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let layer = OpticalLayer {
            index: 1.5,
            thickness: 0.01,
            transmittance: 1.0,
        };
        let mut ray = Ray::new(Vector3::new(0.1, 0.2, -3.0), Vector3::new(0.0, 0.0, 1.0));
        let out = cross_slab(&mut ray, &layer, 1.0, true, true, &mut rng);
        assert_eq!(out, SlabCrossing::Transmitted);
        assert_relative_eq!(ray.origin, Vector3::new(0.1, 0.2, -2.99), epsilon = 1e-12);
    }

    #[test]
    fn test_slab_shift_reduces_lateral_travel() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let layer = OpticalLayer {
            index: 1.5,
            thickness: 0.01,
            transmittance: 1.0,
        };
        let d = Vector3::new(0.5, 0.0, 1.0).normalize();
        let mut straight = Ray::new(Vector3::zeros(), d);
        let mut bent = straight;
        cross_slab(&mut straight, &layer, 1.0, false, false, &mut rng);
        cross_slab(&mut bent, &layer, 1.0, true, false, &mut rng);
        assert_relative_eq!(straight.origin.z, bent.origin.z, epsilon = 1e-12);
        assert!(bent.origin.x < straight.origin.x);
        assert_relative_eq!(bent.direction, d, epsilon = 1e-12);
    }

    #[test]
    fn test_opaque_slab_absorbs() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let layer = OpticalLayer {
            index: 1.5,
            thickness: 0.01,
            transmittance: 0.0,
        };
        let mut ray = Ray::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(
            cross_slab(&mut ray, &layer, 1.0, true, true, &mut rng),
            SlabCrossing::Absorbed
        );
    }

    #[test]
    fn test_crosses_box() {
        let lo = Vector3::new(-1.0, -1.0, 0.0);
        let hi = Vector3::new(1.0, 1.0, 0.5);
        let into = Ray::new(Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(crosses_box(&into, 10.0, &lo, &hi));
        assert!(!crosses_box(&into, 0.4, &lo, &hi));
        let beside = Ray::new(Vector3::new(2.0, 0.0, 1.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(!crosses_box(&beside, 10.0, &lo, &hi));
    }
}
