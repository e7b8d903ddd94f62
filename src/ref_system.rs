//! Reference-frame utilities.
//!
//! Every vector in the crate lives in the **heliocentric equatorial mean J2000** frame
//! (ICRS-aligned). The helpers below cover the few places that need something else:
//! lines of sight from (RA, DEC), the ecliptic plane for prograde directions, and the
//! angular geometry used when pairing detections into tracklets.
use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::constants::{Radian, DPI, OBLIQUITY_J2000};

/// Rotation matrix of angle `alpha` around axis `k` (0 → X, 1 → Y, 2 → Z), in the passive
/// convention used for frame changes: `x' = R · x` expresses `x` in the rotated frame.
///
/// Any `k > 2` is treated as the Z axis.
pub fn rotmt(alpha: Radian, k: usize) -> Matrix3<f64> {
    let axis = match k {
        0 => Vector3::x_axis(),
        1 => Vector3::y_axis(),
        _ => Vector3::z_axis(),
    };
    Rotation3::from_axis_angle(&axis, -alpha).into_inner()
}

/// Equatorial J2000 → ecliptic J2000.
pub fn equatorial_to_ecliptic(v: &Vector3<f64>) -> Vector3<f64> {
    rotmt(OBLIQUITY_J2000, 0) * v
}

/// Ecliptic J2000 → equatorial J2000.
pub fn ecliptic_to_equatorial(v: &Vector3<f64>) -> Vector3<f64> {
    rotmt(-OBLIQUITY_J2000, 0) * v
}

/// North pole of the J2000 ecliptic expressed in the equatorial frame.
pub fn ecliptic_pole() -> Vector3<f64> {
    Vector3::new(0.0, -OBLIQUITY_J2000.sin(), OBLIQUITY_J2000.cos())
}

/// Unit line-of-sight vector pointing at (RA, DEC).
#[inline]
pub fn unit_vector(ra: Radian, dec: Radian) -> Vector3<f64> {
    let cos_dec = dec.cos();
    Vector3::new(ra.cos() * cos_dec, ra.sin() * cos_dec, dec.sin())
}

/// Convert a Cartesian vector to right ascension, declination and norm.
///
/// Return
/// ----------
/// * `(α, δ, ρ)` with `α ∈ [0, 2π)`, `δ ∈ [−π/2, π/2]`; the zero vector maps to `(0, 0, 0)`.
pub fn cartesian_to_radec(v: &Vector3<f64>) -> (Radian, Radian, f64) {
    let norm = v.norm();
    if norm == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let dec = (v.z / norm).clamp(-1.0, 1.0).asin();
    let ra = v.y.atan2(v.x).rem_euclid(DPI);
    (ra, dec, norm)
}

/// Great-circle separation between two directions (haversine form, stable at small angles).
pub fn angular_separation(ra1: Radian, dec1: Radian, ra2: Radian, dec2: Radian) -> Radian {
    let sin_ddec = ((dec2 - dec1) / 2.0).sin();
    let sin_dra = ((ra2 - ra1) / 2.0).sin();
    let h = sin_ddec * sin_ddec + dec1.cos() * dec2.cos() * sin_dra * sin_dra;
    2.0 * h.sqrt().clamp(0.0, 1.0).asin()
}
