//! Conic summary of a heliocentric state.
//!
//! Linkages carry a mean state vector; downstream orbit determination usually wants to sift
//! candidates by their rough orbital class first. [`ConicSummary`] gives the three numbers
//! needed for that (semi-major axis, eccentricity, ecliptic inclination) plus the perihelion
//! distance, computed from the Laplace-Runge-Lenz vector.
use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{Au, Radian, GAUSS_GRAV_SQUARED};
use crate::ref_system::equatorial_to_ecliptic;

/// Osculating conic of a heliocentric state.
///
/// `semi_major_axis` is negative for hyperbolic states and infinite for an exactly
/// parabolic one; `inclination` is measured from the J2000 ecliptic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConicSummary {
    pub semi_major_axis: Au,
    pub eccentricity: f64,
    pub inclination: Radian,
    pub perihelion_distance: Au,
}

impl ConicSummary {
    /// Build the summary from an equatorial J2000 heliocentric state (AU, AU/day).
    ///
    /// Return
    /// ----------
    /// * `None` for the degenerate zero-radius state.
    pub fn from_state(position: &Vector3<f64>, velocity: &Vector3<f64>) -> Option<Self> {
        let mu = GAUSS_GRAV_SQUARED;
        let r = position.norm();
        if r == 0.0 || !r.is_finite() {
            return None;
        }

        let h = position.cross(velocity);
        let ecc_vec = velocity.cross(&h) / mu - position / r;
        let eccentricity = ecc_vec.norm();

        let alpha = velocity.norm_squared() - 2.0 * mu / r;
        let semi_major_axis = if alpha == 0.0 {
            f64::INFINITY
        } else {
            -mu / alpha
        };

        let h_ecl = equatorial_to_ecliptic(&h);
        let h_norm = h_ecl.norm();
        let inclination = if h_norm == 0.0 {
            0.0
        } else {
            (h_ecl.z / h_norm).clamp(-1.0, 1.0).acos()
        };

        // q = p / (1 + e), p = h²/μ; stays finite on every branch
        let perihelion_distance = h.norm_squared() / mu / (1.0 + eccentricity);

        Some(ConicSummary {
            semi_major_axis,
            eccentricity,
            inclination,
            perihelion_distance,
        })
    }

    /// True for bound (elliptic) conics.
    pub fn is_bound(&self) -> bool {
        self.eccentricity < 1.0 && self.semi_major_axis > 0.0
    }
}

impl fmt::Display for ConicSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "a={:.4} AU, e={:.4}, i={:.3}°, q={:.4} AU",
            self.semi_major_axis,
            self.eccentricity,
            self.inclination.to_degrees(),
            self.perihelion_distance
        )
    }
}
