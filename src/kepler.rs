//! Universal-variable two-body solution.
//!
//! The universal formulation handles elliptic, parabolic and hyperbolic motion with one
//! set of equations, which matters here: hypothesized states built from arbitrary
//! (distance, radial velocity) pairs routinely land on unbound or nearly radial orbits.
//!
//! Notation: `alpha = v² − 2μ/r` (twice the specific energy), `sig0 = r·v`,
//! `psi` the universal anomaly, `s0..s3` the Stumpff-type functions of `(psi, alpha)`.
use nalgebra::Vector3;

/// Largest `|alpha·psi²|` summed directly.
const BETA_MAX: f64 = 100.0;
const MAX_SERIES_TERMS: usize = 70;
const MAX_HALVINGS: usize = 30;
const MAX_NEWTON_STEPS: usize = 100;

const TOLERANCE: f64 = 100.0 * f64::EPSILON;

/// Sum `first + t₁ + t₂ + …` with `tⱼ = tⱼ₋₁ · beta / ((2j + offset)(2j + offset + 1))`.
///
/// All four Stumpff-type series share this recurrence; they only differ by `offset`
/// (−1 for `s0`, 0 for `s1`, 1 for `s2`, 2 for `s3`).
fn stumpff_series(first: f64, beta: f64, offset: f64) -> f64 {
    let mut term = first;
    let mut sum = first;
    for j in 1..=MAX_SERIES_TERMS {
        let k = 2.0 * j as f64 + offset;
        term *= beta / (k * (k + 1.0));
        sum += term;
        if term.abs() < TOLERANCE || term.abs() > 1.0 / f64::EPSILON {
            break;
        }
    }
    sum
}

/// Stumpff-type functions `s0, s1, s2, s3` of the universal anomaly.
///
/// For `|alpha·psi²| < 100` the `s2, s3` series are summed directly. Otherwise `psi` is
/// halved until the series converge, `s0, s1` are summed at the reduced anomaly and brought
/// back with the duplication formulas `s0(2ψ) = 2·s0² − 1`, `s1(2ψ) = 2·s0·s1`.
pub(crate) fn s_funct(psi: f64, alpha: f64) -> (f64, f64, f64, f64) {
    let beta = alpha * psi * psi;

    if beta.abs() < BETA_MAX {
        let s2 = stumpff_series(psi * psi / 2.0, beta, 1.0);
        let s3 = stumpff_series(psi * psi * psi / 6.0, beta, 2.0);
        return (1.0 + alpha * s2, psi + alpha * s3, s2, s3);
    }

    let mut reduced = psi;
    let mut halvings = 0;
    while (alpha * reduced * reduced).abs() >= BETA_MAX && halvings < MAX_HALVINGS {
        reduced *= 0.5;
        halvings += 1;
    }

    let beta = alpha * reduced * reduced;
    let mut s0 = stumpff_series(1.0, beta, -1.0);
    let mut s1 = stumpff_series(reduced, beta, 0.0);
    for _ in 0..halvings {
        (s0, s1) = (2.0 * s0 * s0 - 1.0, 2.0 * s0 * s1);
    }

    (s0, s1, (s0 - 1.0) / alpha, (s1 - psi) / alpha)
}

/// Newton solution of the universal Kepler equation
/// `r0·s1 + sig0·s2 + μ·s3 = dt`.
///
/// The initial guess `psi = dt / r0` is the zeroth-order expansion of the equation and stays
/// valid for radial trajectories, where elliptic-anomaly based guesses degenerate (`e = 1`).
///
/// Return
/// ----------
/// * `Some((psi, s0, s1, s2, s3))` on convergence, `None` when the iteration diverges
///   (`|s3|` overflow) or does not converge.
pub(crate) fn solve_kepuni(
    dt: f64,
    r0: f64,
    sig0: f64,
    mu: f64,
    alpha: f64,
) -> Option<(f64, f64, f64, f64, f64)> {
    let mut psi = dt / r0;

    for _ in 0..MAX_NEWTON_STEPS {
        let (s0, s1, s2, s3) = s_funct(psi, alpha);
        if s3.abs() > 1e-2 / f64::EPSILON {
            return None;
        }

        // flight time and its derivative (the radius) at psi
        let residual = r0 * s1 + sig0 * s2 + mu * s3 - dt;
        let radius = r0 * s0 + sig0 * s1 + mu * s2;
        if radius == 0.0 || !radius.is_finite() {
            return None;
        }

        let step = -residual / radius;
        let next = psi + step;
        // crossing psi = 0 flips the sign of the flight time
        psi = if next * psi < 0.0 { 0.5 * psi } else { next };

        if step.abs() < TOLERANCE.max(10.0 * TOLERANCE * psi.abs()) {
            let (s0, s1, s2, s3) = s_funct(psi, alpha);
            return Some((psi, s0, s1, s2, s3));
        }
    }

    None
}

/// Result of a two-body propagation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct KeplerStep {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// `|f·ġ − ḟ·g − 1|`, zero for an exact solution.
    pub residual: f64,
}

/// Propagate `(position, velocity)` by `dt` days under the two-body problem with
/// gravitational parameter `mu`, through the Lagrange `f, g` coefficients.
///
/// Return
/// ----------
/// * `None` when the universal Kepler equation has no converged solution.
pub(crate) fn propagate_fg(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    dt: f64,
    mu: f64,
) -> Option<KeplerStep> {
    let r0 = position.norm();
    let sig0 = position.dot(velocity);
    let alpha = velocity.norm_squared() - 2.0 * mu / r0;

    let (_psi, s0, s1, s2, s3) = solve_kepuni(dt, r0, sig0, mu, alpha)?;

    let r = r0 * s0 + sig0 * s1 + mu * s2;
    if r <= 0.0 || !r.is_finite() {
        return None;
    }

    let f = 1.0 - mu * s2 / r0;
    let g = dt - mu * s3;
    let fdot = -mu * s1 / (r0 * r);
    let gdot = 1.0 - mu * s2 / r;

    Some(KeplerStep {
        position: f * position + g * velocity,
        velocity: fdot * position + gdot * velocity,
        residual: (f * gdot - fdot * g - 1.0).abs(),
    })
}
