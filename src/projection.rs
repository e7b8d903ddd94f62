//! # State-vector projection
//!
//! Turns a (detection, hypothesis) pair into a heliocentric state vector at the detection
//! epoch.
//!
//! ## Position
//!
//! With `o` the observer heliocentric position, `u` the unit line of sight and `r` the
//! hypothesized heliocentric distance at the detection epoch, the topocentric distance `ρ`
//! solves `|o + ρ·u| = r`:
//!
//! ```text
//! ρ = −(o·u) ± √((o·u)² − |o|² + r²)
//! ```
//!
//! The farther positive root is kept. Pairs with no real root, no positive root, or a root
//! closer than `min_topocentric_distance` produce a [`ProjectionFailure`] instead of a state.
//!
//! ## Velocity
//!
//! * [`VelocitySource::Tracklet`] – when the detection has a tracklet partner, the partner is
//!   projected under the same hypothesis and the velocity is the chord
//!   `(P_partner − P) / (t_partner − t)`.
//! * [`VelocitySource::SingleDetection`] (and the fallback when the partner cannot be
//!   projected) – the hypothesized radial velocity along `r̂`, plus an optional tangential
//!   component ([`TangentialModel`]).
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{Au, GAUSS_GRAV_SQUARED, MJD};
use crate::detections::{Detection, DetectionStore};
use crate::hypothesis::Hypothesis;
use crate::link_errors::ProjectionFailure;
use crate::ref_system::ecliptic_pole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VelocitySource {
    /// Chord velocity from the tracklet partner, single-detection model otherwise.
    #[default]
    Tracklet,
    /// Always the single-detection model.
    SingleDetection,
}

/// Tangential velocity assumed by the single-detection model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TangentialModel {
    #[default]
    Zero,
    /// Local circular speed `√(μ/r)`, prograde in the ecliptic.
    CircularPrograde,
}

/// How the velocity of a [`StateVector`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VelocityOrigin {
    Tracklet,
    Model,
}

/// Heliocentric state of one detection under one hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateVector {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub detection: usize,
    pub hypothesis: usize,
    pub epoch: MJD,
    pub topocentric_distance: Au,
    pub velocity_origin: VelocityOrigin,
}

/// Projection settings, extracted from [`LinkParams`](crate::params::LinkParams).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionSettings {
    pub reference_epoch: MJD,
    pub min_topocentric_distance: Au,
    pub velocity_source: VelocitySource,
    pub tangential_model: TangentialModel,
}

/// Topocentric distance at which the line of sight `los` from `observer` reaches
/// heliocentric distance `r`.
pub fn topocentric_distance(
    observer: &Vector3<f64>,
    los: &Vector3<f64>,
    r: Au,
    min_topocentric_distance: Au,
) -> Result<Au, ProjectionFailure> {
    if !(r > 0.0) {
        return Err(ProjectionFailure::NonPositiveDistance);
    }

    let b = observer.dot(los);
    let disc = b * b - observer.norm_squared() + r * r;
    if disc < 0.0 {
        return Err(ProjectionFailure::NoRealRoot);
    }

    let rho = -b + disc.sqrt();
    if rho <= 0.0 {
        return Err(ProjectionFailure::NoPositiveRoot);
    }
    if rho < min_topocentric_distance {
        return Err(ProjectionFailure::TooCloseToObserver);
    }
    Ok(rho)
}

/// Heliocentric position of `det` under `hyp` and its topocentric distance.
pub fn heliocentric_position(
    det: &Detection,
    hyp: &Hypothesis,
    settings: &ProjectionSettings,
) -> Result<(Vector3<f64>, Au), ProjectionFailure> {
    let r = hyp.distance_at(det.epoch - settings.reference_epoch);
    let los = det.line_of_sight();
    let rho = topocentric_distance(
        &det.observer_position,
        &los,
        r,
        settings.min_topocentric_distance,
    )?;
    Ok((det.observer_position + rho * los, rho))
}

/// Single-detection velocity model at heliocentric `position`, `dt` days from the reference
/// epoch.
pub fn model_velocity(
    position: &Vector3<f64>,
    hyp: &Hypothesis,
    dt: f64,
    tangential: TangentialModel,
) -> Vector3<f64> {
    let r = position.norm();
    let r_hat = position / r;
    let radial = hyp.radial_velocity_at(dt) * r_hat;

    match tangential {
        TangentialModel::Zero => radial,
        TangentialModel::CircularPrograde => {
            let along = ecliptic_pole().cross(&r_hat);
            let norm = along.norm();
            if norm < 1e-12 {
                // line of nodes undefined at the ecliptic poles
                radial
            } else {
                radial + (GAUSS_GRAV_SQUARED / r).sqrt() * along / norm
            }
        }
    }
}

/// Project detection `det_idx` of `store` under hypothesis `hyp` (index `hyp_idx` in the grid).
///
/// Arguments
/// -----------------
/// * `partner`: tracklet partner of the detection, if any.
///
/// Return
/// ----------
/// * The state vector, or the [`ProjectionFailure`] of the detection itself. A failing partner
///   only degrades the velocity to the single-detection model.
pub fn project(
    store: &DetectionStore,
    det_idx: usize,
    hyp_idx: usize,
    hyp: &Hypothesis,
    partner: Option<usize>,
    settings: &ProjectionSettings,
) -> Result<StateVector, ProjectionFailure> {
    let det = &store.detections()[det_idx];
    let (position, rho) = heliocentric_position(det, hyp, settings)?;

    let chord = match (settings.velocity_source, partner) {
        (VelocitySource::Tracklet, Some(j)) => {
            let other = &store.detections()[j];
            heliocentric_position(other, hyp, settings)
                .ok()
                .map(|(p_other, _)| (p_other - position) / (other.epoch - det.epoch))
        }
        _ => None,
    };

    let (velocity, velocity_origin) = match chord {
        Some(v) => (v, VelocityOrigin::Tracklet),
        None => (
            model_velocity(
                &position,
                hyp,
                det.epoch - settings.reference_epoch,
                settings.tangential_model,
            ),
            VelocityOrigin::Model,
        ),
    };

    Ok(StateVector {
        position,
        velocity,
        detection: det_idx,
        hypothesis: hyp_idx,
        epoch: det.epoch,
        topocentric_distance: rho,
        velocity_origin,
    })
}

#[cfg(test)]
mod projection_test {
    use super::*;
    use crate::constants::KM_S_TO_AU_DAY;
    use approx::assert_abs_diff_eq;

    fn settings() -> ProjectionSettings {
        ProjectionSettings {
            reference_epoch: 60000.0,
            min_topocentric_distance: 0.01,
            velocity_source: VelocitySource::Tracklet,
            tangential_model: TangentialModel::Zero,
        }
    }

    #[test]
    fn opposition_distance() {
        let o = Vector3::new(1.0, 0.0, 0.0);
        let rho = topocentric_distance(&o, &Vector3::x(), 2.5, 0.01).unwrap();
        assert_abs_diff_eq!(rho, 1.5, epsilon = 1e-15);
    }

    #[test]
    fn farther_root_inside_earth_orbit() {
        // looking sunward, r = 0.5 has roots ρ = 0.5 and ρ = 1.5
        let o = Vector3::new(1.0, 0.0, 0.0);
        let rho = topocentric_distance(&o, &(-Vector3::x()), 0.5, 0.01).unwrap();
        assert_abs_diff_eq!(rho, 1.5, epsilon = 1e-15);
    }

    #[test]
    fn geometric_failures() {
        let o = Vector3::new(1.0, 0.0, 0.0);
        // perpendicular line of sight never gets closer than 1 AU to the Sun
        assert_eq!(
            topocentric_distance(&o, &Vector3::y(), 0.5, 0.01),
            Err(ProjectionFailure::NoRealRoot)
        );
        // anti-sunward line of sight only moves away from r = 0.5
        assert_eq!(
            topocentric_distance(&o, &Vector3::x(), 0.5, 0.01),
            Err(ProjectionFailure::NoPositiveRoot)
        );
        assert_eq!(
            topocentric_distance(&o, &Vector3::x(), 1.005, 0.01),
            Err(ProjectionFailure::TooCloseToObserver)
        );
        assert_eq!(
            topocentric_distance(&o, &Vector3::x(), -1.0, 0.01),
            Err(ProjectionFailure::NonPositiveDistance)
        );
    }

    #[test]
    fn position_lies_on_hypothesis_sphere() {
        let det = Detection::new("a", 60001.0, Vector3::new(0.3, 0.9, 0.1), 1.2, 0.3, 0.1);
        let hyp = Hypothesis::new(2.0, 3.0 * KM_S_TO_AU_DAY, 0.0);
        let (p, rho) = heliocentric_position(&det, &hyp, &settings()).unwrap();
        assert_abs_diff_eq!(p.norm(), hyp.distance_at(1.0), epsilon = 1e-14);
        assert_abs_diff_eq!(
            (p - det.observer_position).normalize(),
            det.line_of_sight(),
            epsilon = 1e-14
        );
        assert!(rho > 0.0);
    }

    #[test]
    fn model_velocity_components() {
        let p = Vector3::new(0.0, 2.0, 0.0);
        let hyp = Hypothesis::new(2.0, 0.001, 0.0);

        let v = model_velocity(&p, &hyp, 0.0, TangentialModel::Zero);
        assert_abs_diff_eq!(v, Vector3::new(0.0, 0.001, 0.0), epsilon = 1e-18);

        let v = model_velocity(&p, &hyp, 0.0, TangentialModel::CircularPrograde);
        let tangential = v - Vector3::new(0.0, 0.001, 0.0);
        assert_abs_diff_eq!(tangential.norm(), (GAUSS_GRAV_SQUARED / 2.0).sqrt(), epsilon = 1e-15);
        assert_abs_diff_eq!(tangential.dot(&p), 0.0, epsilon = 1e-15);
        // prograde: angular momentum along the ecliptic pole
        assert!(p.cross(&tangential).dot(&ecliptic_pole()) > 0.0);
    }

    #[test]
    fn tracklet_chord_velocity_and_fallback() {
        let o = Vector3::new(1.0, 0.0, 0.0);
        let store = DetectionStore::new(vec![
            Detection::new("a", 60000.0, o, 0.0, 0.0, 0.1),
            Detection::new("b", 60000.05, o, 0.001, 0.0, 0.1),
        ])
        .unwrap();
        let hyp = Hypothesis::new(2.5, 0.0, 0.0);

        let s = project(&store, 0, 0, &hyp, Some(1), &settings()).unwrap();
        assert_eq!(s.velocity_origin, VelocityOrigin::Tracklet);
        let (pb, _) = heliocentric_position(&store.detections()[1], &hyp, &settings()).unwrap();
        assert_abs_diff_eq!(s.velocity, (pb - s.position) / 0.05, epsilon = 1e-9);

        let s = project(&store, 0, 0, &hyp, None, &settings()).unwrap();
        assert_eq!(s.velocity_origin, VelocityOrigin::Model);
        assert_eq!(s.velocity, Vector3::zeros());

        let single = ProjectionSettings {
            velocity_source: VelocitySource::SingleDetection,
            ..settings()
        };
        let s = project(&store, 0, 0, &hyp, Some(1), &single).unwrap();
        assert_eq!(s.velocity_origin, VelocityOrigin::Model);
    }
}
