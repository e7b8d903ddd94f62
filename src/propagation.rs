//! # Propagation to the reference epoch
//!
//! Every projected state is carried from its detection epoch to the common reference epoch,
//! where states of the same object coincide. The strategy is pluggable behind [`Propagator`]:
//!
//! | Model | Implementation | Use |
//! |---|---|---|
//! | [`PropagationModel::TwoBody`] | [`KeplerianPropagator`], universal variables | default, exact two-body |
//! | [`PropagationModel::Linear`]  | [`LinearPropagator`], constant solar acceleration | short arcs, cheap |
//!
//! Both strategies apply the same validity rules. A state is **invalid** (kept in the table,
//! excluded from clustering, counted) when
//!
//! * `|Δt|` exceeds the validity horizon,
//! * its hyperbolic excess speed exceeds `max_v_inf`,
//! * its heliocentric radius is below `min_heliocentric_radius` (before or after propagation),
//! * the universal Kepler equation does not converge.
//!
//! Negative and positive `Δt` are handled identically; `Δt = 0` returns the input state.
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{Au, GAUSS_GRAV_SQUARED, MJD};
use crate::kepler::propagate_fg;
use crate::link_errors::PropagationFailure;
use crate::projection::StateVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PropagationModel {
    #[default]
    TwoBody,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropagationStatus {
    Valid,
    Invalid(PropagationFailure),
}

/// A state vector carried to the reference epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagatedState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub detection: usize,
    pub hypothesis: usize,
    /// Detection epoch the state was projected at.
    pub source_epoch: MJD,
    pub reference_epoch: MJD,
    /// `reference_epoch − source_epoch`, days.
    pub dt: f64,
    pub topocentric_distance: Au,
    pub kepler_residual: f64,
    pub status: PropagationStatus,
}

impl PropagatedState {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.status == PropagationStatus::Valid
    }

    fn from_state(
        state: &StateVector,
        reference_epoch: MJD,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        kepler_residual: f64,
        status: PropagationStatus,
    ) -> Self {
        PropagatedState {
            position,
            velocity,
            detection: state.detection,
            hypothesis: state.hypothesis,
            source_epoch: state.epoch,
            reference_epoch,
            dt: reference_epoch - state.epoch,
            topocentric_distance: state.topocentric_distance,
            kepler_residual,
            status,
        }
    }

    fn invalid(state: &StateVector, reference_epoch: MJD, failure: PropagationFailure) -> Self {
        Self::from_state(
            state,
            reference_epoch,
            state.position,
            state.velocity,
            0.0,
            PropagationStatus::Invalid(failure),
        )
    }
}

/// Validity limits shared by all propagators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagationSettings {
    /// Maximum `|Δt|`, days.
    pub validity_horizon: f64,
    /// Maximum hyperbolic excess speed, AU/day.
    pub max_v_inf: f64,
    pub min_heliocentric_radius: Au,
}

impl PropagationSettings {
    /// Checks that do not depend on the propagation itself.
    fn precheck(&self, state: &StateVector, dt: f64) -> Result<(), PropagationFailure> {
        if dt.abs() > self.validity_horizon {
            return Err(PropagationFailure::BeyondHorizon);
        }
        let r = state.position.norm();
        if r < self.min_heliocentric_radius {
            return Err(PropagationFailure::NearSingular);
        }
        let alpha = state.velocity.norm_squared() - 2.0 * GAUSS_GRAV_SQUARED / r;
        if alpha > 0.0 && alpha.sqrt() > self.max_v_inf {
            return Err(PropagationFailure::Hyperbolic);
        }
        Ok(())
    }
}

pub trait Propagator: Send + Sync {
    /// Carry `state` to `reference_epoch`. Never fails: invalid results carry their
    /// [`PropagationFailure`] in the status.
    fn propagate(&self, state: &StateVector, reference_epoch: MJD) -> PropagatedState;
}

/// Exact two-body propagation with universal variables.
#[derive(Debug, Clone, Copy)]
pub struct KeplerianPropagator {
    pub settings: PropagationSettings,
}

impl Propagator for KeplerianPropagator {
    fn propagate(&self, state: &StateVector, reference_epoch: MJD) -> PropagatedState {
        let dt = reference_epoch - state.epoch;
        if let Err(failure) = self.settings.precheck(state, dt) {
            return PropagatedState::invalid(state, reference_epoch, failure);
        }
        if dt == 0.0 {
            return PropagatedState::from_state(
                state,
                reference_epoch,
                state.position,
                state.velocity,
                0.0,
                PropagationStatus::Valid,
            );
        }

        match propagate_fg(&state.position, &state.velocity, dt, GAUSS_GRAV_SQUARED) {
            None => {
                PropagatedState::invalid(state, reference_epoch, PropagationFailure::NonConvergence)
            }
            Some(step) if step.position.norm() < self.settings.min_heliocentric_radius => {
                PropagatedState::invalid(state, reference_epoch, PropagationFailure::NearSingular)
            }
            Some(step) => PropagatedState::from_state(
                state,
                reference_epoch,
                step.position,
                step.velocity,
                step.residual,
                PropagationStatus::Valid,
            ),
        }
    }
}

/// Second-order Taylor step with the solar acceleration frozen at the source epoch.
#[derive(Debug, Clone, Copy)]
pub struct LinearPropagator {
    pub settings: PropagationSettings,
}

impl Propagator for LinearPropagator {
    fn propagate(&self, state: &StateVector, reference_epoch: MJD) -> PropagatedState {
        let dt = reference_epoch - state.epoch;
        if let Err(failure) = self.settings.precheck(state, dt) {
            return PropagatedState::invalid(state, reference_epoch, failure);
        }

        let r = state.position.norm();
        let accel = -GAUSS_GRAV_SQUARED / (r * r * r) * state.position;
        let position = state.position + state.velocity * dt + 0.5 * accel * dt * dt;
        if position.norm() < self.settings.min_heliocentric_radius {
            return PropagatedState::invalid(
                state,
                reference_epoch,
                PropagationFailure::NearSingular,
            );
        }

        PropagatedState::from_state(
            state,
            reference_epoch,
            position,
            state.velocity + accel * dt,
            0.0,
            PropagationStatus::Valid,
        )
    }
}

/// Dense table of propagated states, one slot per (detection, hypothesis) pair at
/// `detection · n_hypotheses + hypothesis`. Slots whose projection failed are empty.
#[derive(Debug, Clone, Default)]
pub struct StateTable {
    n_hypotheses: usize,
    reference_epoch: MJD,
    slots: Vec<Option<PropagatedState>>,
}

impl StateTable {
    pub fn new(
        n_hypotheses: usize,
        reference_epoch: MJD,
        slots: Vec<Option<PropagatedState>>,
    ) -> Self {
        StateTable {
            n_hypotheses,
            reference_epoch,
            slots,
        }
    }

    #[inline]
    pub fn slot_index(&self, detection: usize, hypothesis: usize) -> usize {
        detection * self.n_hypotheses + hypothesis
    }

    pub fn get(&self, slot: usize) -> Option<&PropagatedState> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn n_hypotheses(&self) -> usize {
        self.n_hypotheses
    }

    pub fn reference_epoch(&self) -> MJD {
        self.reference_epoch
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Occupied slots whose propagation succeeded, ascending slot order.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, &PropagatedState)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().filter(|s| s.is_valid()).map(|s| (i, s)))
    }

    /// Occupied slots, ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PropagatedState)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }
}

/// Build the propagator selected by `model`.
pub fn propagator_for(
    model: PropagationModel,
    settings: PropagationSettings,
) -> Box<dyn Propagator> {
    match model {
        PropagationModel::TwoBody => Box::new(KeplerianPropagator { settings }),
        PropagationModel::Linear => Box::new(LinearPropagator { settings }),
    }
}
