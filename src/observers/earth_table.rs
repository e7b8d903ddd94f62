//! Tabulated Earth ephemeris.
//!
//! [`EarthTable`] is the reference [`ObserverEphemeris`]: heliocentric Earth states sampled
//! on a time grid (typically exported once from a planetary ephemeris for the span of a
//! survey), Lagrange-interpolated at the requested epoch, with the site offset of the
//! requested observatory added on top.
//!
//! Interpolation uses the `order + 1` table nodes centred on the epoch (shifted inwards at
//! the table edges). Position and velocity are interpolated independently.
use nalgebra::Vector3;

use super::observatories::Observatories;
use super::{Observer, ObserverEphemeris};
use crate::constants::MJD;
use crate::link_errors::LinkError;

/// One tabulated heliocentric Earth state (equatorial J2000, AU and AU/day).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarthState {
    pub epoch: MJD,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

#[derive(Debug, Clone)]
pub struct EarthTable {
    states: Vec<EarthState>,
    order: usize,
    observatories: Observatories,
}

impl EarthTable {
    pub const DEFAULT_ORDER: usize = 5;

    /// Largest table [`sample`](Self::sample) will build.
    pub const MAX_SAMPLES: usize = 1 << 24;

    /// Build a table from states sorted by strictly increasing epoch.
    ///
    /// Errors
    /// ----------
    /// * [`LinkError::InvalidEphemerisTable`] with fewer than two states, unsorted or
    ///   duplicated epochs, or non-finite values.
    pub fn new(states: Vec<EarthState>) -> Result<Self, LinkError> {
        if states.len() < 2 {
            return Err(LinkError::InvalidEphemerisTable(
                "at least two tabulated states are required".into(),
            ));
        }
        if states.iter().any(|s| {
            !s.epoch.is_finite()
                || !s.position.iter().all(|x| x.is_finite())
                || !s.velocity.iter().all(|x| x.is_finite())
        }) {
            return Err(LinkError::InvalidEphemerisTable(
                "non-finite tabulated value".into(),
            ));
        }
        if states.windows(2).any(|w| w[1].epoch <= w[0].epoch) {
            return Err(LinkError::InvalidEphemerisTable(
                "epochs must be strictly increasing".into(),
            ));
        }

        Ok(EarthTable {
            states,
            order: Self::DEFAULT_ORDER,
            observatories: Observatories::new(),
        })
    }

    /// Sample `f` on `[start, stop]` every `step` days.
    pub fn sample<F>(start: MJD, stop: MJD, step: f64, f: F) -> Result<Self, LinkError>
    where
        F: Fn(MJD) -> (Vector3<f64>, Vector3<f64>),
    {
        if !(step > 0.0) || !(stop > start) {
            return Err(LinkError::InvalidEphemerisTable(
                "sampling needs step > 0 and stop > start".into(),
            ));
        }
        let count = ((stop - start) / step).ceil() + 1.0;
        if !(count <= Self::MAX_SAMPLES as f64) {
            return Err(LinkError::InvalidEphemerisTable(format!(
                "step {step} gives {count:e} samples, more than {}",
                Self::MAX_SAMPLES
            )));
        }
        let states = (0..count as usize)
            .map(|i| {
                let epoch = start + i as f64 * step;
                let (position, velocity) = f(epoch);
                EarthState {
                    epoch,
                    position,
                    velocity,
                }
            })
            .collect();
        Self::new(states)
    }

    /// Polynomial degree of the interpolation (capped by the table size).
    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order.max(1);
        self
    }

    pub fn with_observatories(mut self, observatories: Observatories) -> Self {
        self.observatories = observatories;
        self
    }

    pub fn add_site(&mut self, code: impl Into<String>, observer: Observer) {
        self.observatories.insert(code, observer);
    }

    pub fn observatories(&self) -> &Observatories {
        &self.observatories
    }

    /// First and last tabulated epochs.
    pub fn span(&self) -> (MJD, MJD) {
        (self.states[0].epoch, self.states[self.states.len() - 1].epoch)
    }

    /// Interpolated heliocentric Earth state at `mjd`.
    pub fn earth_state(&self, mjd: MJD) -> Result<(Vector3<f64>, Vector3<f64>), LinkError> {
        let (first, last) = self.span();
        if !(mjd >= first && mjd <= last) {
            return Err(LinkError::EphemerisOutOfRange(mjd));
        }

        let n_nodes = (self.order + 1).min(self.states.len());
        let upper = self.states.partition_point(|s| s.epoch <= mjd);
        let start = upper
            .saturating_sub(n_nodes / 2)
            .min(self.states.len() - n_nodes);
        let nodes = &self.states[start..start + n_nodes];

        if let Some(exact) = nodes.iter().find(|s| s.epoch == mjd) {
            return Ok((exact.position, exact.velocity));
        }

        let mut position = Vector3::zeros();
        let mut velocity = Vector3::zeros();
        for (i, node) in nodes.iter().enumerate() {
            let weight = nodes
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(1.0, |w, (_, other)| {
                    w * (mjd - other.epoch) / (node.epoch - other.epoch)
                });
            position += weight * node.position;
            velocity += weight * node.velocity;
        }
        Ok((position, velocity))
    }
}

impl ObserverEphemeris for EarthTable {
    fn observer_state(
        &self,
        mjd_tt: MJD,
        code: &str,
    ) -> Result<(Vector3<f64>, Vector3<f64>), LinkError> {
        let site = self.observatories.get(code)?;
        let (earth_pos, earth_vel) = self.earth_state(mjd_tt)?;
        let (site_pos, site_vel) = site.geocentric_pv(mjd_tt);
        Ok((earth_pos + site_pos, earth_vel + site_vel))
    }
}
