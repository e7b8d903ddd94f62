//! # Hypothesis grid
//!
//! A linking run tests every detection against a finite, explicit set of heliocentric
//! **distance / radial-velocity hypotheses**. The grid is enumerated once, before any
//! projection, so a malformed configuration fails fast and the same configuration always
//! yields the same ordered list.
//!
//! ## Semantics
//!
//! A [`Hypothesis`] fixes the heliocentric distance profile of the object around the
//! reference epoch `t_ref`:
//!
//! ```text
//! r(t) = distance + radial_velocity · Δt + ½ · radial_acceleration · Δt²,   Δt = t − t_ref
//! ```
//!
//! `radial_acceleration` is either zero or the solar pull at that distance, `−μ / distance²`
//! ([`RadialAccelerationModel`]). The true object, projected under the hypothesis closest to
//! its own distance profile, yields heliocentric states that all land on the same point once
//! propagated to `t_ref`.
//!
//! ## Ordering
//!
//! Distance-major, velocity-minor. Range specs enumerate ascending values
//! `min + i·step` (no accumulated rounding), list specs keep their given order.
//!
//! ## See also
//! ------------
//! * [`project`](crate::projection::project) – turns (detection, hypothesis) into a state vector.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{Au, KmPerSec, GAUSS_GRAV_SQUARED, KM_S_TO_AU_DAY};
use crate::link_errors::LinkError;

/// One trial heliocentric distance profile, in AU, AU/day and AU/day².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub distance: Au,
    pub radial_velocity: f64,
    pub radial_acceleration: f64,
}

impl Hypothesis {
    pub fn new(distance: Au, radial_velocity: f64, radial_acceleration: f64) -> Self {
        Hypothesis {
            distance,
            radial_velocity,
            radial_acceleration,
        }
    }

    /// Hypothesized heliocentric distance `dt` days after the reference epoch.
    #[inline]
    pub fn distance_at(&self, dt: f64) -> Au {
        self.distance + self.radial_velocity * dt + 0.5 * self.radial_acceleration * dt * dt
    }

    /// Hypothesized radial velocity `dt` days after the reference epoch.
    #[inline]
    pub fn radial_velocity_at(&self, dt: f64) -> f64 {
        self.radial_velocity + self.radial_acceleration * dt
    }
}

impl fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r={:.4} AU, ṙ={:+.3} km/s, r̈={:+.3e} AU/d²",
            self.distance,
            self.radial_velocity / KM_S_TO_AU_DAY,
            self.radial_acceleration
        )
    }
}

/// Largest number of values one range may enumerate.
pub const MAX_RANGE_VALUES: usize = 1 << 24;

/// Largest number of hypotheses a grid may hold.
pub const MAX_HYPOTHESES: usize = 1 << 26;

/// An explicit list of values, or an inclusive `[min, max]` range sampled every `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueSpec {
    Range { min: f64, max: f64, step: f64 },
    List(Vec<f64>),
}

impl ValueSpec {
    /// Enumerate the values. `what` names the quantity in error messages.
    fn values(&self, what: &str) -> Result<Vec<f64>, LinkError> {
        let invalid = |msg: String| LinkError::InvalidHypothesisGrid(format!("{what}: {msg}"));

        match self {
            ValueSpec::Range { min, max, step } => {
                let (min, max, step) = (*min, *max, *step);
                if !(min.is_finite() && max.is_finite() && step.is_finite()) {
                    return Err(invalid("non-finite range bound or step".into()));
                }
                if max < min {
                    return Err(invalid(format!("empty range: max {max} < min {min}")));
                }
                if step <= 0.0 {
                    return Err(invalid(format!("step must be > 0, got {step}")));
                }
                // upper bound included up to rounding; counted in f64 so a tiny step
                // cannot wrap
                let count = ((max - min) / step + 1e-9).floor() + 1.0;
                if !(count <= MAX_RANGE_VALUES as f64) {
                    return Err(invalid(format!(
                        "step {step} gives {count:e} values, more than {MAX_RANGE_VALUES}"
                    )));
                }
                Ok((0..count as usize).map(|i| min + i as f64 * step).collect())
            }
            ValueSpec::List(values) => {
                if values.is_empty() {
                    return Err(invalid("empty list".into()));
                }
                if let Some(v) = values.iter().find(|v| !v.is_finite()) {
                    return Err(invalid(format!("non-finite value {v}")));
                }
                for (i, v) in values.iter().enumerate() {
                    if values[..i].contains(v) {
                        return Err(invalid(format!("duplicated value {v}")));
                    }
                }
                Ok(values.clone())
            }
        }
    }
}

/// Radial velocities (km/s) used for distances within `[min_distance, max_distance)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityBin {
    pub min_distance: Au,
    pub max_distance: Au,
    pub radial_velocity: ValueSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RadialAccelerationModel {
    /// Constant radial velocity.
    #[default]
    Zero,
    /// `r̈ = −μ / r²`.
    SolarGravity,
}

/// Configuration of the hypothesis grid.
///
/// Distances in AU, radial velocities in **km/s** (converted to AU/day on enumeration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisGridConfig {
    pub distance: ValueSpec,
    /// Velocities used for every distance not covered by a bin.
    pub radial_velocity: ValueSpec,
    pub velocity_bins: Vec<VelocityBin>,
    pub acceleration: RadialAccelerationModel,
}

impl Default for HypothesisGridConfig {
    fn default() -> Self {
        HypothesisGridConfig {
            distance: ValueSpec::Range {
                min: 1.5,
                max: 4.0,
                step: 0.1,
            },
            radial_velocity: ValueSpec::List(vec![0.0]),
            velocity_bins: Vec::new(),
            acceleration: RadialAccelerationModel::Zero,
        }
    }
}

impl HypothesisGridConfig {
    pub fn new(distance: ValueSpec, radial_velocity: ValueSpec) -> Self {
        HypothesisGridConfig {
            distance,
            radial_velocity,
            ..Default::default()
        }
    }

    /// Ranges in AU and km/s.
    pub fn from_ranges(
        distance: (Au, Au, Au),
        radial_velocity: (KmPerSec, KmPerSec, KmPerSec),
    ) -> Self {
        Self::new(
            ValueSpec::Range {
                min: distance.0,
                max: distance.1,
                step: distance.2,
            },
            ValueSpec::Range {
                min: radial_velocity.0,
                max: radial_velocity.1,
                step: radial_velocity.2,
            },
        )
    }

    pub fn with_velocity_bin(mut self, bin: VelocityBin) -> Self {
        self.velocity_bins.push(bin);
        self
    }

    pub fn with_acceleration(mut self, model: RadialAccelerationModel) -> Self {
        self.acceleration = model;
        self
    }

    /// Validated distances, each with the index of its radial velocity set (km/s). Set 0
    /// holds the default velocities, set `k + 1` those of velocity bin `k`.
    fn resolve(&self) -> Result<(Vec<(Au, usize)>, Vec<Vec<KmPerSec>>), LinkError> {
        let distances = self.distance.values("distance")?;
        if let Some(d) = distances.iter().find(|d| **d <= 0.0) {
            return Err(LinkError::InvalidHypothesisGrid(format!(
                "distance must be > 0 AU, got {d}"
            )));
        }

        let mut rate_sets = vec![self.radial_velocity.values("radial velocity")?];
        for bin in &self.velocity_bins {
            if !(bin.min_distance < bin.max_distance) {
                return Err(LinkError::InvalidHypothesisGrid(format!(
                    "velocity bin [{}, {}) is empty",
                    bin.min_distance, bin.max_distance
                )));
            }
            rate_sets.push(bin.radial_velocity.values("velocity bin")?);
        }

        let with_set = distances
            .into_iter()
            .map(|distance| {
                let set = self
                    .velocity_bins
                    .iter()
                    .position(|bin| distance >= bin.min_distance && distance < bin.max_distance)
                    .map_or(0, |k| k + 1);
                (distance, set)
            })
            .collect();
        Ok((with_set, rate_sets))
    }

    fn count(distances: &[(Au, usize)], rate_sets: &[Vec<KmPerSec>]) -> Result<usize, LinkError> {
        distances
            .iter()
            .try_fold(0usize, |acc, &(_, set)| acc.checked_add(rate_sets[set].len()))
            .filter(|&n| n <= MAX_HYPOTHESES)
            .ok_or_else(|| {
                LinkError::InvalidHypothesisGrid(format!("more than {MAX_HYPOTHESES} hypotheses"))
            })
    }

    /// Validate the configuration and count its hypotheses without enumerating them.
    ///
    /// Errors
    /// ----------
    /// * Same as [`generate`](Self::generate).
    pub fn size(&self) -> Result<usize, LinkError> {
        let (distances, rate_sets) = self.resolve()?;
        Self::count(&distances, &rate_sets)
    }

    /// Validate the configuration and enumerate the grid.
    ///
    /// Errors
    /// ----------
    /// * [`LinkError::InvalidHypothesisGrid`] for an empty range or list, a non-positive or
    ///   non-finite distance, a non-positive step, duplicated list entries, a velocity bin
    ///   with inverted bounds, a range longer than [`MAX_RANGE_VALUES`] or a grid larger than
    ///   [`MAX_HYPOTHESES`].
    pub fn generate(&self) -> Result<Vec<Hypothesis>, LinkError> {
        let (distances, rate_sets) = self.resolve()?;
        let mut grid = Vec::with_capacity(Self::count(&distances, &rate_sets)?);
        for &(distance, set) in &distances {
            let radial_acceleration = match self.acceleration {
                RadialAccelerationModel::Zero => 0.0,
                RadialAccelerationModel::SolarGravity => {
                    -GAUSS_GRAV_SQUARED / (distance * distance)
                }
            };

            grid.extend(rate_sets[set].iter().map(|&kms| Hypothesis {
                distance,
                radial_velocity: kms * KM_S_TO_AU_DAY,
                radial_acceleration,
            }));
        }

        tracing::debug!(
            n_distances = distances.len(),
            n_hypotheses = grid.len(),
            "hypothesis grid enumerated"
        );
        Ok(grid)
    }
}

#[cfg(test)]
mod hypothesis_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn range_grid_size_and_order() {
        let grid = HypothesisGridConfig::from_ranges((1.0, 4.0, 0.1), (-5.0, 5.0, 1.0))
            .generate()
            .unwrap();
        assert_eq!(grid.len(), 31 * 11);
        assert_abs_diff_eq!(grid[0].distance, 1.0);
        assert_abs_diff_eq!(grid[0].radial_velocity, -5.0 * KM_S_TO_AU_DAY);
        assert_abs_diff_eq!(grid[10].radial_velocity, 5.0 * KM_S_TO_AU_DAY, epsilon = 1e-15);
        assert_abs_diff_eq!(grid[11].distance, 1.1, epsilon = 1e-12);
        assert_abs_diff_eq!(grid.last().unwrap().distance, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn deterministic() {
        let cfg = HypothesisGridConfig::from_ranges((1.0, 2.0, 0.05), (-1.0, 1.0, 0.5));
        assert_eq!(cfg.generate().unwrap(), cfg.generate().unwrap());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = HypothesisGridConfig::from_ranges((4.0, 1.0, 0.1), (0.0, 0.0, 1.0))
            .generate()
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert!(matches!(err, LinkError::InvalidHypothesisGrid(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad = [
            HypothesisGridConfig::from_ranges((0.0, 1.0, 0.1), (0.0, 0.0, 1.0)),
            HypothesisGridConfig::from_ranges((1.0, 2.0, 0.0), (0.0, 0.0, 1.0)),
            HypothesisGridConfig::from_ranges((1.0, 2.0, f64::NAN), (0.0, 0.0, 1.0)),
            HypothesisGridConfig::new(ValueSpec::List(vec![]), ValueSpec::List(vec![0.0])),
            HypothesisGridConfig::new(
                ValueSpec::List(vec![1.0, 2.0, 1.0]),
                ValueSpec::List(vec![0.0]),
            ),
            HypothesisGridConfig::new(ValueSpec::List(vec![-1.0]), ValueSpec::List(vec![0.0])),
        ];
        for cfg in bad {
            assert!(cfg.generate().is_err(), "{cfg:?} should be rejected");
        }
    }

    #[test]
    fn tiny_steps_are_rejected_before_enumeration() {
        for step in [1e-20, 1e-11, f64::MIN_POSITIVE] {
            let cfg = HypothesisGridConfig::from_ranges((1.0, 4.0, step), (0.0, 0.0, 1.0));
            let err = cfg.generate().unwrap_err();
            assert!(err.is_configuration_error(), "step {step}: {err:?}");
            assert_eq!(cfg.size().unwrap_err(), err);
        }

        // each range fits, their product does not
        let cfg = HypothesisGridConfig::from_ranges((1.0, 4.0, 1e-5), (-50.0, 50.0, 1e-3));
        assert!(matches!(
            cfg.size(),
            Err(LinkError::InvalidHypothesisGrid(msg)) if msg.contains("hypotheses")
        ));
    }

    #[test]
    fn size_matches_generate() {
        let cfg = HypothesisGridConfig::new(
            ValueSpec::Range {
                min: 1.0,
                max: 3.0,
                step: 0.5,
            },
            ValueSpec::List(vec![0.0]),
        )
        .with_velocity_bin(VelocityBin {
            min_distance: 2.0,
            max_distance: 2.6,
            radial_velocity: ValueSpec::List(vec![-1.0, 0.0, 1.0]),
        });
        assert_eq!(cfg.size().unwrap(), 9);
        assert_eq!(cfg.generate().unwrap().len(), 9);
    }

    #[test]
    fn single_point_range() {
        let grid = HypothesisGridConfig::from_ranges((2.5, 2.5, 0.1), (0.0, 0.0, 1.0))
            .generate()
            .unwrap();
        assert_eq!(grid, vec![Hypothesis::new(2.5, 0.0, 0.0)]);
    }

    #[test]
    fn velocity_bins_and_gravity() {
        let cfg = HypothesisGridConfig::new(
            ValueSpec::List(vec![1.0, 3.0]),
            ValueSpec::List(vec![0.0]),
        )
        .with_velocity_bin(VelocityBin {
            min_distance: 2.0,
            max_distance: 5.0,
            radial_velocity: ValueSpec::List(vec![-2.0, 2.0]),
        })
        .with_acceleration(RadialAccelerationModel::SolarGravity);

        let grid = cfg.generate().unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0].radial_velocity, 0.0);
        assert_abs_diff_eq!(grid[1].radial_velocity, -2.0 * KM_S_TO_AU_DAY);
        assert_abs_diff_eq!(grid[2].radial_acceleration, -GAUSS_GRAV_SQUARED / 9.0);

        let h = grid[2];
        assert_abs_diff_eq!(h.distance_at(0.0), 3.0);
        assert_abs_diff_eq!(
            h.distance_at(2.0),
            3.0 + 2.0 * h.radial_velocity + 2.0 * h.radial_acceleration
        );
    }
}
