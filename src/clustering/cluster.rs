use std::collections::BTreeMap;

use nalgebra::Vector3;
use smallvec::SmallVec;

use super::{ClusterSettings, ClusterSpace};
use crate::constants::{Au, MJD};
use crate::detections::{distinct_epochs, night_counts};
use crate::propagation::{PropagatedState, StateTable};

/// One propagated state retained in a [`Cluster`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterMember {
    /// Slot in the [`StateTable`].
    pub slot: usize,
    pub detection: usize,
    pub hypothesis: usize,
    /// Detection epoch.
    pub epoch: MJD,
    /// Propagation interval to the reference epoch, days.
    pub dt: f64,
    pub topocentric_distance: Au,
}

/// A set of propagated states, one per detection, mutually consistent with a single orbit at
/// the reference epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Ordered by epoch, then detection index.
    pub members: SmallVec<[ClusterMember; 8]>,
    pub centroid_position: Vector3<f64>,
    pub centroid_velocity: Vector3<f64>,
    /// RMS distance of the member positions to the centroid, AU.
    pub position_rms: f64,
    /// RMS distance of the member velocities to the centroid, AU/day.
    pub velocity_rms: f64,
    /// Combined spread in clustering-space units (AU).
    pub scatter: f64,
    pub distinct_epochs: usize,
    /// Members per night.
    pub nights: SmallVec<[usize; 4]>,
    /// Last minus first member epoch, days.
    pub timespan: f64,
    /// Most frequent hypothesis index among the members, lowest index on ties.
    pub hypothesis: usize,
}

/// Why a candidate did not become a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    TooFewMembers,
    TooFewEpochs,
    TooFewNights,
    TooShortArc,
}

/// Outcome of [`Cluster::assemble`] with the number of duplicate detections removed.
pub(crate) struct Assembled {
    pub cluster: Result<Cluster, Rejection>,
    pub duplicates_removed: usize,
}

fn centroid<'a>(
    states: impl ExactSizeIterator<Item = &'a PropagatedState>,
) -> (Vector3<f64>, Vector3<f64>) {
    let n = states.len().max(1) as f64;
    let (p, v) = states.fold((Vector3::zeros(), Vector3::zeros()), |(p, v), s| {
        (p + s.position, v + s.velocity)
    });
    (p / n, v / n)
}

impl Cluster {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn first_slot(&self) -> usize {
        self.members.iter().map(|m| m.slot).min().unwrap_or(usize::MAX)
    }

    /// Build a cluster from candidate `slots` of `table`: keep one state per detection, then
    /// apply the size, epoch, night and timespan thresholds.
    pub(crate) fn assemble(
        slots: &[usize],
        table: &StateTable,
        settings: &ClusterSettings,
    ) -> Assembled {
        let mut states: Vec<(usize, &PropagatedState)> = slots
            .iter()
            .filter_map(|&slot| table.get(slot).map(|s| (slot, s)))
            .collect();

        let (cp, cv) = centroid(states.iter().map(|(_, s)| *s));
        let before = states.len();
        states.sort_by(|(sa, a), (sb, b)| {
            a.detection
                .cmp(&b.detection)
                .then_with(|| {
                    settings
                        .distance2(&a.position, &a.velocity, &cp, &cv)
                        .total_cmp(&settings.distance2(&b.position, &b.velocity, &cp, &cv))
                })
                .then_with(|| a.dt.abs().total_cmp(&b.dt.abs()))
                .then(sa.cmp(sb))
        });
        states.dedup_by_key(|(_, s)| s.detection);
        let duplicates_removed = before - states.len();

        let reject = |r| Assembled {
            cluster: Err(r),
            duplicates_removed,
        };

        if states.len() < settings.min_members {
            return reject(Rejection::TooFewMembers);
        }

        states.sort_by(|(_, a), (_, b)| {
            a.source_epoch
                .total_cmp(&b.source_epoch)
                .then(a.detection.cmp(&b.detection))
        });
        let epochs: Vec<MJD> = states.iter().map(|(_, s)| s.source_epoch).collect();

        let n_epochs = distinct_epochs(&epochs, settings.epoch_tolerance);
        if n_epochs < settings.min_epochs {
            return reject(Rejection::TooFewEpochs);
        }
        let nights = night_counts(&epochs, settings.night_gap);
        if nights.len() < settings.min_nights {
            return reject(Rejection::TooFewNights);
        }
        let timespan = epochs[epochs.len() - 1] - epochs[0];
        if timespan < settings.min_timespan {
            return reject(Rejection::TooShortArc);
        }

        let (centroid_position, centroid_velocity) = centroid(states.iter().map(|(_, s)| *s));
        let n = states.len() as f64;
        let position_rms = (states
            .iter()
            .map(|(_, s)| (s.position - centroid_position).norm_squared())
            .sum::<f64>()
            / n)
            .sqrt();
        let velocity_rms = (states
            .iter()
            .map(|(_, s)| (s.velocity - centroid_velocity).norm_squared())
            .sum::<f64>()
            / n)
            .sqrt();
        let scatter = match settings.space {
            ClusterSpace::Position => position_rms,
            ClusterSpace::PositionVelocity => {
                position_rms.hypot(settings.velocity_scale() * velocity_rms)
            }
        };

        let mut votes: BTreeMap<usize, usize> = BTreeMap::new();
        for (_, s) in &states {
            *votes.entry(s.hypothesis).or_default() += 1;
        }
        // max_by_key keeps the last maximum; iterate descending to land on the lowest index
        let hypothesis = votes
            .iter()
            .rev()
            .max_by_key(|(_, &count)| count)
            .map(|(&h, _)| h)
            .unwrap_or_default();

        let members = states
            .iter()
            .map(|&(slot, s)| ClusterMember {
                slot,
                detection: s.detection,
                hypothesis: s.hypothesis,
                epoch: s.source_epoch,
                dt: s.dt,
                topocentric_distance: s.topocentric_distance,
            })
            .collect();

        Assembled {
            cluster: Ok(Cluster {
                members,
                centroid_position,
                centroid_velocity,
                position_rms,
                velocity_rms,
                scatter,
                distinct_epochs: n_epochs,
                timespan,
                nights,
                hypothesis,
            }),
            duplicates_removed,
        }
    }
}
