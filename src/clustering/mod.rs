//! # Spatial clustering of propagated states
//!
//! States of one object under the right hypothesis coincide at the reference epoch. This
//! module finds those coincidences among all valid states of a [`StateTable`].
//!
//! ## Overview
//!
//! 1. Each valid state becomes a point: its position (3D, [`ClusterSpace::Position`]) or its
//!    position and velocity scaled by `s = position_radius / velocity_radius`
//!    (6D, [`ClusterSpace::PositionVelocity`]).
//! 2. A radius query ([`spatial_index::neighbor_pairs`]) proposes candidate pairs, which are
//!    kept when `|ΔP| ≤ position_radius`, `|ΔV| ≤ velocity_radius` (6D only) and the two
//!    states come from different detections. With a [`RadiusScaling`] the states are queried
//!    per topocentric distance bin, both radii growing with the distance of the bin.
//! 3. Edges are merged in a [`UnionFind`](union_find::UnionFind). With
//!    [`LinkagePolicy::Single`] each connected component is a candidate; with
//!    [`LinkagePolicy::Complete`] components are split greedily into groups whose pairs all
//!    satisfy the tolerance.
//! 4. [`Cluster::assemble`] keeps one state per detection and applies the minimum member,
//!    epoch and night counts and the minimum timespan.
//!
//! Clusters are returned in ascending order of their smallest slot.
//!
//! ## See also
//! ------------
//! * [`crate::scoring`] – turns clusters into scored linkages.
pub mod cluster;
pub mod spatial_index;
pub mod union_find;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::Au;
use crate::propagation::{PropagatedState, StateTable};
use cluster::Rejection;
use union_find::UnionFind;

pub use cluster::{Cluster, ClusterMember};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterSpace {
    /// Positions only.
    Position,
    /// Positions and scaled velocities.
    #[default]
    PositionVelocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkagePolicy {
    #[default]
    Single,
    Complete,
}

/// Clustering radius growing with topocentric distance `ρ`.
///
/// States are grouped in overlapping logarithmic bins `[ρ_k, ρ_k·q²)` with
/// `ρ_k = min_distance·q^k`, `q = bin_ratio`, for every `ρ_k < max_distance`. Each bin is
/// queried on its own with both radii multiplied by `max(1, ρ_k·q / change_distance)`; the
/// edges of all bins are merged. States outside every bin are not clustered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusScaling {
    /// Distance beyond which the radii grow linearly, AU.
    pub change_distance: Au,
    pub min_distance: Au,
    pub max_distance: Au,
    /// Ratio of consecutive bin starts, > 1.
    pub bin_ratio: f64,
}

impl RadiusScaling {
    /// Upper bound on [`bins`](Self::bins).
    pub const MAX_BINS: usize = 10_000;

    /// Radius multiplier at topocentric distance `rho`.
    #[inline]
    pub fn factor(&self, rho: Au) -> f64 {
        (rho / self.change_distance).max(1.0)
    }

    /// Number of distance bins, `None` when it would exceed [`MAX_BINS`](Self::MAX_BINS).
    pub fn bin_count(&self) -> Option<usize> {
        let n = ((self.max_distance / self.min_distance).ln() / self.bin_ratio.ln()).ceil();
        (n >= 1.0 && n <= Self::MAX_BINS as f64).then_some(n as usize)
    }

    /// `(low, high, radius factor)` of every bin.
    pub fn bins(&self) -> Vec<(Au, Au, f64)> {
        let q = self.bin_ratio;
        (0..self.bin_count().unwrap_or(0))
            .map(|k| {
                let lo = self.min_distance * q.powi(k as i32);
                (lo, lo * q * q, self.factor(lo * q))
            })
            .take_while(|&(lo, _, _)| lo < self.max_distance)
            .collect()
    }
}

/// Clustering settings, extracted from [`LinkParams`](crate::params::LinkParams).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSettings {
    pub space: ClusterSpace,
    pub linkage: LinkagePolicy,
    /// AU.
    pub position_radius: f64,
    /// AU/day.
    pub velocity_radius: f64,
    pub shard_size: usize,
    pub partitions: usize,
    pub min_members: usize,
    pub min_epochs: usize,
    pub min_nights: usize,
    /// Shortest accepted arc, days.
    pub min_timespan: f64,
    /// Days.
    pub epoch_tolerance: f64,
    /// Days.
    pub night_gap: f64,
    pub radius_scaling: Option<RadiusScaling>,
}

impl ClusterSettings {
    /// Factor bringing velocities to position units in the 6D space.
    #[inline]
    pub fn velocity_scale(&self) -> f64 {
        self.position_radius / self.velocity_radius
    }

    /// Squared clustering-space distance between two states.
    pub(crate) fn distance2(
        &self,
        pa: &Vector3<f64>,
        va: &Vector3<f64>,
        pb: &Vector3<f64>,
        vb: &Vector3<f64>,
    ) -> f64 {
        let dp = (pa - pb).norm_squared();
        match self.space {
            ClusterSpace::Position => dp,
            ClusterSpace::PositionVelocity => {
                dp + self.velocity_scale().powi(2) * (va - vb).norm_squared()
            }
        }
    }

    /// Both tolerances hold once multiplied by `factor`.
    fn within_tolerance(&self, a: &PropagatedState, b: &PropagatedState, factor: f64) -> bool {
        (a.position - b.position).norm() <= factor * self.position_radius
            && (self.space == ClusterSpace::Position
                || (a.velocity - b.velocity).norm() <= factor * self.velocity_radius)
    }

    /// Radius multiplier of a pair outside the binned query, from its farther state.
    fn pair_factor(&self, a: &PropagatedState, b: &PropagatedState) -> f64 {
        self.radius_scaling.map_or(1.0, |scaling| {
            scaling.factor(a.topocentric_distance.max(b.topocentric_distance))
        })
    }
}

/// Counters of one clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub valid_states: usize,
    pub edges: usize,
    /// Candidate groups with at least two states.
    pub components: usize,
    pub duplicates_removed: usize,
    pub dropped_min_members: usize,
    pub dropped_min_epochs: usize,
    pub dropped_min_nights: usize,
    pub dropped_min_timespan: usize,
}

/// Result of [`cluster_states`].
#[derive(Debug, Clone, Default)]
pub struct ClusterOutcome {
    pub clusters: Vec<Cluster>,
    pub stats: ClusterStats,
}

/// Cluster the valid states of `table`.
///
/// Arguments
/// -----------------
/// * `table`: propagated states at the reference epoch.
/// * `settings`: tolerances, index partitioning and minimum thresholds.
///
/// Return
/// ----------
/// * The clusters, ordered by smallest member slot, with the pass counters.
pub fn cluster_states(table: &StateTable, settings: &ClusterSettings) -> ClusterOutcome {
    let valid: Vec<(usize, &PropagatedState)> = table.iter_valid().collect();
    let mut stats = ClusterStats {
        valid_states: valid.len(),
        ..ClusterStats::default()
    };

    // (radius factor, members as indices into `valid`) per query pass
    let passes: Vec<(f64, Vec<usize>)> = match settings.radius_scaling {
        None => vec![(1.0, (0..valid.len()).collect())],
        Some(scaling) => scaling
            .bins()
            .into_iter()
            .map(|(lo, hi, factor)| {
                let members = (0..valid.len())
                    .filter(|&i| {
                        let rho = valid[i].1.topocentric_distance;
                        rho >= lo && rho < hi
                    })
                    .collect();
                (factor, members)
            })
            .collect(),
    };

    let mut edges = Vec::new();
    for (factor, members) in &passes {
        edges.extend(pass_edges(&valid, members, *factor, settings));
    }
    if passes.len() > 1 {
        // overlapping bins report some pairs twice
        edges.sort_unstable();
        edges.dedup();
    }
    stats.edges = edges.len();

    let mut uf = UnionFind::new(valid.len());
    for &(i, j) in &edges {
        uf.union(i, j);
    }

    let groups: Vec<Vec<usize>> = uf
        .components()
        .into_iter()
        .filter(|c| c.len() > 1)
        .flat_map(|component| match settings.linkage {
            LinkagePolicy::Single => vec![component],
            LinkagePolicy::Complete => complete_split(&component, &valid, settings),
        })
        .filter(|g| g.len() > 1)
        .collect();
    stats.components = groups.len();

    let mut clusters = Vec::new();
    for group in groups {
        let slots: Vec<usize> = group.iter().map(|&i| valid[i].0).collect();
        let assembled = Cluster::assemble(&slots, table, settings);
        stats.duplicates_removed += assembled.duplicates_removed;
        match assembled.cluster {
            Ok(cluster) => clusters.push(cluster),
            Err(Rejection::TooFewMembers) => stats.dropped_min_members += 1,
            Err(Rejection::TooFewEpochs) => stats.dropped_min_epochs += 1,
            Err(Rejection::TooFewNights) => stats.dropped_min_nights += 1,
            Err(Rejection::TooShortArc) => stats.dropped_min_timespan += 1,
        }
    }
    clusters.sort_by_key(Cluster::first_slot);

    debug!(
        valid_states = stats.valid_states,
        edges = stats.edges,
        components = stats.components,
        clusters = clusters.len(),
        "clustering pass done"
    );

    ClusterOutcome { clusters, stats }
}

/// Neighbor pairs among `members` (indices into `valid`), with both radii scaled by
/// `factor`. Pairs come back as `(i, j)` indices into `valid`, `i < j`.
fn pass_edges(
    valid: &[(usize, &PropagatedState)],
    members: &[usize],
    factor: f64,
    settings: &ClusterSettings,
) -> Vec<(usize, usize)> {
    let accept = |a: usize, b: usize| {
        let (sa, sb) = (valid[members[a]].1, valid[members[b]].1);
        sa.detection != sb.detection && settings.within_tolerance(sa, sb, factor)
    };
    let radius = factor * settings.position_radius;

    let pairs = match settings.space {
        ClusterSpace::Position => {
            let points: Vec<[f64; 3]> = members
                .iter()
                .map(|&i| {
                    let p = valid[i].1.position;
                    [p.x, p.y, p.z]
                })
                .collect();
            spatial_index::neighbor_pairs(
                &points,
                radius,
                settings.partitions,
                settings.shard_size,
                accept,
            )
        }
        ClusterSpace::PositionVelocity => {
            let scale = settings.velocity_scale();
            let points: Vec<[f64; 6]> = members
                .iter()
                .map(|&i| {
                    let (p, v) = (valid[i].1.position, valid[i].1.velocity * scale);
                    [p.x, p.y, p.z, v.x, v.y, v.z]
                })
                .collect();
            spatial_index::neighbor_pairs(
                &points,
                std::f64::consts::SQRT_2 * radius,
                settings.partitions,
                settings.shard_size,
                accept,
            )
        }
    };
    // members are ascending, so the order of each pair survives the mapping
    pairs
        .into_iter()
        .map(|(a, b)| (members[a], members[b]))
        .collect()
}

/// Greedy complete-linkage split of one connected component. Members are visited by
/// ascending `|Δt|`, then slot, and join the first group they are within tolerance of.
fn complete_split(
    component: &[usize],
    valid: &[(usize, &PropagatedState)],
    settings: &ClusterSettings,
) -> Vec<Vec<usize>> {
    let mut order = component.to_vec();
    order.sort_by(|&a, &b| {
        valid[a]
            .1
            .dt
            .abs()
            .total_cmp(&valid[b].1.dt.abs())
            .then(valid[a].0.cmp(&valid[b].0))
    });

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for i in order {
        let s = valid[i].1;
        let fits = |g: &Vec<usize>| {
            g.iter().all(|&j| {
                let t = valid[j].1;
                settings.within_tolerance(s, t, settings.pair_factor(s, t))
            })
        };
        match groups.iter().position(fits) {
            Some(k) => groups[k].push(i),
            None => groups.push(vec![i]),
        }
    }
    for g in &mut groups {
        g.sort_unstable();
    }
    groups
}

#[cfg(test)]
mod clustering_test {
    use super::*;
    use crate::link_errors::PropagationFailure;
    use crate::propagation::PropagationStatus;
    use approx::assert_abs_diff_eq;

    const REF: f64 = 60000.0;

    fn settings() -> ClusterSettings {
        ClusterSettings {
            space: ClusterSpace::PositionVelocity,
            linkage: LinkagePolicy::Single,
            position_radius: 1e-3,
            velocity_radius: 1e-4,
            shard_size: 4,
            partitions: 1,
            min_members: 3,
            min_epochs: 3,
            min_nights: 1,
            min_timespan: 0.0,
            epoch_tolerance: 1e-5,
            night_gap: 0.5,
            radius_scaling: None,
        }
    }

    fn state(detection: usize, hypothesis: usize, epoch: f64, x: f64) -> PropagatedState {
        PropagatedState {
            position: Vector3::new(x, 2.0, 0.0),
            velocity: Vector3::new(0.0, 0.01, 0.0),
            detection,
            hypothesis,
            source_epoch: epoch,
            reference_epoch: REF,
            dt: REF - epoch,
            topocentric_distance: 1.5,
            kepler_residual: 0.0,
            status: PropagationStatus::Valid,
        }
    }

    /// Table with one hypothesis per detection.
    fn table(states: Vec<PropagatedState>) -> StateTable {
        StateTable::new(1, REF, states.into_iter().map(Some).collect())
    }

    fn detections_of(c: &Cluster) -> Vec<usize> {
        c.members.iter().map(|m| m.detection).collect()
    }

    #[test]
    fn finds_a_tight_group() {
        let t = table(vec![
            state(0, 0, 60000.00, 1.0000),
            state(1, 0, 60000.04, 1.0002),
            state(2, 0, 60000.08, 1.0004),
            state(3, 0, 60000.10, 1.5),
        ]);
        let out = cluster_states(&t, &settings());
        assert_eq!(out.clusters.len(), 1);
        let c = &out.clusters[0];
        assert_eq!(detections_of(c), vec![0, 1, 2]);
        assert_eq!(c.distinct_epochs, 3);
        assert_eq!(c.nights.as_slice(), &[3]);
        assert_abs_diff_eq!(c.timespan, 0.08, epsilon = 1e-9);
        assert_abs_diff_eq!(c.centroid_position.x, 1.0002, epsilon = 1e-12);
        assert_eq!(out.stats.edges, 3);
        assert_eq!(out.stats.valid_states, 4);
    }

    #[test]
    fn velocity_tolerance_separates_in_6d_only() {
        let mut fast = state(2, 0, 60000.08, 1.0004);
        fast.velocity.y += 5e-4;
        let t = table(vec![
            state(0, 0, 60000.00, 1.0000),
            state(1, 0, 60000.04, 1.0002),
            fast,
        ]);
        assert!(cluster_states(&t, &settings()).clusters.is_empty());

        let position_only = ClusterSettings {
            space: ClusterSpace::Position,
            ..settings()
        };
        assert_eq!(cluster_states(&t, &position_only).clusters.len(), 1);
    }

    #[test]
    fn invalid_states_are_ignored() {
        let mut bad = state(2, 0, 60000.08, 1.0004);
        bad.status = PropagationStatus::Invalid(PropagationFailure::BeyondHorizon);
        let t = table(vec![
            state(0, 0, 60000.00, 1.0000),
            state(1, 0, 60000.04, 1.0002),
            bad,
        ]);
        let out = cluster_states(&t, &settings());
        assert!(out.clusters.is_empty());
        assert_eq!(out.stats.valid_states, 2);
        assert_eq!(out.stats.dropped_min_members, 1);
    }

    #[test]
    fn one_member_per_detection() {
        // detection 1 has two nearby hypotheses; the one nearer the centroid stays
        let t = vec![
            Some(state(0, 0, 60000.00, 1.0000)),
            None,
            Some(state(1, 0, 60000.04, 1.0002)),
            Some(state(1, 1, 60000.04, 1.0007)),
            Some(state(2, 0, 60000.08, 1.0004)),
            None,
        ];
        let table = StateTable::new(2, REF, t);
        let out = cluster_states(&table, &settings());
        assert_eq!(out.clusters.len(), 1);
        let c = &out.clusters[0];
        assert_eq!(detections_of(c), vec![0, 1, 2]);
        assert_eq!(c.members[1].slot, 2);
        assert_eq!(c.hypothesis, 0);
        assert_eq!(out.stats.duplicates_removed, 1);
    }

    #[test]
    fn epoch_and_night_thresholds() {
        // two detections within the epoch tolerance count once
        let t = table(vec![
            state(0, 0, 60000.000000, 1.0000),
            state(1, 0, 60000.000001, 1.0001),
            state(2, 0, 60000.04, 1.0002),
        ]);
        let out = cluster_states(&t, &settings());
        assert!(out.clusters.is_empty());
        assert_eq!(out.stats.dropped_min_epochs, 1);

        let t = table(vec![
            state(0, 0, 60000.00, 1.0000),
            state(1, 0, 60000.04, 1.0002),
            state(2, 0, 60000.08, 1.0004),
        ]);
        let two_nights = ClusterSettings {
            min_nights: 2,
            ..settings()
        };
        let out = cluster_states(&t, &two_nights);
        assert!(out.clusters.is_empty());
        assert_eq!(out.stats.dropped_min_nights, 1);
    }

    #[test]
    fn complete_linkage_breaks_chains() {
        // 0-1 and 1-2 are within tolerance, 0-2 is not
        let chain = vec![
            state(0, 0, 60000.00, 1.0000),
            state(1, 0, 60000.04, 1.0008),
            state(2, 0, 60000.08, 1.0016),
            state(3, 0, 60000.12, 1.0004),
        ];
        let single = cluster_states(&table(chain.clone()), &settings());
        assert_eq!(single.clusters.len(), 1);
        assert_eq!(single.clusters[0].member_count(), 4);

        let complete = ClusterSettings {
            linkage: LinkagePolicy::Complete,
            min_members: 2,
            min_epochs: 2,
            ..settings()
        };
        let out = cluster_states(&table(chain), &complete);
        for c in &out.clusters {
            for a in &c.members {
                for b in &c.members {
                    let (pa, pb) = (t_pos(a.detection), t_pos(b.detection));
                    assert!((pa - pb).abs() <= 1e-3 + 1e-12);
                }
            }
        }
        assert!(out.clusters.iter().all(|c| c.member_count() < 4));

        fn t_pos(d: usize) -> f64 {
            [1.0000, 1.0008, 1.0016, 1.0004][d]
        }
    }

    #[test]
    fn partitioning_does_not_change_the_result() {
        let mut states = Vec::new();
        for k in 0..40 {
            let base = 1.0 + 0.01 * k as f64;
            for m in 0..3 {
                states.push(state(3 * k + m, 0, 60000.0 + 0.04 * m as f64, base + 2e-4 * m as f64));
            }
        }
        let t = table(states);
        let reference = cluster_states(&t, &settings());
        assert_eq!(reference.clusters.len(), 40);
        for partitions in [2, 5, 17] {
            let out = cluster_states(
                &t,
                &ClusterSettings {
                    partitions,
                    ..settings()
                },
            );
            assert_eq!(out.clusters, reference.clusters);
            assert_eq!(out.stats, reference.stats);
        }
    }

    #[test]
    fn min_timespan_rejects_short_arcs() {
        let t = table(vec![
            state(0, 0, 60000.00, 1.0000),
            state(1, 0, 60000.04, 1.0002),
            state(2, 0, 60000.08, 1.0004),
        ]);
        let long_arcs = ClusterSettings {
            min_timespan: 0.1,
            ..settings()
        };
        let out = cluster_states(&t, &long_arcs);
        assert!(out.clusters.is_empty());
        assert_eq!(out.stats.dropped_min_timespan, 1);

        let out = cluster_states(
            &t,
            &ClusterSettings {
                min_timespan: 0.05,
                ..settings()
            },
        );
        assert_eq!(out.clusters.len(), 1);
        assert_abs_diff_eq!(out.clusters[0].timespan, 0.08, epsilon = 1e-9);
    }

    #[test]
    fn distance_bins_and_factors() {
        let scaling = RadiusScaling {
            change_distance: 1.0,
            min_distance: 0.5,
            max_distance: 8.0,
            bin_ratio: 2.0,
        };
        let bins = scaling.bins();
        assert_eq!(bins.len(), 4);
        for (k, &(lo, hi, factor)) in bins.iter().enumerate() {
            assert_abs_diff_eq!(lo, 0.5 * 2f64.powi(k as i32), epsilon = 1e-12);
            assert_abs_diff_eq!(hi, 4.0 * lo, epsilon = 1e-12);
            assert_abs_diff_eq!(factor, (2.0 * lo).max(1.0), epsilon = 1e-12);
        }
        assert_eq!(scaling.factor(0.3), 1.0);
        assert_eq!(scaling.factor(3.0), 3.0);

        let too_fine = RadiusScaling {
            bin_ratio: 1.0 + 1e-12,
            ..scaling
        };
        assert_eq!(too_fine.bin_count(), None);
    }

    #[test]
    fn radius_grows_with_distance() {
        let at = |detection, epoch, x, rho| PropagatedState {
            topocentric_distance: rho,
            ..state(detection, 0, epoch, x)
        };
        let t = table(vec![
            // near, 8e-4 AU apart
            at(0, 60000.00, 1.0000, 1.0),
            at(1, 60000.04, 1.0008, 1.0),
            at(2, 60000.08, 1.0016, 1.0),
            // far, 3e-3 AU apart
            at(3, 60000.00, 2.000, 4.0),
            at(4, 60000.04, 2.003, 4.0),
            at(5, 60000.08, 2.006, 4.0),
            // closer than the first bin
            at(6, 60000.00, 3.0000, 0.2),
            at(7, 60000.04, 3.0001, 0.2),
            at(8, 60000.08, 3.0002, 0.2),
        ]);

        let fixed = cluster_states(&t, &settings());
        let found: Vec<Vec<usize>> = fixed.clusters.iter().map(detections_of).collect();
        assert_eq!(found, vec![vec![0, 1, 2], vec![6, 7, 8]]);

        let scaled = ClusterSettings {
            radius_scaling: Some(RadiusScaling {
                change_distance: 1.0,
                min_distance: 0.5,
                max_distance: 8.0,
                bin_ratio: 2.0,
            }),
            ..settings()
        };
        let out = cluster_states(&t, &scaled);
        let found: Vec<Vec<usize>> = out.clusters.iter().map(detections_of).collect();
        assert_eq!(found, vec![vec![0, 1, 2], vec![3, 4, 5]]);

        // pairs found in two overlapping bins count once
        assert_eq!(out.stats.edges, 3 + 3);
        for partitions in [2, 5] {
            let again = cluster_states(&t, &ClusterSettings { partitions, ..scaled });
            assert_eq!(again.clusters, out.clusters);
            assert_eq!(again.stats, out.stats);
        }
    }
}
