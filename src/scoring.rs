//! # Cluster scoring and pruning
//!
//! Every surviving [`Cluster`] receives a quality score
//!
//! ```text
//!          points^wₘ · nights^wₙ · timespan^wₜ
//! score = ─────────────────────────────────────
//!              (1 + scatter / σ)^wₛ
//! ```
//!
//! where `σ` is the mean positional uncertainty of the members (astrometric σ in radians
//! times topocentric distance) and `scatter` the clustering-space spread of the cluster. With
//! `per_night_product` the first two factors become the product of the per-night member
//! counts, rewarding clusters spread evenly over several nights.
//!
//! Clusters whose position RMS exceeds `max_rms`, then clusters below `min_score`, are
//! discarded. With [`DedupPolicy::KeepBest`] the remaining ones are visited from best to worst
//! and a cluster is dropped when it shares more than `overlap_fraction` of the smaller
//! cluster's detections with an already kept one, or when either detection set contains the
//! other. Retained linkages are therefore never subsets of one another, even at
//! `overlap_fraction = 1`.
//!
//! ## See also
//! ------------
//! * [`cluster_states`](crate::clustering::cluster_states) – produces the clusters.
//! * [`ConicSummary`] – orbital class of the linkage centroid.
use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;

use ahash::RandomState;
use nalgebra::Vector3;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::clustering::Cluster;
use crate::constants::{Au, MJD};
use crate::detections::DetectionStore;
use crate::hypothesis::Hypothesis;
use crate::orbit_summary::ConicSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DedupPolicy {
    /// Drop clusters overlapping a better one.
    #[default]
    KeepBest,
    KeepAll,
}

/// Scoring settings, extracted from [`LinkParams`](crate::params::LinkParams).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringSettings {
    pub member_weight: f64,
    pub night_weight: f64,
    pub time_weight: f64,
    pub scatter_weight: f64,
    pub per_night_product: bool,
    pub min_score: f64,
    /// Largest accepted position RMS, AU.
    pub max_rms: Option<Au>,
    pub dedup: DedupPolicy,
    pub overlap_fraction: f64,
}

/// Mean state of a linkage at the reference epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitEstimate {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub position_rms: Au,
    /// AU/day.
    pub velocity_rms: f64,
    pub scatter: Au,
    /// Hypothesis shared by most members.
    pub hypothesis: Hypothesis,
    pub hypothesis_index: usize,
    /// `None` for a degenerate centroid.
    pub conic: Option<ConicSummary>,
}

/// A scored set of detections attributed to one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linkage {
    /// Ordered by epoch, then identifier.
    pub detection_ids: Vec<String>,
    pub score: f64,
    pub orbit: OrbitEstimate,
    pub reference_epoch: MJD,
    pub member_count: usize,
    pub distinct_epochs: usize,
    /// Detections per night.
    pub nights: SmallVec<[usize; 4]>,
    /// Days.
    pub timespan: f64,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Linkage(score={:.4}, n={}, nights={}, span={:.3} d, {}, ids=[{}])",
            self.score,
            self.member_count,
            self.nights.len(),
            self.timespan,
            self.orbit.hypothesis,
            self.detection_ids.join(", ")
        )
    }
}

/// Counters of the scoring stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreStats {
    pub dropped_max_rms: usize,
    pub dropped_min_score: usize,
    pub deduplicated: usize,
}

/// Mean positional uncertainty of the cluster members at their topocentric distance, AU.
pub fn positional_sigma(cluster: &Cluster, store: &DetectionStore) -> f64 {
    let n = cluster.member_count().max(1) as f64;
    cluster
        .members
        .iter()
        .map(|m| store.detections()[m.detection].sigma_radians() * m.topocentric_distance)
        .sum::<f64>()
        / n
}

/// Quality score of `cluster` given its positional uncertainty `sigma` (AU).
pub fn cluster_score(cluster: &Cluster, sigma: f64, settings: &ScoringSettings) -> f64 {
    let counts = if settings.per_night_product {
        cluster.nights.iter().map(|&n| n as f64).product::<f64>()
    } else {
        (cluster.member_count() as f64).powf(settings.member_weight)
            * (cluster.nights.len() as f64).powf(settings.night_weight)
    };

    let ratio = if sigma > 0.0 {
        cluster.scatter / sigma
    } else if cluster.scatter == 0.0 {
        0.0
    } else {
        f64::INFINITY
    };

    counts * cluster.timespan.powf(settings.time_weight)
        / (1.0 + ratio).powf(settings.scatter_weight)
}

struct Candidate {
    cluster: Cluster,
    score: f64,
    ids: Vec<String>,
    detections: HashSet<usize, RandomState>,
}

/// Score `clusters`, drop those below the minimum score, deduplicate and build the final
/// linkages.
///
/// Arguments
/// -----------------
/// * `clusters`: output of the clustering stage.
/// * `store`: detections the clusters refer to.
/// * `hypotheses`: the hypothesis grid the table was built with.
/// * `reference_epoch`: epoch of the cluster centroids.
/// * `settings`: weights, threshold and deduplication policy.
///
/// Return
/// ----------
/// * Linkages by descending score (ties by identifier list) and the stage counters.
pub fn score_and_prune(
    clusters: Vec<Cluster>,
    store: &DetectionStore,
    hypotheses: &[Hypothesis],
    reference_epoch: MJD,
    settings: &ScoringSettings,
) -> (Vec<Linkage>, ScoreStats) {
    let mut stats = ScoreStats::default();

    let mut candidates: Vec<Candidate> = clusters
        .into_iter()
        .filter_map(|cluster| {
            if settings.max_rms.is_some_and(|max| !(cluster.position_rms <= max)) {
                stats.dropped_max_rms += 1;
                return None;
            }
            let score = cluster_score(&cluster, positional_sigma(&cluster, store), settings);
            if !(score >= settings.min_score) {
                stats.dropped_min_score += 1;
                return None;
            }
            let mut members: Vec<(MJD, &str, usize)> = cluster
                .members
                .iter()
                .map(|m| {
                    let det = &store.detections()[m.detection];
                    (det.epoch, det.id.as_str(), m.detection)
                })
                .collect();
            members.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(b.1)));
            let ids = members.iter().map(|(_, id, _)| id.to_string()).collect();
            let detections = members.iter().map(|&(_, _, d)| d).collect();
            Some(Candidate {
                cluster,
                score,
                ids,
                detections,
            })
        })
        .collect();

    candidates.sort_by_cached_key(|c| {
        (
            Reverse(OrderedFloat(c.score)),
            Reverse(c.cluster.member_count()),
            OrderedFloat(c.cluster.scatter),
            c.ids.clone(),
        )
    });

    let kept: Vec<Candidate> = match settings.dedup {
        DedupPolicy::KeepAll => candidates,
        DedupPolicy::KeepBest => {
            let mut kept: Vec<Candidate> = Vec::new();
            for c in candidates {
                let overlaps = kept.iter().any(|k| {
                    let shared = c.detections.intersection(&k.detections).count();
                    let smaller = c.detections.len().min(k.detections.len());
                    shared == smaller || shared as f64 > settings.overlap_fraction * smaller as f64
                });
                if overlaps {
                    stats.deduplicated += 1;
                } else {
                    kept.push(c);
                }
            }
            kept
        }
    };

    let mut linkages: Vec<Linkage> = kept
        .into_iter()
        .map(|c| build_linkage(c, hypotheses, reference_epoch))
        .collect();
    linkages.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.detection_ids.cmp(&b.detection_ids))
    });

    debug!(
        linkages = linkages.len(),
        dropped_max_rms = stats.dropped_max_rms,
        dropped_min_score = stats.dropped_min_score,
        deduplicated = stats.deduplicated,
        "scoring done"
    );
    (linkages, stats)
}

fn build_linkage(c: Candidate, hypotheses: &[Hypothesis], reference_epoch: MJD) -> Linkage {
    let cl = c.cluster;
    let hypothesis = hypotheses
        .get(cl.hypothesis)
        .copied()
        .unwrap_or(Hypothesis::new(f64::NAN, f64::NAN, f64::NAN));
    Linkage {
        detection_ids: c.ids,
        score: c.score,
        orbit: OrbitEstimate {
            position: cl.centroid_position,
            velocity: cl.centroid_velocity,
            position_rms: cl.position_rms,
            velocity_rms: cl.velocity_rms,
            scatter: cl.scatter,
            hypothesis,
            hypothesis_index: cl.hypothesis,
            conic: ConicSummary::from_state(&cl.centroid_position, &cl.centroid_velocity),
        },
        reference_epoch,
        member_count: cl.member_count(),
        distinct_epochs: cl.distinct_epochs,
        nights: cl.nights,
        timespan: cl.timespan,
    }
}
