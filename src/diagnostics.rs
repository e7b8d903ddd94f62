//! Per-run counters.
//!
//! Failures that do not abort a run (geometric inconsistencies, invalid propagations,
//! clusters below a threshold) are tallied here and returned with the linkages.
use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::clustering::ClusterStats;
use crate::link_errors::{ProjectionFailure, PropagationFailure};
use crate::projection::VelocityOrigin;
use crate::propagation::{PropagatedState, PropagationStatus};
use crate::scoring::ScoreStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionCounts {
    pub non_positive_distance: usize,
    pub no_real_root: usize,
    pub no_positive_root: usize,
    pub too_close_to_observer: usize,
}

impl ProjectionCounts {
    pub fn total(&self) -> usize {
        self.non_positive_distance
            + self.no_real_root
            + self.no_positive_root
            + self.too_close_to_observer
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationCounts {
    pub beyond_horizon: usize,
    pub hyperbolic: usize,
    pub near_singular: usize,
    pub non_convergence: usize,
}

impl PropagationCounts {
    pub fn total(&self) -> usize {
        self.beyond_horizon + self.hyperbolic + self.near_singular + self.non_convergence
    }
}

/// Counters of one linking run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub detections: usize,
    pub hypotheses: usize,
    /// Detections with a tracklet partner.
    pub tracklet_detections: usize,

    /// (detection, hypothesis) pairs that produced a state.
    pub states_projected: usize,
    pub projection_failures: ProjectionCounts,
    /// States whose velocity came from the single-detection model although a tracklet
    /// partner existed.
    pub velocity_fallbacks: usize,
    pub propagation_failures: PropagationCounts,

    pub valid_states: usize,
    pub edges: usize,
    pub components: usize,
    pub duplicates_removed: usize,
    pub dropped_min_members: usize,
    pub dropped_min_epochs: usize,
    pub dropped_min_nights: usize,
    pub dropped_min_timespan: usize,
    pub dropped_max_rms: usize,
    pub dropped_min_score: usize,
    pub deduplicated: usize,
    pub linkages: usize,
}

impl RunDiagnostics {
    pub fn record_projection_failure(&mut self, failure: ProjectionFailure) {
        let c = &mut self.projection_failures;
        match failure {
            ProjectionFailure::NonPositiveDistance => c.non_positive_distance += 1,
            ProjectionFailure::NoRealRoot => c.no_real_root += 1,
            ProjectionFailure::NoPositiveRoot => c.no_positive_root += 1,
            ProjectionFailure::TooCloseToObserver => c.too_close_to_observer += 1,
        }
    }

    /// Count a projected and propagated state. `had_partner` tells whether a tracklet
    /// velocity was available for its detection.
    pub fn record_state(
        &mut self,
        state: &PropagatedState,
        origin: VelocityOrigin,
        had_partner: bool,
    ) {
        self.states_projected += 1;
        if had_partner && origin == VelocityOrigin::Model {
            self.velocity_fallbacks += 1;
        }
        if let PropagationStatus::Invalid(failure) = state.status {
            let c = &mut self.propagation_failures;
            match failure {
                PropagationFailure::BeyondHorizon => c.beyond_horizon += 1,
                PropagationFailure::Hyperbolic => c.hyperbolic += 1,
                PropagationFailure::NearSingular => c.near_singular += 1,
                PropagationFailure::NonConvergence => c.non_convergence += 1,
            }
        }
    }

    pub fn absorb_clustering(&mut self, stats: &ClusterStats) {
        self.valid_states = stats.valid_states;
        self.edges = stats.edges;
        self.components = stats.components;
        self.duplicates_removed = stats.duplicates_removed;
        self.dropped_min_members = stats.dropped_min_members;
        self.dropped_min_epochs = stats.dropped_min_epochs;
        self.dropped_min_nights = stats.dropped_min_nights;
        self.dropped_min_timespan = stats.dropped_min_timespan;
    }

    pub fn absorb_scoring(&mut self, stats: &ScoreStats, linkages: usize) {
        self.dropped_max_rms = stats.dropped_max_rms;
        self.dropped_min_score = stats.dropped_min_score;
        self.deduplicated = stats.deduplicated;
        self.linkages = linkages;
    }
}

impl AddAssign for ProjectionCounts {
    fn add_assign(&mut self, o: Self) {
        self.non_positive_distance += o.non_positive_distance;
        self.no_real_root += o.no_real_root;
        self.no_positive_root += o.no_positive_root;
        self.too_close_to_observer += o.too_close_to_observer;
    }
}

impl AddAssign for PropagationCounts {
    fn add_assign(&mut self, o: Self) {
        self.beyond_horizon += o.beyond_horizon;
        self.hyperbolic += o.hyperbolic;
        self.near_singular += o.near_singular;
        self.non_convergence += o.non_convergence;
    }
}

/// Merges the projection-stage counters of partial runs.
impl AddAssign for RunDiagnostics {
    fn add_assign(&mut self, o: Self) {
        self.states_projected += o.states_projected;
        self.projection_failures += o.projection_failures;
        self.velocity_fallbacks += o.velocity_fallbacks;
        self.propagation_failures += o.propagation_failures;
    }
}

impl fmt::Display for RunDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Run diagnostics")?;
            writeln!(f, "---------------")?;
            writeln!(f, "[Input]")?;
            writeln!(f, "  detections           = {}", self.detections)?;
            writeln!(f, "  hypotheses           = {}", self.hypotheses)?;
            writeln!(f, "  tracklet detections  = {}", self.tracklet_detections)?;
            writeln!(f, "\n[Projection / propagation]")?;
            writeln!(f, "  states projected     = {}", self.states_projected)?;
            writeln!(
                f,
                "  projection failures  = {} {:?}",
                self.projection_failures.total(),
                self.projection_failures
            )?;
            writeln!(f, "  velocity fallbacks   = {}", self.velocity_fallbacks)?;
            writeln!(
                f,
                "  propagation failures = {} {:?}",
                self.propagation_failures.total(),
                self.propagation_failures
            )?;
            writeln!(f, "\n[Clustering]")?;
            writeln!(f, "  valid states         = {}", self.valid_states)?;
            writeln!(f, "  edges                = {}", self.edges)?;
            writeln!(f, "  components           = {}", self.components)?;
            writeln!(f, "  duplicates removed   = {}", self.duplicates_removed)?;
            writeln!(
                f,
                "  dropped (members/epochs/nights/span) = {}/{}/{}/{}",
                self.dropped_min_members,
                self.dropped_min_epochs,
                self.dropped_min_nights,
                self.dropped_min_timespan
            )?;
            writeln!(f, "\n[Scoring]")?;
            writeln!(f, "  dropped (rms)        = {}", self.dropped_max_rms)?;
            writeln!(f, "  dropped (score)      = {}", self.dropped_min_score)?;
            writeln!(f, "  deduplicated         = {}", self.deduplicated)?;
            write!(f, "  linkages             = {}", self.linkages)
        } else {
            write!(
                f,
                "RunDiagnostics(detections={}, hypotheses={}, states={}, valid={}, edges={}, \
                 linkages={})",
                self.detections,
                self.hypotheses,
                self.states_projected,
                self.valid_states,
                self.edges,
                self.linkages
            )
        }
    }
}
