//! # Linking run orchestration
//!
//! [`HelioLinker`] runs the full batch pipeline over a [`DetectionStore`]:
//!
//! 1. resolve the reference epoch and check the state table fits the memory budget,
//! 2. pair detections into tracklets,
//! 3. project every (detection, hypothesis) pair and propagate it to the reference epoch,
//! 4. cluster the propagated states,
//! 5. score, filter and deduplicate the clusters into [`Linkage`]s.
//!
//! Each stage consumes the whole output of the previous one. Non-fatal failures are counted
//! in the returned [`RunDiagnostics`].
//!
//! ## Parallelism
//!
//! Step 3 runs on the rayon pool, one task per detection; each task fills the contiguous
//! block of `n_hypotheses` slots owned by its detection, so the table layout never depends
//! on scheduling. With the `progress` feature an `indicatif` bar tracks this step.
//!
//! ## See also
//! ------------
//! * [`LinkParams`] – run configuration.
//! * [`cluster_states`] – clustering stage.
//! * [`score_and_prune`] – scoring stage.
use std::mem::size_of;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clustering::cluster_states;
use crate::constants::MJD;
use crate::detections::tracklets::pair_detections;
use crate::detections::DetectionStore;
use crate::diagnostics::RunDiagnostics;
use crate::hypothesis::Hypothesis;
use crate::link_errors::LinkError;
use crate::params::LinkParams;
use crate::projection::project;
use crate::propagation::{propagator_for, PropagatedState, Propagator, StateTable};
use crate::scoring::{score_and_prune, Linkage};

/// Output of a linking run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkageReport {
    /// By descending score.
    pub linkages: Vec<Linkage>,
    pub diagnostics: RunDiagnostics,
    /// `None` when the run had no detection.
    pub reference_epoch: Option<MJD>,
}

/// Heliocentric linking engine: a validated configuration with its enumerated hypothesis
/// grid and propagator.
pub struct HelioLinker {
    params: LinkParams,
    hypotheses: Vec<Hypothesis>,
    propagator: Box<dyn Propagator>,
}

impl HelioLinker {
    /// Validate `params` and enumerate the hypothesis grid.
    ///
    /// Errors
    /// ----------
    /// * A configuration [`LinkError`] for any invalid parameter, before any state is computed.
    pub fn new(params: LinkParams) -> Result<Self, LinkError> {
        params.validate()?;
        let hypotheses = params.grid.generate()?;
        let propagator = propagator_for(params.propagation_model, params.propagation_settings());
        Ok(HelioLinker {
            params,
            hypotheses,
            propagator,
        })
    }

    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// Bytes needed by the state table of `n_detections` detections.
    pub fn required_bytes(&self, n_detections: usize) -> usize {
        n_detections
            .checked_mul(self.hypotheses.len())
            .and_then(|n| n.checked_mul(size_of::<PropagatedState>()))
            .unwrap_or(usize::MAX)
    }

    /// Link the detections of `store`.
    ///
    /// Arguments
    /// -----------------
    /// * `store`: the validated detection catalog.
    ///
    /// Return
    /// ----------
    /// * The linkages by descending score with the run diagnostics. An empty store yields an
    ///   empty report.
    ///
    /// Errors
    /// ----------
    /// * [`LinkError::ResourceExhausted`] when the state table would exceed
    ///   `memory_budget_bytes`.
    pub fn link(&self, store: &DetectionStore) -> Result<LinkageReport, LinkError> {
        let mut diagnostics = RunDiagnostics {
            detections: store.len(),
            hypotheses: self.hypotheses.len(),
            ..RunDiagnostics::default()
        };

        let Some(reference_epoch) = self.params.reference_epoch.resolve(store) else {
            warn!("no detections to link");
            return Ok(LinkageReport {
                diagnostics,
                ..LinkageReport::default()
            });
        };

        let required_bytes = self.required_bytes(store.len());
        if required_bytes > self.params.memory_budget_bytes {
            return Err(LinkError::ResourceExhausted {
                required_bytes,
                budget_bytes: self.params.memory_budget_bytes,
            });
        }

        info!(
            detections = store.len(),
            hypotheses = self.hypotheses.len(),
            reference_epoch,
            "linking run started"
        );

        let (table, projection) = self.propagate_all(store, reference_epoch);
        diagnostics.tracklet_detections = projection.tracklet_detections;
        diagnostics += projection;
        info!(
            states = diagnostics.states_projected,
            projection_failures = diagnostics.projection_failures.total(),
            propagation_failures = diagnostics.propagation_failures.total(),
            "states propagated"
        );

        let clustered = cluster_states(&table, &self.params.cluster_settings());
        diagnostics.absorb_clustering(&clustered.stats);
        info!(
            edges = clustered.stats.edges,
            clusters = clustered.clusters.len(),
            "clustering done"
        );

        let (linkages, score_stats) = score_and_prune(
            clustered.clusters,
            store,
            &self.hypotheses,
            reference_epoch,
            &self.params.scoring_settings(),
        );
        diagnostics.absorb_scoring(&score_stats, linkages.len());
        info!(linkages = linkages.len(), "linking run done");

        Ok(LinkageReport {
            linkages,
            diagnostics,
            reference_epoch: Some(reference_epoch),
        })
    }

    /// Project every (detection, hypothesis) pair of `store` and propagate it to
    /// `reference_epoch`.
    ///
    /// Return
    /// ----------
    /// * The state table and the projection-stage counters.
    pub fn propagate_all(
        &self,
        store: &DetectionStore,
        reference_epoch: MJD,
    ) -> (StateTable, RunDiagnostics) {
        let partners = pair_detections(store, &self.params);
        let tracklet_detections = partners.iter().filter(|p| p.is_some()).count();
        debug!(tracklet_detections, "tracklets paired");

        let settings = self.params.projection_settings(reference_epoch);

        #[cfg(feature = "progress")]
        let pb = progress_bar(store.len() as u64);

        let blocks: Vec<(Vec<Option<PropagatedState>>, RunDiagnostics)> = (0..store.len())
            .into_par_iter()
            .map(|det| {
                let partner = partners[det];
                let mut diag = RunDiagnostics::default();
                let block = self
                    .hypotheses
                    .iter()
                    .enumerate()
                    .map(|(h, hyp)| match project(store, det, h, hyp, partner, &settings) {
                        Ok(state) => {
                            let propagated = self.propagator.propagate(&state, reference_epoch);
                            diag.record_state(
                                &propagated,
                                state.velocity_origin,
                                partner.is_some(),
                            );
                            Some(propagated)
                        }
                        Err(failure) => {
                            diag.record_projection_failure(failure);
                            None
                        }
                    })
                    .collect();

                #[cfg(feature = "progress")]
                pb.inc(1);

                (block, diag)
            })
            .collect();

        #[cfg(feature = "progress")]
        pb.finish_and_clear();

        let mut diagnostics = RunDiagnostics {
            tracklet_detections,
            ..RunDiagnostics::default()
        };
        let mut slots = Vec::with_capacity(store.len() * self.hypotheses.len());
        for (block, diag) in blocks {
            slots.extend(block);
            diagnostics += diag;
        }

        (
            StateTable::new(self.hypotheses.len(), reference_epoch, slots),
            diagnostics,
        )
    }
}

#[cfg(feature = "progress")]
fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total.max(1));
    if let Ok(style) = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | {per_sec} | ETA {eta_precise} | {msg}",
    ) {
        pb.set_style(style);
    }
    pb.set_message("projecting");
    pb
}
