//! Heliocentric-hypothesis linking of asteroid detections.
//!
//! Detections are projected to heliocentric states under a grid of distance and
//! radial-velocity hypotheses, propagated to a common epoch, clustered, and the clusters
//! scored into candidate linkages. Start with [`HelioLinker`].
pub mod clustering;
pub mod constants;
pub mod detections;
pub mod diagnostics;
pub mod hypothesis;
mod kepler;
pub mod link_errors;
pub mod linker;
pub mod observers;
pub mod orbit_summary;
pub mod params;
pub mod projection;
pub mod propagation;
pub mod ref_system;
pub mod scoring;
pub mod time;

pub use detections::{Detection, DetectionStore};
pub use diagnostics::RunDiagnostics;
pub use hypothesis::{Hypothesis, HypothesisGridConfig};
pub use link_errors::LinkError;
pub use linker::{HelioLinker, LinkageReport};
pub use params::LinkParams;
pub use scoring::Linkage;
