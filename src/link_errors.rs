//! # Error types
//!
//! [`LinkError`] is the single fatal error type of the crate: every fallible public function
//! returns `Result<_, LinkError>`. Only configuration problems, resource exhaustion and
//! malformed input abort a run.
//!
//! Per-item failures that a linking run is expected to meet by the thousands are **not**
//! errors: a (detection, hypothesis) pair with no geometric solution is a
//! [`ProjectionFailure`], a state that cannot be moved to the reference epoch is a
//! [`PropagationFailure`]. Both are recorded, counted in
//! [`RunDiagnostics`](crate::diagnostics::RunDiagnostics) and the run goes on.
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Invalid hypothesis grid: {0}")]
    InvalidHypothesisGrid(String),

    #[error("Invalid projection parameter: {0}")]
    InvalidProjectionParameter(String),

    #[error("Invalid propagation parameter: {0}")]
    InvalidPropagationParameter(String),

    #[error("Invalid clustering parameter: {0}")]
    InvalidClusteringParameter(String),

    #[error("Invalid scoring parameter: {0}")]
    InvalidScoringParameter(String),

    #[error("Invalid run parameter: {0}")]
    InvalidRunParameter(String),

    #[error(
        "Resource budget exceeded: {required_bytes} bytes required for the state table, \
         budget is {budget_bytes} bytes"
    )]
    ResourceExhausted {
        required_bytes: usize,
        budget_bytes: usize,
    },

    #[error("Duplicate detection identifier: {0}")]
    DuplicateDetectionId(String),

    #[error("Invalid detection {id}: {reason}")]
    InvalidDetection { id: String, reason: String },

    #[error("Unknown observatory code: {0}")]
    UnknownObservatory(String),

    #[error("Epoch {0} MJD is outside the observer ephemeris table")]
    EphemerisOutOfRange(f64),

    #[error("Invalid observer ephemeris table: {0}")]
    InvalidEphemerisTable(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

impl LinkError {
    /// True for the configuration family (grid, projection, propagation, clustering,
    /// scoring and run parameters). These are raised before any state vector is computed.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LinkError::InvalidHypothesisGrid(_)
                | LinkError::InvalidProjectionParameter(_)
                | LinkError::InvalidPropagationParameter(_)
                | LinkError::InvalidClusteringParameter(_)
                | LinkError::InvalidScoringParameter(_)
                | LinkError::InvalidRunParameter(_)
        )
    }
}

impl From<ordered_float::FloatIsNan> for LinkError {
    fn from(_: ordered_float::FloatIsNan) -> Self {
        LinkError::InvalidEphemerisTable("NaN encountered in observer geometry".into())
    }
}

/// Why a (detection, hypothesis) pair produced no heliocentric state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionFailure {
    #[error("hypothesized heliocentric distance is not positive at the detection epoch")]
    NonPositiveDistance,

    #[error("line of sight never reaches the hypothesized heliocentric distance")]
    NoRealRoot,

    #[error("both topocentric roots are behind the observer")]
    NoPositiveRoot,

    #[error("topocentric distance below the configured minimum")]
    TooCloseToObserver,
}

/// Why a state could not be carried to the reference epoch.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropagationFailure {
    #[error("propagation interval exceeds the validity horizon")]
    BeyondHorizon,

    #[error("hyperbolic excess speed above the configured maximum")]
    Hyperbolic,

    #[error("heliocentric radius too small for a stable solution")]
    NearSingular,

    #[error("universal Kepler equation did not converge")]
    NonConvergence,
}

#[cfg(test)]
mod link_errors_test {
    use super::*;

    #[test]
    fn configuration_family() {
        assert!(LinkError::InvalidHypothesisGrid("x".into()).is_configuration_error());
        assert!(LinkError::InvalidScoringParameter("x".into()).is_configuration_error());
        assert!(!LinkError::ResourceExhausted {
            required_bytes: 2,
            budget_bytes: 1
        }
        .is_configuration_error());
        assert!(!LinkError::DuplicateDetectionId("a".into()).is_configuration_error());
    }

    #[test]
    fn display_messages() {
        let err = LinkError::InvalidDetection {
            id: "d1".into(),
            reason: "declination out of range".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid detection d1: declination out of range"
        );
    }
}
