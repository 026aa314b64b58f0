use sbm_core::models::ParticipantId;
use thiserror::Error;

/// Fatal agent failures.
///
/// Anything here terminates the agent's control loop; the supervisor reacts
/// by cancelling the shared token. Submission failures are deliberately
/// absent; they are telemetry, not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    /// The notifier refused the registration (duplicate participant ID).
    #[error("participant {0} is already registered")]
    Registration(ParticipantId),
    /// A worker's queue closed underneath the control loop, meaning the
    /// worker itself is gone.
    #[error("worker queue closed unexpectedly")]
    WorkerGone,
    /// A clearing invocation failed and the regulator is configured to halt.
    #[error("clearing failed: {0}")]
    Clearing(String),
    /// The agent was constructed with unusable configuration.
    #[error("invalid agent configuration: {0}")]
    Config(String),
}
