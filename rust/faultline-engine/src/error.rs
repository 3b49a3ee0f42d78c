use crate::config::ConfigError;
use crate::constraint::ConstraintError;
use crate::feedback::UserFeedback;
use crate::path_finder::PathFinderError;
use faultline_core::{StepOrder, TraceError};

/// Fatal conditions of the feedback protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("step {step}: feedback {feedback} cannot explain an omission")]
    UnhandledOmission {
        step: StepOrder,
        feedback: UserFeedback,
    },
    #[error("step {step}: no disputed step precedes it on the path")]
    NoDisputedStep { step: StepOrder },
    #[error("oracle disconnected")]
    OracleDisconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    PathFinder(#[from] PathFinderError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot start session thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("session thread panicked")]
    Panicked,
}
