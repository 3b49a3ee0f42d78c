//! Root-cause localization over recorded execution traces.
//!
//! A [`Session`] scores every step of the backward slice from a wrong output
//! with [`Propagator`], picks a candidate root cause with
//! [`RootCauseSelector`], and shows the oracle the most probable
//! [`FeedbackPath`] from the output to that candidate. Feedback is folded
//! back in until the oracle accepts a root cause or the session localizes an
//! omitted step.

pub mod annotation;
pub mod belief;
pub mod channel;
pub mod config;
pub mod constraint;
pub mod error;
pub mod feedback;
pub mod graph;
pub mod omission;
pub mod oracle;
pub mod path_finder;
pub mod propagation;
pub mod selector;
pub mod session;

pub use annotation::{Annotations, Reason, Snapshot};
pub use belief::{BeliefNode, Beliefs, Labels, ValueSite, NEUTRAL_PRIOR};
pub use channel::{link, EngineLink, OracleLink, OracleMessage, SessionEvent, Wait};
pub use config::{ConfigError, EngineConfig, PropagationConfig, SelectionConfig, SessionConfig};
pub use constraint::{
    CaseBits, CaseLayout, Constraint, ConstraintError, RuleBuilder, RuleKind, RuleSet,
    StatementConstraintA1, StatementConstraintA2, StatementConstraintA3, MAX_CASE_BITS,
};
pub use error::{EngineError, ProtocolError};
pub use feedback::{FeedbackEdge, FeedbackKind, FeedbackPath, UserFeedback};
pub use omission::{BinarySearch, OmissionKind, OmissionReport};
pub use oracle::{OracleScript, ScriptError, ScriptedAnswer, ScriptedOracle};
pub use path_finder::{FoundPath, PathFinder, PathFinderError};
pub use propagation::Propagator;
pub use selector::{RootCauseSelector, SelectionStrategy};
pub use session::{Boundary, Session, SessionHandle, SessionOutcome};
