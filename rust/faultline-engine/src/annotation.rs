//! Diagnostic annotations and the snapshots published to observers.
//!
//! Annotations are owned by the session thread. Observers only ever see a
//! [`Snapshot`], an immutable copy taken after the session finishes a step
//! of work.

use crate::belief::Beliefs;
use crate::feedback::FeedbackPath;
use faultline_core::{StepOrder, VarId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Why the engine drew attention to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Reason {
    Suspicious,
    Proposed,
    MissingBranch,
    MissingDefinition { var: VarId },
    BinarySearch,
    Related,
    Scanning,
    UserConfirmed,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Suspicious => write!(f, "suspicious"),
            Reason::Proposed => write!(f, "proposed root cause"),
            Reason::MissingBranch => write!(f, "missing branch"),
            Reason::MissingDefinition { var } => write!(f, "missing definition of {}", var),
            Reason::BinarySearch => write!(f, "binary search"),
            Reason::Related => write!(f, "related to the missing definition"),
            Reason::Scanning => write!(f, "scanning"),
            Reason::UserConfirmed => write!(f, "confirmed by user"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    reasons: BTreeMap<StepOrder, Reason>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, step: StepOrder, reason: Reason) {
        self.reasons.insert(step, reason);
    }

    pub fn get(&self, step: StepOrder) -> Option<&Reason> {
        self.reasons.get(&step)
    }

    pub fn clear(&mut self) {
        self.reasons.clear();
    }

    pub fn retain(&mut self, mut keep: impl FnMut(StepOrder, &Reason) -> bool) {
        self.reasons.retain(|step, reason| keep(*step, reason));
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepOrder, &Reason)> {
        self.reasons.iter()
    }
}

/// What an observer needs to render one state of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session: Uuid,
    pub round: usize,
    pub path: FeedbackPath,
    pub candidate: Option<StepOrder>,
    pub step_probabilities: BTreeMap<StepOrder, f64>,
    pub annotations: BTreeMap<StepOrder, Reason>,
}

impl Snapshot {
    pub fn capture(
        session: Uuid,
        round: usize,
        path: &FeedbackPath,
        candidate: Option<StepOrder>,
        beliefs: &Beliefs,
        annotations: &Annotations,
    ) -> Self {
        Self {
            session,
            round,
            path: path.clone(),
            candidate,
            step_probabilities: beliefs.steps().clone(),
            annotations: annotations.reasons.clone(),
        }
    }
}
