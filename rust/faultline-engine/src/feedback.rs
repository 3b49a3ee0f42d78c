//! Oracle feedback and the feedback paths shown to the oracle.
//!
//! A [`FeedbackPath`] is the walk from the wrong output back to a candidate
//! root cause. Each [`FeedbackEdge`] names a step and the feedback the engine
//! expects the oracle to agree with at that step; the final edge is always a
//! synthetic [`UserFeedback::RootCause`] on the candidate.
//!
//! Edges are kept in walk order, which is strictly decreasing execution order:
//! every dependency edge points to an earlier step, and steps inserted later by
//! the omission search are placed by order so the walk stays monotone.

use faultline_core::{StepOrder, VarId};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// UserFeedback
// ---------------------------------------------------------------------------

/// One judgement about a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserFeedback {
    /// The step and everything it read and wrote is correct.
    Correct,
    /// The step should not have executed: its controlling branch went wrong.
    WrongPath,
    /// The value of `var` read by the step is wrong.
    WrongVariableValue { var: VarId },
    /// The step itself is the fault.
    RootCause,
    /// The oracle cannot tell.
    Unclear,
}

/// Feedback tag without payload, used for parsing and reporting.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum FeedbackKind {
    Correct,
    WrongPath,
    #[strum(to_string = "wrong-variable-value", serialize = "wrong-var")]
    WrongVariableValue,
    #[strum(to_string = "root-cause", serialize = "root")]
    RootCause,
    Unclear,
}

impl UserFeedback {
    pub fn wrong_var(var: impl Into<String>) -> Self {
        UserFeedback::WrongVariableValue {
            var: VarId::new(var),
        }
    }

    pub fn kind(&self) -> FeedbackKind {
        match self {
            UserFeedback::Correct => FeedbackKind::Correct,
            UserFeedback::WrongPath => FeedbackKind::WrongPath,
            UserFeedback::WrongVariableValue { .. } => FeedbackKind::WrongVariableValue,
            UserFeedback::RootCause => FeedbackKind::RootCause,
            UserFeedback::Unclear => FeedbackKind::Unclear,
        }
    }
}

impl fmt::Display for UserFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserFeedback::WrongVariableValue { var } => write!(f, "wrong-variable-value({})", var),
            other => write!(f, "{}", other.kind()),
        }
    }
}

static UNCLEAR: UserFeedback = UserFeedback::Unclear;

// ---------------------------------------------------------------------------
// FeedbackEdge
// ---------------------------------------------------------------------------

/// A step paired with the feedback given (or proposed) for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEdge {
    pub step: StepOrder,
    pub feedbacks: Vec<UserFeedback>,
}

impl FeedbackEdge {
    pub fn new(step: StepOrder, feedback: UserFeedback) -> Self {
        Self {
            step,
            feedbacks: vec![feedback],
        }
    }

    /// The first feedback; an edge without feedback reads as unclear.
    pub fn primary(&self) -> &UserFeedback {
        self.feedbacks.first().unwrap_or(&UNCLEAR)
    }

    pub fn kind(&self) -> FeedbackKind {
        self.primary().kind()
    }
}

impl fmt::Display for FeedbackEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.feedbacks.iter().map(|fb| fb.to_string()).collect();
        write!(f, "#{} [{}]", self.step, parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// FeedbackPath
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackPath {
    edges: Vec<FeedbackEdge>,
}

impl FeedbackPath {
    pub fn new() -> Self {
        Self { edges: Vec::new() }
    }

    pub fn from_edges(edges: Vec<FeedbackEdge>) -> Self {
        Self { edges }
    }

    pub fn push(&mut self, edge: FeedbackEdge) {
        self.edges.push(edge);
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FeedbackEdge> {
        self.edges.get(index)
    }

    pub fn last(&self) -> Option<&FeedbackEdge> {
        self.edges.last()
    }

    pub fn edges(&self) -> &[FeedbackEdge] {
        &self.edges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeedbackEdge> {
        self.edges.iter()
    }

    pub fn contains(&self, step: StepOrder) -> bool {
        self.edges.iter().any(|e| e.step == step)
    }

    pub fn steps(&self) -> Vec<StepOrder> {
        self.edges.iter().map(|e| e.step).collect()
    }

    /// Insert an edge at its place in walk order (decreasing step order).
    /// An existing edge for the same step is replaced instead.
    pub fn insert_by_order(&mut self, edge: FeedbackEdge) {
        if self.replace(edge.clone()) {
            return;
        }
        let idx = self.edges.partition_point(|e| e.step > edge.step);
        self.edges.insert(idx, edge);
    }

    /// Replace the edge recorded for `edge.step` in place. Returns `false`
    /// when the step is not on the path.
    pub fn replace(&mut self, edge: FeedbackEdge) -> bool {
        match self.edges.iter_mut().find(|e| e.step == edge.step) {
            Some(slot) => {
                *slot = edge;
                true
            }
            None => false,
        }
    }

    /// Keep only the edges from the path start down to `order` (inclusive).
    pub fn truncated_at(&self, order: StepOrder) -> FeedbackPath {
        FeedbackPath {
            edges: self
                .edges
                .iter()
                .filter(|e| e.step >= order)
                .cloned()
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FeedbackPath {
    type Item = &'a FeedbackEdge;
    type IntoIter = std::slice::Iter<'a, FeedbackEdge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

impl fmt::Display for FeedbackPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.edges.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join(" -> "))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
