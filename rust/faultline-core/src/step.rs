//! Trace steps and the variable occurrences they read and write.
//!
//! A [`TraceStep`] is one executed statement instance. Steps are created by
//! the trace recorder and never change shape afterwards; everything the
//! inference engine computes about a step (probabilities, explanations) lives
//! outside the step in engine-owned tables.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Execution order of a step. Unique within a trace and totally ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StepOrder(pub u32);

impl StepOrder {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StepOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StepOrder {
    fn from(value: u32) -> Self {
        StepOrder(value)
    }
}

/// Stable identity of a variable across the trace.
///
/// Two occurrences with the same `VarId` refer to the same storage location;
/// the producing step of a read is the latest earlier step that writes it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(pub String);

impl VarId {
    pub fn new(id: impl Into<String>) -> Self {
        VarId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VarId {
    fn from(value: &str) -> Self {
        VarId(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Variable occurrences
// ---------------------------------------------------------------------------

/// One variable occurrence at a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableValue {
    pub id: VarId,
    /// Display name; defaults to the identity when the recorder omits it.
    #[serde(default)]
    pub name: Option<String>,
    /// Set on the value a branching step writes for its own condition.
    #[serde(default)]
    pub is_control_result: bool,
}

impl VariableValue {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: VarId::new(id),
            name: None,
            is_control_result: false,
        }
    }

    /// A condition-result value written by a branching step.
    pub fn control_result(id: impl Into<String>) -> Self {
        Self {
            is_control_result: true,
            ..Self::new(id)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// One recorded execution of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub order: StepOrder,
    /// Source location label (`File.java:42`, `main.rs:10`, ...).
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub reads: Vec<VariableValue>,
    #[serde(default)]
    pub writes: Vec<VariableValue>,
    /// The branching step whose decision caused this step to run.
    #[serde(default)]
    pub control_dominator: Option<StepOrder>,
    #[serde(default)]
    pub step_in_previous: Option<StepOrder>,
    #[serde(default)]
    pub step_in_next: Option<StepOrder>,
    #[serde(default)]
    pub step_over_previous: Option<StepOrder>,
    #[serde(default)]
    pub step_over_next: Option<StepOrder>,
}

impl TraceStep {
    pub fn new(order: u32) -> Self {
        Self {
            order: StepOrder(order),
            location: None,
            reads: Vec::new(),
            writes: Vec::new(),
            control_dominator: None,
            step_in_previous: None,
            step_in_next: None,
            step_over_previous: None,
            step_over_next: None,
        }
    }

    pub fn reading(mut self, value: VariableValue) -> Self {
        self.reads.push(value);
        self
    }

    pub fn writing(mut self, value: VariableValue) -> Self {
        self.writes.push(value);
        self
    }

    pub fn dominated_by(mut self, order: u32) -> Self {
        self.control_dominator = Some(StepOrder(order));
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn reads_var(&self, id: &VarId) -> bool {
        self.reads.iter().any(|v| &v.id == id)
    }

    pub fn writes_var(&self, id: &VarId) -> bool {
        self.writes.iter().any(|v| &v.id == id)
    }

    pub fn read(&self, id: &VarId) -> Option<&VariableValue> {
        self.reads.iter().find(|v| &v.id == id)
    }

    /// The condition-result value this step writes, if it is a branch.
    pub fn control_result(&self) -> Option<&VariableValue> {
        self.writes.iter().find(|v| v.is_control_result)
    }

    pub fn label(&self) -> String {
        match &self.location {
            Some(loc) => format!("#{} {}", self.order, loc),
            None => format!("#{}", self.order),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
