//! JSON trace files handed over by the trace recorder.
//!
//! ```json
//! {
//!   "program": "Sum.java",
//!   "steps": [ { "order": 1, "writes": [ { "id": "i" } ] }, ... ],
//!   "output": { "step": 9, "var": "sum" },
//!   "inputs": ["n"]
//! }
//! ```

use crate::step::{StepOrder, TraceStep, VarId};
use crate::trace::{Trace, TraceError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Which step and variable the user flagged as the wrong output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<VarId>,
}

/// On-disk layout of a recorded trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub steps: Vec<TraceStep>,
    #[serde(default)]
    pub output: OutputSpec,
    /// Variables known to hold correct input values.
    #[serde(default)]
    pub inputs: Vec<VarId>,
}

/// A validated trace together with its debugging boundary.
#[derive(Debug, Clone)]
pub struct LoadedTrace {
    pub program: Option<String>,
    pub trace: Trace,
    pub output_step: StepOrder,
    pub output_var: Option<VarId>,
    pub inputs: Vec<VarId>,
    pub fingerprint: String,
}

impl TraceFile {
    pub fn from_json(source: &str) -> Result<Self, TraceError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String, TraceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the steps and resolve the output step.
    ///
    /// The output step is taken from `output.step` when given, otherwise it is
    /// the last step touching `output.var`, otherwise the last step overall.
    pub fn into_trace(self) -> Result<LoadedTrace, TraceError> {
        let fingerprint = fingerprint(&self.steps)?;
        let trace = Trace::from_steps(self.steps)?;
        let output_step = match (&self.output.step, &self.output.var) {
            (Some(step), _) => trace.require(*step)?.order,
            (None, Some(var)) => trace
                .last_touching(var)
                .ok_or_else(|| TraceError::UnknownVariable(var.clone()))?,
            (None, None) => trace.last().map(|s| s.order).ok_or(TraceError::Empty)?,
        };
        Ok(LoadedTrace {
            program: self.program,
            trace,
            output_step,
            output_var: self.output.var,
            inputs: self.inputs,
            fingerprint,
        })
    }
}

/// `sha256:<hex>` digest of the serialized steps, sorted by order.
pub fn fingerprint(steps: &[TraceStep]) -> Result<String, TraceError> {
    let mut sorted: Vec<&TraceStep> = steps.iter().collect();
    sorted.sort_by_key(|s| s.order);
    let canonical = serde_json::to_string(&sorted)?;
    Ok(format!("sha256:{:x}", Sha256::digest(canonical.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "program": "Demo",
        "steps": [
            { "order": 1, "writes": [ { "id": "x" } ] },
            { "order": 2, "reads": [ { "id": "x" } ], "writes": [ { "id": "y" } ] },
            { "order": 3, "reads": [ { "id": "y" } ] }
        ],
        "output": { "var": "y" },
        "inputs": ["n"]
    }"#;

    #[test]
    fn output_step_resolves_from_variable() {
        let loaded = TraceFile::from_json(SAMPLE).unwrap().into_trace().unwrap();
        assert_eq!(loaded.output_step, StepOrder(3));
        assert_eq!(loaded.output_var, Some(VarId::from("y")));
        assert_eq!(loaded.inputs, vec![VarId::from("n")]);
        assert_eq!(loaded.program.as_deref(), Some("Demo"));
    }

    #[test]
    fn explicit_output_step_wins() {
        let mut file = TraceFile::from_json(SAMPLE).unwrap();
        file.output.step = Some(StepOrder(2));
        let loaded = file.into_trace().unwrap();
        assert_eq!(loaded.output_step, StepOrder(2));
    }

    #[test]
    fn unknown_output_variable_is_an_error() {
        let mut file = TraceFile::from_json(SAMPLE).unwrap();
        file.output.var = Some(VarId::from("missing"));
        assert!(matches!(
            file.into_trace(),
            Err(TraceError::UnknownVariable(_))
        ));
    }

    #[test]
    fn fingerprint_ignores_step_order_in_file() {
        let file = TraceFile::from_json(SAMPLE).unwrap();
        let mut reversed = file.steps.clone();
        reversed.reverse();
        let a = fingerprint(&file.steps).unwrap();
        let b = fingerprint(&reversed).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        assert_eq!(a.len(), 7 + 64);
    }

    #[test]
    fn malformed_json_reports_error() {
        assert!(matches!(
            TraceFile::from_json("{ not json"),
            Err(TraceError::Json(_))
        ));
    }
}
