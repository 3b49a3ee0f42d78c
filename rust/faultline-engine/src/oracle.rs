//! A scripted oracle that answers from a ground-truth table.
//!
//! ```json
//! {
//!   "root_cause": 4,
//!   "answers": [
//!     { "step": 9, "feedback": { "type": "wrong_variable_value", "var": "sum" } },
//!     { "step": 6, "feedback": { "type": "wrong_path" } }
//!   ]
//! }
//! ```
//!
//! Steps without an answer are taken to be correct.

use crate::channel::{OracleLink, OracleMessage, SessionEvent};
use crate::feedback::{FeedbackEdge, FeedbackPath, UserFeedback};
use faultline_core::StepOrder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedAnswer {
    pub step: StepOrder,
    pub feedback: UserFeedback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleScript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<StepOrder>,
    #[serde(default)]
    pub answers: Vec<ScriptedAnswer>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("cannot read oracle script: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid oracle script: {0}")]
    Json(#[from] serde_json::Error),
}

impl OracleScript {
    pub fn from_json(source: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedOracle {
    truth: HashMap<StepOrder, UserFeedback>,
    root_cause: Option<StepOrder>,
}

impl ScriptedOracle {
    pub fn new(script: OracleScript) -> Self {
        Self {
            truth: script
                .answers
                .into_iter()
                .map(|a| (a.step, a.feedback))
                .collect(),
            root_cause: script.root_cause,
        }
    }

    /// Truthful feedback for `step`.
    pub fn truth(&self, step: StepOrder) -> UserFeedback {
        if self.root_cause == Some(step) {
            return UserFeedback::RootCause;
        }
        self.truth.get(&step).cloned().unwrap_or(UserFeedback::Correct)
    }

    /// Reply to a proposed path: the first edge the truth disagrees with, or
    /// acceptance when every edge agrees. Unclear truths never disagree.
    pub fn review(&self, path: &FeedbackPath) -> OracleMessage {
        for edge in path {
            let truth = self.truth(edge.step);
            if truth != UserFeedback::Unclear && &truth != edge.primary() {
                return OracleMessage::Feedback(FeedbackEdge::new(edge.step, truth));
            }
        }
        OracleMessage::RootCauseFound
    }

    /// Reply to `event`, if it asks for one.
    pub fn answer(&self, event: &SessionEvent) -> Option<OracleMessage> {
        match event {
            SessionEvent::PathProposed(snapshot) => Some(self.review(&snapshot.path)),
            SessionEvent::Query { step, .. } => Some(OracleMessage::Feedback(
                FeedbackEdge::new(*step, self.truth(*step)),
            )),
            _ => None,
        }
    }

    /// Answer session events until the session finishes. A rejected answer
    /// stops the session, since the script would only repeat it.
    pub fn drive(&self, link: &OracleLink) {
        while let Some(event) = link.next_event() {
            match &event {
                SessionEvent::Finished(_) => break,
                SessionEvent::FeedbackRejected { step, reason } => {
                    debug!(%step, %reason, "scripted answer rejected; stopping");
                    link.stop();
                }
                _ => {
                    if let Some(reply) = self.answer(&event) {
                        if !link.send(reply) {
                            break;
                        }
                    }
                }
            }
        }
    }
}
