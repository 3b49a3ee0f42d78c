//! Omission detection and localization.
//!
//! An omission is a faulty step the trace never recorded. The oracle either
//! confirms a step correct or disputes something no recorded step produced,
//! while the disputed step after it on the path still stands. The steps
//! strictly between the two form the omission window. A wrong branch is localized by binary search
//! over the window; a missing assignment by a scan driven by the steps that
//! read the disputed variable.

use crate::annotation::Reason;
use crate::channel::SessionEvent;
use crate::error::{EngineError, ProtocolError};
use crate::feedback::{FeedbackEdge, UserFeedback};
use crate::session::{Answer, Session, SessionOutcome};
use chrono::{DateTime, Utc};
use faultline_core::{StepOrder, VarId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OmissionKind {
    MissingBranch,
    MissingAssignment {
        var: VarId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl fmt::Display for OmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OmissionKind::MissingBranch => write!(f, "missing branch"),
            OmissionKind::MissingAssignment { var, name } => {
                write!(f, "missing assignment of {}", name.as_deref().unwrap_or(var.as_str()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmissionReport {
    pub session: Uuid,
    pub scope_start: StepOrder,
    pub scope_end: StepOrder,
    pub kind: OmissionKind,
    /// The step the search settled on, when it settled on one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized: Option<StepOrder>,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for OmissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} between step {} and step {}",
            self.kind, self.scope_start, self.scope_end
        )?;
        if let Some(step) = self.localized {
            write!(f, " (near step {})", step)?;
        }
        Ok(())
    }
}

/// Binary search state over an ordered omission window.
///
/// Invariant: every candidate below `lo` was confirmed correct, every
/// candidate at or above `hi` was not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySearch {
    candidates: Vec<StepOrder>,
    lo: usize,
    hi: usize,
}

impl BinarySearch {
    pub fn new(mut candidates: Vec<StepOrder>) -> Self {
        candidates.sort();
        let hi = candidates.len();
        Self { candidates, lo: 0, hi }
    }

    /// The step to ask about next, or `None` once the interval is empty.
    pub fn next_query(&self) -> Option<StepOrder> {
        (self.lo < self.hi).then(|| self.candidates[(self.lo + self.hi) / 2])
    }

    pub fn record(&mut self, correct: bool) {
        let mid = (self.lo + self.hi) / 2;
        if correct {
            self.lo = mid + 1;
        } else {
            self.hi = mid;
        }
    }

    /// First candidate not confirmed correct; `None` when all were.
    pub fn boundary(&self) -> Option<StepOrder> {
        self.candidates.get(self.lo).copied()
    }

    /// Last candidate confirmed correct.
    pub fn last_correct(&self) -> Option<StepOrder> {
        self.lo.checked_sub(1).map(|i| self.candidates[i])
    }
}

impl Session {
    /// Localize the omission between the correct step `start` and the
    /// disputed record `disputed`.
    pub(crate) fn handle_omission(
        &mut self,
        start: StepOrder,
        disputed: FeedbackEdge,
    ) -> Result<SessionOutcome, EngineError> {
        let end = disputed.step;
        let kind = match disputed.primary() {
            UserFeedback::WrongPath => OmissionKind::MissingBranch,
            UserFeedback::WrongVariableValue { var } => OmissionKind::MissingAssignment {
                var: var.clone(),
                name: self
                    .trace
                    .step(end)
                    .and_then(|s| s.read(var))
                    .and_then(|v| v.name.clone()),
            },
            other => {
                return Err(ProtocolError::UnhandledOmission {
                    step: end,
                    feedback: other.clone(),
                }
                .into())
            }
        };
        self.annotations.set(start, Reason::UserConfirmed);
        self.annotations.set(
            end,
            match &kind {
                OmissionKind::MissingBranch => Reason::MissingBranch,
                OmissionKind::MissingAssignment { var, .. } => {
                    Reason::MissingDefinition { var: var.clone() }
                }
            },
        );

        let candidates: Vec<StepOrder> = self
            .trace
            .between(start, end)
            .iter()
            .map(|s| s.order)
            .collect();
        info!(%start, %end, %kind, window = candidates.len(), "omission detected");

        if candidates.is_empty() {
            self.path = self.path.truncated_at(start);
            return Ok(self.report(start, end, kind, None));
        }
        match kind {
            OmissionKind::MissingBranch => self.search_branch(start, end, kind, candidates),
            OmissionKind::MissingAssignment { ref var, .. } => {
                let var = var.clone();
                self.scan_definition(start, end, &var, kind, candidates)
            }
        }
    }

    fn report(
        &mut self,
        scope_start: StepOrder,
        scope_end: StepOrder,
        kind: OmissionKind,
        localized: Option<StepOrder>,
    ) -> SessionOutcome {
        let report = OmissionReport {
            session: self.id,
            scope_start,
            scope_end,
            kind,
            localized,
            detected_at: Utc::now(),
        };
        info!(%report, "omission reported");
        self.publish(SessionEvent::OmissionReported(report.clone()));
        SessionOutcome::Omission(report)
    }

    /// Binary search for the first step the wrong branch affected.
    fn search_branch(
        &mut self,
        start: StepOrder,
        end: StepOrder,
        kind: OmissionKind,
        candidates: Vec<StepOrder>,
    ) -> Result<SessionOutcome, EngineError> {
        let mut search = BinarySearch::new(candidates);
        while let Some(mid) = search.next_query() {
            let correct = match self.ask(mid, UserFeedback::Correct, Reason::BinarySearch)? {
                Answer::Stop => return Ok(SessionOutcome::Stopped),
                Answer::Accept => return Ok(SessionOutcome::RootCause { step: mid }),
                Answer::Feedback(UserFeedback::RootCause) => {
                    return Ok(SessionOutcome::RootCause { step: mid })
                }
                Answer::Feedback(answer) => answer == UserFeedback::Correct,
            };
            debug!(%mid, correct, "binary search step");
            search.record(correct);
        }
        let boundary = search.boundary();
        let scope_start = search.last_correct().unwrap_or(start);
        Ok(self.report(scope_start, boundary.unwrap_or(end), kind, boundary))
    }

    /// Two-phase scan for the missing definition of `var`. Phase one narrows
    /// the range using the window steps that read `var`; phase two proposes
    /// every step of the narrowed range, both ends included, as the root
    /// cause.
    fn scan_definition(
        &mut self,
        start: StepOrder,
        end: StepOrder,
        var: &VarId,
        kind: OmissionKind,
        candidates: Vec<StepOrder>,
    ) -> Result<SessionOutcome, EngineError> {
        let readers: Vec<StepOrder> = candidates
            .iter()
            .copied()
            .filter(|s| self.trace.step(*s).is_some_and(|step| step.reads_var(var)))
            .collect();

        let (mut lo, mut hi) = (start, end);
        for reader in readers {
            match self.ask(reader, UserFeedback::Unclear, Reason::Related)? {
                Answer::Stop => return Ok(SessionOutcome::Stopped),
                Answer::Accept | Answer::Feedback(UserFeedback::RootCause) => {
                    return Ok(SessionOutcome::RootCause { step: reader })
                }
                Answer::Feedback(UserFeedback::Correct) => lo = reader,
                Answer::Feedback(_) => {
                    hi = reader;
                    break;
                }
            }
        }
        debug!(%lo, %hi, "definition scan narrowed");

        let range: Vec<StepOrder> = self
            .trace
            .steps()
            .iter()
            .map(|s| s.order)
            .filter(|s| *s >= lo && *s <= hi)
            .collect();
        for step in range {
            match self.ask(step, UserFeedback::RootCause, Reason::Scanning)? {
                Answer::Stop => return Ok(SessionOutcome::Stopped),
                Answer::Accept | Answer::Feedback(UserFeedback::RootCause) => {
                    self.annotations.set(step, Reason::UserConfirmed);
                    return Ok(self.report(lo, hi, kind, Some(step)));
                }
                Answer::Feedback(_) => continue,
            }
        }
        Ok(self.report(lo, hi, kind, None))
    }
}
