//! The refinement session: propose a path, wait for feedback, refine.
//!
//! A session owns the trace and every piece of mutable diagnostic state
//! (feedback records, annotations, the current path). It is the only writer;
//! observers see [`Snapshot`]s published through the [`EngineLink`].

use crate::annotation::{Annotations, Reason, Snapshot};
use crate::belief::{Beliefs, Labels};
use crate::channel::{link, EngineLink, OracleLink, OracleMessage, SessionEvent, Wait};
use crate::config::EngineConfig;
use crate::error::{EngineError, ProtocolError};
use crate::feedback::{FeedbackEdge, FeedbackKind, FeedbackPath, UserFeedback};
use crate::omission::OmissionReport;
use crate::path_finder::PathFinder;
use crate::propagation::Propagator;
use crate::selector::RootCauseSelector;
use faultline_core::{LoadedTrace, StepOrder, Trace, TraceError, VarId};
use serde::{Deserialize, Serialize};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where debugging starts: the wrong output and the known-good inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub output_step: StepOrder,
    pub output_var: Option<VarId>,
    pub inputs: Vec<VarId>,
}

impl Boundary {
    pub fn new(output_step: StepOrder) -> Self {
        Self {
            output_step,
            output_var: None,
            inputs: Vec::new(),
        }
    }

    pub fn with_output_var(mut self, var: impl Into<VarId>) -> Self {
        self.output_var = Some(var.into());
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<VarId>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn from_loaded(loaded: &LoadedTrace) -> Self {
        Self {
            output_step: loaded.output_step,
            output_var: loaded.output_var.clone(),
            inputs: loaded.inputs.clone(),
        }
    }

    /// The feedback the user implicitly gave by flagging the output: the
    /// output variable's value is wrong when the output step reads it, the
    /// output step should not have run otherwise.
    pub fn initial_record(&self, trace: &Trace) -> Result<FeedbackEdge, TraceError> {
        let output = trace.require(self.output_step)?;
        let feedback = match &self.output_var {
            Some(var) if output.reads_var(var) => UserFeedback::WrongVariableValue { var: var.clone() },
            _ => UserFeedback::WrongPath,
        };
        Ok(FeedbackEdge::new(self.output_step, feedback))
    }

    /// Labels before any oracle feedback: correct inputs, the initial record.
    pub fn initial_labels(&self, trace: &Trace) -> Result<Labels, TraceError> {
        let mut labels = Labels::new();
        for input in &self.inputs {
            labels.mark_input(input);
        }
        labels.apply_feedback(trace, &self.initial_record(trace)?)?;
        Ok(labels)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    RootCause { step: StepOrder },
    Omission(OmissionReport),
    Stopped,
    RoundLimit { rounds: usize },
}

/// Reply to a single-step query of the omission search.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Answer {
    Feedback(UserFeedback),
    /// The oracle accepted the queried step as the root cause.
    Accept,
    Stop,
}

enum PathReply {
    Feedback(FeedbackEdge),
    Accept,
    Stop,
}

pub struct Session {
    pub(crate) id: Uuid,
    pub(crate) trace: Trace,
    boundary: Boundary,
    config: EngineConfig,
    link: EngineLink,
    records: Vec<FeedbackEdge>,
    pub(crate) annotations: Annotations,
    pub(crate) path: FeedbackPath,
    round: usize,
    beliefs: Beliefs,
    candidate: Option<StepOrder>,
}

impl Session {
    pub fn new(
        trace: Trace,
        boundary: Boundary,
        config: EngineConfig,
        link: EngineLink,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let records = vec![boundary.initial_record(&trace)?];
        Ok(Self {
            id: Uuid::new_v4(),
            trace,
            boundary,
            config,
            link,
            records,
            annotations: Annotations::new(),
            path: FeedbackPath::new(),
            round: 0,
            beliefs: Beliefs::new(),
            candidate: None,
        })
    }

    pub fn from_loaded(
        loaded: LoadedTrace,
        config: EngineConfig,
        link: EngineLink,
    ) -> Result<Self, EngineError> {
        let boundary = Boundary::from_loaded(&loaded);
        Self::new(loaded.trace, boundary, config, link)
    }

    /// Run a session on a background thread.
    pub fn spawn(
        trace: Trace,
        boundary: Boundary,
        config: EngineConfig,
    ) -> Result<SessionHandle, EngineError> {
        let (engine, oracle) = link();
        let session = Self::new(trace, boundary, config, engine)?;
        let id = session.id;
        let join = thread::Builder::new()
            .name("faultline-session".into())
            .spawn(move || session.run())?;
        Ok(SessionHandle { id, oracle, join })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Every feedback the session has accepted so far, oldest first.
    pub fn records(&self) -> &[FeedbackEdge] {
        &self.records
    }

    /// Drive the session to completion on the current thread.
    pub fn run(mut self) -> Result<SessionOutcome, EngineError> {
        info!(session = %self.id, output = %self.boundary.output_step, "session started");
        let result = self.run_rounds();
        match &result {
            Ok(outcome) => {
                info!(session = %self.id, rounds = self.round, ?outcome, "session finished");
                self.link.publish(SessionEvent::Finished(outcome.clone()));
            }
            Err(err) => warn!(session = %self.id, "session failed: {}", err),
        }
        result
    }

    fn run_rounds(&mut self) -> Result<SessionOutcome, EngineError> {
        loop {
            if self.link.stop_requested() {
                return Ok(SessionOutcome::Stopped);
            }
            if self.round >= self.config.session.max_rounds {
                warn!(rounds = self.round, "round limit reached");
                return Ok(SessionOutcome::RoundLimit { rounds: self.round });
            }
            self.round += 1;
            self.propose()?;

            let edge = match self.await_path_feedback()? {
                PathReply::Stop => return Ok(SessionOutcome::Stopped),
                PathReply::Accept => {
                    let step = self.candidate.unwrap_or(self.boundary.output_step);
                    self.annotations.set(step, Reason::UserConfirmed);
                    return Ok(SessionOutcome::RootCause { step });
                }
                PathReply::Feedback(edge) => edge,
            };
            if let Some(outcome) = self.resolve(edge)? {
                return Ok(outcome);
            }
        }
    }

    fn labels(&self) -> Result<Labels, EngineError> {
        let mut labels = Labels::new();
        for input in &self.boundary.inputs {
            labels.mark_input(input);
        }
        for record in &self.records {
            labels.apply_feedback(&self.trace, record)?;
        }
        Ok(labels)
    }

    /// PROPOSE: propagate, select a candidate, compute and publish its path.
    fn propose(&mut self) -> Result<(), EngineError> {
        let labels = self.labels()?;
        let output = self.boundary.output_step;
        let slice = self.trace.backward_slice(output)?;
        self.beliefs =
            Propagator::from_config(&self.trace, &self.config.propagation).propagate(&slice, &labels)?;
        // A step the oracle already judged is not its own root cause.
        let open: Vec<StepOrder> = slice
            .iter()
            .copied()
            .filter(|s| !self.records.iter().any(|r| r.step == *s))
            .collect();
        let candidate = RootCauseSelector::from_config(&self.config.selection).select(
            &open,
            &self.beliefs,
            &labels,
            output,
        );
        let found = PathFinder::build(&self.trace, &slice, &self.beliefs)?.find_path(output, candidate)?;

        self.annotations
            .retain(|_, reason| !matches!(reason, Reason::Suspicious | Reason::Proposed));
        for edge in found.path.iter() {
            self.annotations.set(edge.step, Reason::Suspicious);
        }
        self.annotations.set(candidate, Reason::Proposed);
        self.candidate = Some(candidate);
        self.path = found.path;
        info!(round = self.round, %candidate, weight = found.weight, "proposed path");
        debug!(path = %self.path, "proposed path edges");
        self.link.publish(SessionEvent::PathProposed(self.snapshot()));
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot::capture(
            self.id,
            self.round,
            &self.path,
            self.candidate,
            &self.beliefs,
            &self.annotations,
        )
    }

    fn reject(&self, step: StepOrder, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%step, %reason, "feedback rejected");
        self.link.publish(SessionEvent::FeedbackRejected { step, reason });
    }

    /// Why `edge` cannot be used as feedback on the current path, if it can't.
    fn rejection(&self, edge: &FeedbackEdge) -> Option<String> {
        if !self.path.contains(edge.step) {
            return Some(format!("step {} is not on the proposed path", edge.step));
        }
        match edge.primary() {
            UserFeedback::Unclear => Some("unclear feedback does not refine the path".into()),
            UserFeedback::WrongVariableValue { var }
                if !self.trace.step(edge.step).is_some_and(|s| s.reads_var(var)) =>
            {
                Some(format!("step {} does not read {}", edge.step, var))
            }
            UserFeedback::RootCause => None,
            _ if self.resolves(edge) => None,
            _ => self.disputed_predecessor(edge.step).is_none().then(|| {
                format!("no disputed step after step {} bounds an omission", edge.step)
            }),
        }
    }

    /// AWAIT_FEEDBACK for a proposed path.
    fn await_path_feedback(&self) -> Result<PathReply, EngineError> {
        loop {
            match self.link.wait() {
                Wait::Stop => return Ok(PathReply::Stop),
                Wait::Disconnected => return Err(ProtocolError::OracleDisconnected.into()),
                Wait::Message(OracleMessage::RootCauseFound) => return Ok(PathReply::Accept),
                Wait::Message(OracleMessage::Feedback(edge)) => match self.rejection(&edge) {
                    Some(reason) => self.reject(edge.step, reason),
                    None => return Ok(PathReply::Feedback(edge)),
                },
            }
        }
    }

    /// Single-step query used by the omission search. The queried step is
    /// placed on the path with `proposal` until the oracle answers.
    pub(crate) fn ask(
        &mut self,
        step: StepOrder,
        proposal: UserFeedback,
        reason: Reason,
    ) -> Result<Answer, EngineError> {
        self.path
            .insert_by_order(FeedbackEdge::new(step, proposal.clone()));
        self.annotations.set(step, reason);
        self.link.publish(SessionEvent::Query {
            step,
            proposal,
            snapshot: self.snapshot(),
        });
        loop {
            match self.link.wait() {
                Wait::Stop => return Ok(Answer::Stop),
                Wait::Disconnected => return Err(ProtocolError::OracleDisconnected.into()),
                Wait::Message(OracleMessage::RootCauseFound) => return Ok(Answer::Accept),
                Wait::Message(OracleMessage::Feedback(edge)) if edge.step != step => {
                    self.reject(edge.step, format!("waiting for feedback on step {}", step));
                }
                Wait::Message(OracleMessage::Feedback(edge)) => {
                    let answer = edge.primary().clone();
                    self.path.replace(edge);
                    debug!(%step, %answer, "query answered");
                    return Ok(Answer::Feedback(answer));
                }
            }
        }
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        self.link.publish(event);
    }

    /// Fold feedback on a path step into the session. Returns an outcome
    /// when the session is over.
    fn resolve(&mut self, edge: FeedbackEdge) -> Result<Option<SessionOutcome>, EngineError> {
        let predecessor = self.disputed_predecessor(edge.step);
        let accepted: Vec<FeedbackEdge> = self
            .path
            .iter()
            .take_while(|e| e.step != edge.step)
            .cloned()
            .collect();
        self.records.extend(accepted);

        let step = edge.step;
        match edge.kind() {
            FeedbackKind::RootCause => {
                self.annotations.set(step, Reason::UserConfirmed);
                Ok(Some(SessionOutcome::RootCause { step }))
            }
            FeedbackKind::Correct => {
                self.records.push(edge.clone());
                self.path.replace(edge);
                self.annotations.set(step, Reason::UserConfirmed);
                let disputed = predecessor.ok_or(ProtocolError::NoDisputedStep { step })?;
                self.handle_omission(step, disputed).map(Some)
            }
            FeedbackKind::WrongPath | FeedbackKind::WrongVariableValue => {
                let resolvable = self.resolves(&edge);
                self.records.push(edge.clone());
                if resolvable {
                    debug!(feedback = %edge, "feedback recorded");
                    return Ok(None);
                }
                info!(feedback = %edge, "feedback has no explaining step");
                let disputed = predecessor.ok_or(ProtocolError::NoDisputedStep { step })?;
                self.handle_omission(step, disputed).map(Some)
            }
            FeedbackKind::Unclear => Ok(None),
        }
    }

    /// Does the feedback point at an existing earlier step?
    fn resolves(&self, edge: &FeedbackEdge) -> bool {
        match edge.primary() {
            UserFeedback::WrongVariableValue { var } => {
                self.trace.data_dependency(edge.step, var).is_some()
            }
            UserFeedback::WrongPath => self
                .trace
                .step(edge.step)
                .is_some_and(|s| s.control_dominator.is_some()),
            _ => false,
        }
    }

    /// The disputed record that precedes `step` once the path edges before
    /// it are accepted: the closest such path edge, else the most recent
    /// disputed record on a later step.
    fn disputed_predecessor(&self, step: StepOrder) -> Option<FeedbackEdge> {
        let prefix: Vec<&FeedbackEdge> = self.path.iter().take_while(|e| e.step != step).collect();
        prefix
            .into_iter()
            .rev()
            .chain(self.records.iter().rev())
            .find(|r| {
                r.step > step
                    && matches!(
                        r.kind(),
                        FeedbackKind::WrongPath | FeedbackKind::WrongVariableValue
                    )
            })
            .cloned()
    }
}

/// A session running on its own thread.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    oracle: OracleLink,
    join: JoinHandle<Result<SessionOutcome, EngineError>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn oracle(&self) -> &OracleLink {
        &self.oracle
    }

    pub fn stop(&self) {
        self.oracle.stop();
    }

    /// Wait for the session thread to finish.
    pub fn join(self) -> Result<SessionOutcome, EngineError> {
        let SessionHandle { oracle, join, .. } = self;
        let result = join.join().map_err(|_| EngineError::Panicked)?;
        drop(oracle);
        result
    }
}
