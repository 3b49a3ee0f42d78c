//! Message passing between a session and its oracle.
//!
//! Three [`crossbeam_channel`] channels connect the two sides: feedback
//! flows from the oracle to the session, a separate stop channel cancels
//! the session, and events flow back to whoever renders the session state.
//! The session side blocks only in [`EngineLink::wait`].

use crate::annotation::Snapshot;
use crate::feedback::{FeedbackEdge, UserFeedback};
use crate::omission::OmissionReport;
use crate::session::SessionOutcome;
use crossbeam_channel::{self as cb, select};
use faultline_core::StepOrder;
use std::cell::Cell;
use std::fmt;
use tracing::trace;

/// What the oracle can tell a session.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleMessage {
    /// Feedback on one step of the path or query currently shown.
    Feedback(FeedbackEdge),
    /// The oracle accepts the proposed candidate as the root cause.
    RootCauseFound,
}

/// What a session publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new feedback path is waiting for feedback.
    PathProposed(Snapshot),
    /// The omission search asks about a single step.
    Query {
        step: StepOrder,
        proposal: UserFeedback,
        snapshot: Snapshot,
    },
    /// The last feedback was not accepted; the session waits for another.
    FeedbackRejected { step: StepOrder, reason: String },
    OmissionReported(OmissionReport),
    Finished(SessionOutcome),
}

/// Outcome of [`EngineLink::wait`].
#[derive(Debug, Clone, PartialEq)]
pub enum Wait {
    Message(OracleMessage),
    Stop,
    /// Every feedback sender is gone but no stop was requested.
    Disconnected,
}

/// Session side of the link.
pub struct EngineLink {
    feedback: cb::Receiver<OracleMessage>,
    stop: cb::Receiver<()>,
    events: cb::Sender<SessionEvent>,
    stopped: Cell<bool>,
}

impl fmt::Debug for EngineLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLink")
            .field("stopped", &self.stopped.get())
            .finish_non_exhaustive()
    }
}

impl EngineLink {
    /// `true` once a stop was sent or every stop sender was dropped. Sticky.
    pub fn stop_requested(&self) -> bool {
        if self.stopped.get() {
            return true;
        }
        let stop = match self.stop.try_recv() {
            Ok(()) => true,
            Err(cb::TryRecvError::Disconnected) => true,
            Err(cb::TryRecvError::Empty) => false,
        };
        self.stopped.set(stop);
        stop
    }

    /// Block until the oracle answers or the session is stopped.
    pub fn wait(&self) -> Wait {
        if self.stop_requested() {
            return Wait::Stop;
        }
        select! {
            recv(self.stop) -> _ => {
                self.stopped.set(true);
                Wait::Stop
            }
            recv(self.feedback) -> msg => match msg {
                Ok(message) => Wait::Message(message),
                Err(_) if self.stop_requested() => Wait::Stop,
                Err(_) => Wait::Disconnected,
            },
        }
    }

    /// Hand an event to the observer. Nobody listening is not an error.
    pub fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("no observer for session events");
        }
    }
}

/// Oracle side of the link.
#[derive(Debug, Clone)]
pub struct OracleLink {
    feedback: cb::Sender<OracleMessage>,
    stop: cb::Sender<()>,
    events: cb::Receiver<SessionEvent>,
}

impl OracleLink {
    pub fn send_feedback(&self, step: StepOrder, feedback: UserFeedback) -> bool {
        self.send(OracleMessage::Feedback(FeedbackEdge::new(step, feedback)))
    }

    pub fn confirm_root_cause(&self) -> bool {
        self.send(OracleMessage::RootCauseFound)
    }

    /// Returns `false` when the session has already ended.
    pub fn send(&self, message: OracleMessage) -> bool {
        self.feedback.send(message).is_ok()
    }

    pub fn stop(&self) {
        let _ = self.stop.send(());
    }

    /// Next session event; `None` once the session is gone.
    pub fn next_event(&self) -> Option<SessionEvent> {
        self.events.recv().ok()
    }

    pub fn events(&self) -> &cb::Receiver<SessionEvent> {
        &self.events
    }
}

/// A connected pair of links.
pub fn link() -> (EngineLink, OracleLink) {
    let (feedback_tx, feedback_rx) = cb::unbounded();
    let (stop_tx, stop_rx) = cb::bounded(1);
    let (events_tx, events_rx) = cb::unbounded();
    (
        EngineLink {
            feedback: feedback_rx,
            stop: stop_rx,
            events: events_tx,
            stopped: Cell::new(false),
        },
        OracleLink {
            feedback: feedback_tx,
            stop: stop_tx,
            events: events_rx,
        },
    )
}
