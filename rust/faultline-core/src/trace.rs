//! The trace arena: every recorded step, indexed by execution order.
//!
//! [`Trace`] owns the steps in ascending order and answers the dependency
//! questions the engine asks: who produced the value a step read, which step
//! controls a step, and what the backward slice from a step looks like.

use crate::step::{StepOrder, TraceStep, VarId, VariableValue};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace is empty")]
    Empty,
    #[error("duplicate execution order {0}")]
    DuplicateOrder(StepOrder),
    #[error("step {0} does not exist in the trace")]
    UnknownStep(StepOrder),
    #[error("step {step} names control dominator {dominator}, which is not an earlier step")]
    BadDominator {
        step: StepOrder,
        dominator: StepOrder,
    },
    #[error("variable '{0}' is not touched by any step")]
    UnknownVariable(VarId),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid trace file: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Immutable, order-indexed collection of trace steps.
#[derive(Debug, Clone)]
pub struct Trace {
    steps: Vec<TraceStep>,
    /// Ascending orders of the steps writing each variable.
    writers: HashMap<VarId, Vec<StepOrder>>,
}

impl Trace {
    /// Build a trace from recorded steps.
    ///
    /// Steps may arrive in any order. Missing step-in chain links are filled
    /// in from the execution order; step-over links default to the step-in
    /// links when the recorder did not provide them.
    pub fn from_steps(mut steps: Vec<TraceStep>) -> Result<Self, TraceError> {
        if steps.is_empty() {
            return Err(TraceError::Empty);
        }
        steps.sort_by_key(|s| s.order);
        for pair in steps.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(TraceError::DuplicateOrder(pair[1].order));
            }
        }

        let orders: HashSet<StepOrder> = steps.iter().map(|s| s.order).collect();
        for step in &steps {
            if let Some(dom) = step.control_dominator {
                if dom >= step.order || !orders.contains(&dom) {
                    return Err(TraceError::BadDominator {
                        step: step.order,
                        dominator: dom,
                    });
                }
            }
        }

        let len = steps.len();
        for i in 0..len {
            let prev = if i > 0 { Some(steps[i - 1].order) } else { None };
            let next = steps.get(i + 1).map(|s| s.order);
            let step = &mut steps[i];
            if step.step_in_previous.is_none() {
                step.step_in_previous = prev;
            }
            if step.step_in_next.is_none() {
                step.step_in_next = next;
            }
            if step.step_over_previous.is_none() {
                step.step_over_previous = step.step_in_previous;
            }
            if step.step_over_next.is_none() {
                step.step_over_next = step.step_in_next;
            }
        }

        let mut writers: HashMap<VarId, Vec<StepOrder>> = HashMap::new();
        for step in &steps {
            for w in &step.writes {
                let list = writers.entry(w.id.clone()).or_default();
                if list.last() != Some(&step.order) {
                    list.push(step.order);
                }
            }
        }

        Ok(Self { steps, writers })
    }

    // -- Lookup -------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in ascending execution order.
    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn step(&self, order: StepOrder) -> Option<&TraceStep> {
        self.steps
            .binary_search_by_key(&order, |s| s.order)
            .ok()
            .map(|idx| &self.steps[idx])
    }

    /// Like [`Trace::step`] but reports a missing step as an error.
    pub fn require(&self, order: StepOrder) -> Result<&TraceStep, TraceError> {
        self.step(order).ok_or(TraceError::UnknownStep(order))
    }

    pub fn last(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    // -- Dependencies -------------------------------------------------------

    /// The step that produced the value of `var` read at `order`: the latest
    /// earlier step writing `var`. `None` means the value is a trace input.
    pub fn data_dependency(&self, order: StepOrder, var: &VarId) -> Option<StepOrder> {
        let writers = self.writers.get(var)?;
        let idx = writers.partition_point(|w| *w < order);
        if idx == 0 {
            None
        } else {
            Some(writers[idx - 1])
        }
    }

    pub fn control_dominator(&self, order: StepOrder) -> Option<&TraceStep> {
        self.step(order)
            .and_then(|s| s.control_dominator)
            .and_then(|dom| self.step(dom))
    }

    /// The condition-result value written by the branching step `order`.
    pub fn control_result(&self, order: StepOrder) -> Option<&VariableValue> {
        self.step(order).and_then(|s| s.control_result())
    }

    /// Latest step that reads or writes `var`; used to locate the output step
    /// when only the wrong output variable is known.
    pub fn last_touching(&self, var: &VarId) -> Option<StepOrder> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.reads_var(var) || s.writes_var(var))
            .map(|s| s.order)
    }

    /// Steps whose order lies strictly between `start` and `end`.
    pub fn between(&self, start: StepOrder, end: StepOrder) -> Vec<&TraceStep> {
        self.steps
            .iter()
            .filter(|s| s.order > start && s.order < end)
            .collect()
    }

    // -- Slicing ------------------------------------------------------------

    /// Backward dynamic slice from `order`: every step reachable through
    /// data dependencies of read variables and control dominators, including
    /// `order` itself. Returned in ascending execution order.
    pub fn backward_slice(&self, order: StepOrder) -> Result<Vec<StepOrder>, TraceError> {
        self.require(order)?;
        let mut visited: BTreeSet<StepOrder> = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(order);
        queue.push_back(order);

        while let Some(current) = queue.pop_front() {
            let step = self.require(current)?;
            let producers = step
                .reads
                .iter()
                .filter_map(|r| self.data_dependency(current, &r.id));
            for next in producers.chain(step.control_dominator) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        Ok(visited.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
