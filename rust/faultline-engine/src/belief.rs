//! Correctness beliefs over steps and variable values.
//!
//! Beliefs live in engine-owned tables keyed by [`BeliefNode`] instead of on
//! the trace steps themselves, so the trace stays immutable while a session
//! revises probabilities round after round.

use crate::feedback::{FeedbackEdge, UserFeedback};
use faultline_core::{StepOrder, Trace, TraceError, VarId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Belief of a node no rule says anything about.
pub const NEUTRAL_PRIOR: f64 = 0.5;

/// A value instance: variable `var` as written by `writer`. `writer == None`
/// is the value a trace input carried before the first write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValueSite {
    pub writer: Option<StepOrder>,
    pub var: VarId,
}

impl ValueSite {
    pub fn new(writer: Option<StepOrder>, var: impl Into<VarId>) -> Self {
        Self {
            writer,
            var: var.into(),
        }
    }

    /// The value of `var` observed by a read at `reader`.
    pub fn read_at(trace: &Trace, reader: StepOrder, var: &VarId) -> Self {
        Self {
            writer: trace.data_dependency(reader, var),
            var: var.clone(),
        }
    }
}

/// Anything that carries a correctness belief.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BeliefNode {
    Step(StepOrder),
    Value(ValueSite),
}

impl BeliefNode {
    /// The node standing for the branch decision of `dominator`: its
    /// condition-result value when the recorder captured one, the step itself
    /// otherwise.
    pub fn control_of(trace: &Trace, dominator: StepOrder) -> Self {
        match trace.control_result(dominator) {
            Some(result) => BeliefNode::Value(ValueSite::new(Some(dominator), result.id.clone())),
            None => BeliefNode::Step(dominator),
        }
    }
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Boundary conditions: nodes whose correctness is known and never revised
/// by propagation.
#[derive(Debug, Clone, Default)]
pub struct Labels {
    fixed: HashMap<BeliefNode, bool>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_correct(&mut self, node: BeliefNode) {
        self.fixed.insert(node, true);
    }

    pub fn mark_wrong(&mut self, node: BeliefNode) {
        self.fixed.insert(node, false);
    }

    /// A trace input: the value `var` held before any step wrote it.
    pub fn mark_input(&mut self, var: &VarId) {
        self.mark_correct(BeliefNode::Value(ValueSite::new(None, var.clone())));
    }

    pub fn get(&self, node: &BeliefNode) -> Option<bool> {
        self.fixed.get(node).copied()
    }

    pub fn is_fixed(&self, node: &BeliefNode) -> bool {
        self.fixed.contains_key(node)
    }

    pub fn is_fixed_step(&self, order: StepOrder) -> bool {
        self.is_fixed(&BeliefNode::Step(order))
    }

    pub fn len(&self) -> usize {
        self.fixed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BeliefNode, bool)> {
        self.fixed.iter().map(|(node, v)| (node, *v))
    }

    /// Fold one feedback edge into the labels. Later feedback on the same
    /// node overrides earlier feedback.
    pub fn apply_feedback(&mut self, trace: &Trace, edge: &FeedbackEdge) -> Result<(), TraceError> {
        let step = trace.require(edge.step)?;
        for feedback in &edge.feedbacks {
            match feedback {
                UserFeedback::Correct => {
                    self.mark_correct(BeliefNode::Step(step.order));
                    for read in &step.reads {
                        self.mark_correct(BeliefNode::Value(ValueSite::read_at(
                            trace, step.order, &read.id,
                        )));
                    }
                    for write in &step.writes {
                        self.mark_correct(BeliefNode::Value(ValueSite::new(
                            Some(step.order),
                            write.id.clone(),
                        )));
                    }
                }
                UserFeedback::WrongVariableValue { var } => {
                    self.mark_wrong(BeliefNode::Value(ValueSite::read_at(trace, step.order, var)));
                }
                UserFeedback::WrongPath => {
                    if let Some(dom) = step.control_dominator {
                        self.mark_wrong(BeliefNode::control_of(trace, dom));
                    }
                }
                UserFeedback::RootCause => self.mark_wrong(BeliefNode::Step(step.order)),
                UserFeedback::Unclear => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Beliefs
// ---------------------------------------------------------------------------

/// Result of one propagation run.
#[derive(Debug, Clone, Default)]
pub struct Beliefs {
    steps: BTreeMap<StepOrder, f64>,
    values: HashMap<ValueSite, f64>,
    iterations: usize,
    converged: bool,
}

impl Beliefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn finish(mut self, iterations: usize, converged: bool) -> Self {
        self.iterations = iterations;
        self.converged = converged;
        self
    }

    pub fn set_step(&mut self, order: StepOrder, probability: f64) {
        self.steps.insert(order, probability);
    }

    pub fn set_value(&mut self, site: ValueSite, probability: f64) {
        self.values.insert(site, probability);
    }

    pub fn step(&self, order: StepOrder) -> f64 {
        self.steps.get(&order).copied().unwrap_or(NEUTRAL_PRIOR)
    }

    pub fn value(&self, site: &ValueSite) -> f64 {
        self.values.get(site).copied().unwrap_or(NEUTRAL_PRIOR)
    }

    pub fn node(&self, node: &BeliefNode) -> f64 {
        match node {
            BeliefNode::Step(order) => self.step(*order),
            BeliefNode::Value(site) => self.value(site),
        }
    }

    /// Correctness of the value of `var` read by `reader`.
    pub fn read_probability(&self, trace: &Trace, reader: StepOrder, var: &VarId) -> f64 {
        self.value(&ValueSite::read_at(trace, reader, var))
    }

    /// Correctness of the branch decision controlling `order`, if it has a
    /// control dominator.
    pub fn control_probability(&self, trace: &Trace, order: StepOrder) -> Option<f64> {
        let dom = trace.step(order)?.control_dominator?;
        Some(self.node(&BeliefNode::control_of(trace, dom)))
    }

    /// Step probabilities in ascending execution order.
    pub fn steps(&self) -> &BTreeMap<StepOrder, f64> {
        &self.steps
    }

    pub fn values(&self) -> &HashMap<ValueSite, f64> {
        &self.values
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{TraceStep, VariableValue};

    fn trace() -> Trace {
        Trace::from_steps(vec![
            TraceStep::new(1).writing(VariableValue::new("x")),
            TraceStep::new(2)
                .reading(VariableValue::new("x"))
                .writing(VariableValue::control_result("c2")),
            TraceStep::new(3)
                .reading(VariableValue::new("x"))
                .writing(VariableValue::new("y"))
                .dominated_by(2),
            TraceStep::new(4).reading(VariableValue::new("y")).dominated_by(1),
        ])
        .unwrap()
    }

    #[test]
    fn control_node_prefers_condition_result() {
        let t = trace();
        assert_eq!(
            BeliefNode::control_of(&t, StepOrder(2)),
            BeliefNode::Value(ValueSite::new(Some(StepOrder(2)), "c2"))
        );
        assert_eq!(
            BeliefNode::control_of(&t, StepOrder(1)),
            BeliefNode::Step(StepOrder(1))
        );
    }

    #[test]
    fn correct_feedback_labels_step_and_its_values() {
        let t = trace();
        let mut labels = Labels::new();
        labels
            .apply_feedback(&t, &FeedbackEdge::new(StepOrder(3), UserFeedback::Correct))
            .unwrap();
        assert!(labels.is_fixed_step(StepOrder(3)));
        assert_eq!(
            labels.get(&BeliefNode::Value(ValueSite::new(Some(StepOrder(1)), "x"))),
            Some(true)
        );
        assert_eq!(
            labels.get(&BeliefNode::Value(ValueSite::new(Some(StepOrder(3)), "y"))),
            Some(true)
        );
    }

    #[test]
    fn wrong_value_labels_the_read_site() {
        let t = trace();
        let mut labels = Labels::new();
        labels
            .apply_feedback(&t, &FeedbackEdge::new(StepOrder(4), UserFeedback::wrong_var("y")))
            .unwrap();
        assert_eq!(
            labels.get(&BeliefNode::Value(ValueSite::new(Some(StepOrder(3)), "y"))),
            Some(false)
        );
        assert!(!labels.is_fixed_step(StepOrder(4)));
    }

    #[test]
    fn wrong_path_labels_the_dominator_branch() {
        let t = trace();
        let mut labels = Labels::new();
        labels
            .apply_feedback(&t, &FeedbackEdge::new(StepOrder(3), UserFeedback::WrongPath))
            .unwrap();
        assert_eq!(
            labels.get(&BeliefNode::Value(ValueSite::new(Some(StepOrder(2)), "c2"))),
            Some(false)
        );
    }

    #[test]
    fn later_feedback_overrides_earlier() {
        let t = trace();
        let mut labels = Labels::new();
        labels
            .apply_feedback(&t, &FeedbackEdge::new(StepOrder(1), UserFeedback::RootCause))
            .unwrap();
        labels
            .apply_feedback(&t, &FeedbackEdge::new(StepOrder(1), UserFeedback::Correct))
            .unwrap();
        assert_eq!(labels.get(&BeliefNode::Step(StepOrder(1))), Some(true));
    }

    #[test]
    fn feedback_on_unknown_step_fails() {
        let t = trace();
        let mut labels = Labels::new();
        assert!(labels
            .apply_feedback(&t, &FeedbackEdge::new(StepOrder(9), UserFeedback::Unclear))
            .is_err());
    }

    #[test]
    fn beliefs_default_to_neutral() {
        let t = trace();
        let mut b = Beliefs::new();
        assert_eq!(b.step(StepOrder(1)), NEUTRAL_PRIOR);
        b.set_value(ValueSite::new(Some(StepOrder(1)), "x"), 0.2);
        assert_eq!(b.read_probability(&t, StepOrder(3), &VarId::from("x")), 0.2);
        assert_eq!(b.control_probability(&t, StepOrder(1)), None);
        assert_eq!(b.control_probability(&t, StepOrder(3)), Some(NEUTRAL_PRIOR));
    }
}
