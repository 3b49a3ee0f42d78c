//! Probability propagation over a backward slice.
//!
//! Every slice step contributes one factor: the product of the rules that
//! apply to it, over the step's case bits. Factors exchange beliefs through
//! shared nodes (a value written by one step and read by another, a branch
//! decision shared by every step it controls) until the beliefs settle.
//!
//! Updates are synchronous: all factor messages of an iteration are computed
//! from the previous iteration's beliefs, then every free node is updated
//! with damping. Labeled nodes keep their boundary value throughout.

use crate::belief::{BeliefNode, Beliefs, Labels, ValueSite, NEUTRAL_PRIOR};
use crate::config::PropagationConfig;
use crate::constraint::{CaseBits, CaseLayout, ConstraintError, RuleSet};
use crate::error::EngineError;
use faultline_core::{StepOrder, Trace};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Beliefs never get closer to 0 or 1 than this inside the computation.
const EPSILON: f64 = 1e-6;

fn clamp(p: f64) -> f64 {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

/// One step's rules, tabulated over all of its cases.
struct Factor {
    step: StepOrder,
    /// The node behind each case bit.
    nodes: Vec<BeliefNode>,
    /// Product of every rule's probability, indexed by raw case bits.
    table: Vec<f64>,
}

impl Factor {
    /// Extrinsic message to every bit: the probability that the bit is
    /// correct given the rules and every other bit's current belief.
    fn messages(&self, belief: &impl Fn(&BeliefNode) -> f64) -> Vec<f64> {
        let q: Vec<f64> = self.nodes.iter().map(|n| clamp(belief(n))).collect();
        let mut correct = vec![0.0; q.len()];
        let mut wrong = vec![0.0; q.len()];
        for case in CaseBits::all(q.len()) {
            let mut joint = self.table[case.raw() as usize];
            for (i, qi) in q.iter().enumerate() {
                joint *= if case.get(i) { *qi } else { 1.0 - qi };
            }
            for (i, qi) in q.iter().enumerate() {
                if case.get(i) {
                    correct[i] += joint / qi;
                } else {
                    wrong[i] += joint / (1.0 - qi);
                }
            }
        }
        correct
            .into_iter()
            .zip(wrong)
            .map(|(c, w)| if c + w > 0.0 { c / (c + w) } else { NEUTRAL_PRIOR })
            .collect()
    }
}

pub struct Propagator<'t> {
    trace: &'t Trace,
    config: PropagationConfig,
    rules: RuleSet,
}

impl<'t> Propagator<'t> {
    pub fn new(trace: &'t Trace, config: &PropagationConfig, rules: RuleSet) -> Self {
        Self {
            trace,
            config: config.clone(),
            rules,
        }
    }

    /// Propagator with the rules enabled in `config`.
    pub fn from_config(trace: &'t Trace, config: &PropagationConfig) -> Self {
        Self::new(trace, config, RuleSet::from_config(config))
    }

    fn build_factors(&self, slice: &[StepOrder]) -> Result<Vec<Factor>, EngineError> {
        let mut factors = Vec::new();
        for &order in slice {
            let step = self.trace.require(order)?;
            let constraints = match self.rules.constraints_for(step) {
                Ok(c) => c,
                Err(err @ ConstraintError::TooManyCaseBits { .. }) => {
                    warn!("{}; keeping the neutral prior", err);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if constraints.is_empty() {
                continue;
            }

            let layout = CaseLayout::for_step(step);
            let mut nodes: Vec<BeliefNode> = layout
                .reads()
                .iter()
                .map(|var| BeliefNode::Value(ValueSite::read_at(self.trace, order, var)))
                .collect();
            nodes.extend(
                layout
                    .writes()
                    .iter()
                    .map(|var| BeliefNode::Value(ValueSite::new(Some(order), var.clone()))),
            );
            if let Some(dom) = layout.control_dominator() {
                nodes.push(BeliefNode::control_of(self.trace, dom));
            }
            nodes.push(BeliefNode::Step(order));

            let table = CaseBits::all(layout.bit_count())
                .map(|case| constraints.iter().map(|c| c.probability(case)).product())
                .collect();
            factors.push(Factor {
                step: order,
                nodes,
                table,
            });
        }
        Ok(factors)
    }

    /// Compute beliefs for every step of `slice` and every value its steps
    /// read or write.
    pub fn propagate(&self, slice: &[StepOrder], labels: &Labels) -> Result<Beliefs, EngineError> {
        let started = Instant::now();
        let factors = self.build_factors(slice)?;

        let mut nodes: BTreeSet<BeliefNode> = slice.iter().map(|s| BeliefNode::Step(*s)).collect();
        for factor in &factors {
            nodes.extend(factor.nodes.iter().cloned());
        }
        nodes.extend(labels.iter().map(|(node, _)| node.clone()));

        let mut belief: HashMap<BeliefNode, f64> = nodes
            .iter()
            .map(|node| {
                let value = match labels.get(node) {
                    Some(true) => 1.0,
                    Some(false) => 0.0,
                    None => NEUTRAL_PRIOR,
                };
                (node.clone(), value)
            })
            .collect();

        let mut iterations = 0;
        let mut converged = factors.is_empty();
        while !converged && iterations < self.config.max_iterations {
            iterations += 1;
            let lookup = |node: &BeliefNode| belief.get(node).copied().unwrap_or(NEUTRAL_PRIOR);

            let mut odds: HashMap<&BeliefNode, f64> = HashMap::new();
            for factor in &factors {
                for (node, message) in factor.nodes.iter().zip(factor.messages(&lookup)) {
                    if labels.is_fixed(node) {
                        continue;
                    }
                    let m = clamp(message);
                    *odds.entry(node).or_insert(1.0) *= m / (1.0 - m);
                }
            }

            let mut delta: f64 = 0.0;
            let mut updated = Vec::with_capacity(odds.len());
            for (node, o) in odds {
                let fresh = clamp(o / (1.0 + o));
                let old = lookup(node);
                let next = self.config.damping * old + (1.0 - self.config.damping) * fresh;
                delta = delta.max((next - old).abs());
                updated.push((node.clone(), next));
            }
            belief.extend(updated);

            debug!(iteration = iterations, delta, "propagation iteration");
            converged = delta < self.config.tolerance;
        }

        let mut out = Beliefs::new();
        for (node, value) in belief {
            match node {
                BeliefNode::Step(order) => out.set_step(order, value),
                BeliefNode::Value(site) => out.set_value(site, value),
            }
        }
        info!(
            steps = slice.len(),
            factors = factors.len(),
            iterations,
            converged,
            elapsed_us = started.elapsed().as_micros() as u64,
            "propagation finished"
        );
        if !converged {
            warn!(
                max_iterations = self.config.max_iterations,
                "propagation stopped before converging"
            );
        }
        debug!(
            factor_steps = ?factors.iter().map(|f| f.step.get()).collect::<Vec<_>>(),
            "factors built"
        );
        Ok(out.finish(iterations, converged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackEdge, UserFeedback};
    use faultline_core::{TraceStep, VarId, VariableValue};

    /// 1: x = input        (reads n, writes x)
    /// 2: y = x * 2        (reads x, writes y)
    /// 3: print(y)         (reads y)
    fn chain() -> Trace {
        Trace::from_steps(vec![
            TraceStep::new(1)
                .reading(VariableValue::new("n"))
                .writing(VariableValue::new("x")),
            TraceStep::new(2)
                .reading(VariableValue::new("x"))
                .writing(VariableValue::new("y")),
            TraceStep::new(3).reading(VariableValue::new("y")),
        ])
        .unwrap()
    }

    fn slice(t: &Trace) -> Vec<StepOrder> {
        t.backward_slice(StepOrder(3)).unwrap()
    }

    fn labels_for(t: &Trace) -> Labels {
        let mut labels = Labels::new();
        labels.mark_input(&VarId::from("n"));
        labels
            .apply_feedback(t, &FeedbackEdge::new(StepOrder(3), UserFeedback::wrong_var("y")))
            .unwrap();
        labels
    }

    #[test]
    fn labeled_nodes_keep_boundary_values() {
        let t = chain();
        let beliefs = Propagator::from_config(&t, &PropagationConfig::default())
            .propagate(&slice(&t), &labels_for(&t))
            .unwrap();
        assert_eq!(beliefs.value(&ValueSite::new(None, "n")), 1.0);
        assert_eq!(beliefs.value(&ValueSite::new(Some(StepOrder(2)), "y")), 0.0);
        assert!(beliefs.converged());
        assert!(beliefs.iterations() >= 1);
    }

    #[test]
    fn beliefs_stay_in_unit_interval() {
        let t = chain();
        let beliefs = Propagator::from_config(&t, &PropagationConfig::default())
            .propagate(&slice(&t), &labels_for(&t))
            .unwrap();
        assert_eq!(beliefs.steps().len(), 3);
        for p in beliefs.steps().values().chain(beliefs.values().values()) {
            assert!((0.0..=1.0).contains(p));
        }
    }

    #[test]
    fn wrong_value_from_correct_inputs_blames_its_producer() {
        let t = chain();
        let mut labels = labels_for(&t);
        labels
            .apply_feedback(&t, &FeedbackEdge::new(StepOrder(2), UserFeedback::wrong_var("x")))
            .unwrap();
        let beliefs = Propagator::from_config(&t, &PropagationConfig::default())
            .propagate(&slice(&t), &labels)
            .unwrap();
        // n is a correct input and x is wrong: rule A1 blames step 1.
        assert!(beliefs.step(StepOrder(1)) < 0.1);
        let lowest = beliefs
            .steps()
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(s, _)| *s)
            .unwrap();
        assert_eq!(lowest, StepOrder(1));
    }

    #[test]
    fn step_without_rules_keeps_neutral_prior() {
        let t = Trace::from_steps(vec![TraceStep::new(1)]).unwrap();
        let beliefs = Propagator::from_config(&t, &PropagationConfig::default())
            .propagate(&[StepOrder(1)], &Labels::new())
            .unwrap();
        assert_eq!(beliefs.step(StepOrder(1)), NEUTRAL_PRIOR);
        assert_eq!(beliefs.iterations(), 0);
    }

    #[test]
    fn oversized_steps_fall_back_to_prior() {
        let t = chain();
        let config = PropagationConfig {
            max_case_bits: 2,
            ..PropagationConfig::default()
        };
        let beliefs = Propagator::from_config(&t, &config)
            .propagate(&slice(&t), &Labels::new())
            .unwrap();
        // Steps 1 and 2 need three bits each; step 3 needs two.
        assert_eq!(beliefs.step(StepOrder(1)), NEUTRAL_PRIOR);
        assert_eq!(beliefs.step(StepOrder(2)), NEUTRAL_PRIOR);
    }

    #[test]
    fn correct_feedback_raises_neighbours() {
        let t = chain();
        let mut labels = labels_for(&t);
        labels
            .apply_feedback(&t, &FeedbackEdge::new(StepOrder(1), UserFeedback::Correct))
            .unwrap();
        let beliefs = Propagator::from_config(&t, &PropagationConfig::default())
            .propagate(&slice(&t), &labels)
            .unwrap();
        assert_eq!(beliefs.step(StepOrder(1)), 1.0);
        // x is correct and y is wrong: rule A1 blames step 2.
        assert!(beliefs.step(StepOrder(2)) < 0.1);
    }

    #[test]
    fn unknown_slice_step_is_an_error() {
        let t = chain();
        let result = Propagator::from_config(&t, &PropagationConfig::default())
            .propagate(&[StepOrder(42)], &Labels::new());
        assert!(matches!(result, Err(EngineError::Trace(_))));
    }
}
