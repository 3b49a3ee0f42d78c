//! Feedback paths from the wrong output to a candidate root cause.
//!
//! The dependency graph has one vertex per slice step. Every read of a step
//! becomes an edge to the producing step, labeled with the feedback "this
//! value is wrong" and weighted by the value's correctness belief; every
//! control dependency becomes an edge to the dominator labeled "wrong path"
//! and weighted by the branch decision's belief. The cheapest path therefore
//! runs through the values most likely to be wrong.

use crate::belief::Beliefs;
use crate::feedback::{FeedbackEdge, FeedbackPath, UserFeedback};
use crate::graph::{GraphError, NodeId, WeightedGraph};
use faultline_core::{StepOrder, Trace};
use std::collections::{BinaryHeap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathFinderError {
    #[error("cannot build a dependency graph from an empty slice")]
    EmptySlice,
    #[error(
        "dependency graph built from step {step} has {built} vertices but the slice has {expected}"
    )]
    SliceMismatch {
        step: StepOrder,
        built: usize,
        expected: usize,
    },
    #[error("no path from step {start} to step {end}")]
    NoPath { start: StepOrder, end: StepOrder },
    #[error("step {step}: invalid edge weight {weight}")]
    InvalidWeight { step: StepOrder, weight: f64 },
    #[error("step {0} is not in the dependency graph")]
    UnknownStep(StepOrder),
}

/// Label of one dependency edge.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEdge {
    pub from: StepOrder,
    pub to: StepOrder,
    pub feedback: UserFeedback,
}

/// A shortest path and its total weight.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundPath {
    pub path: FeedbackPath,
    pub weight: f64,
}

#[derive(Debug)]
pub struct PathFinder {
    graph: WeightedGraph<StepOrder, DependencyEdge>,
}

impl PathFinder {
    /// Build the dependency graph over `slice`, expanding backward from its
    /// latest step. Every slice step must be reached exactly once.
    pub fn build(
        trace: &Trace,
        slice: &[StepOrder],
        beliefs: &Beliefs,
    ) -> Result<Self, PathFinderError> {
        let last = slice
            .iter()
            .copied()
            .max()
            .ok_or(PathFinderError::EmptySlice)?;
        let mut graph: WeightedGraph<StepOrder, DependencyEdge> = WeightedGraph::new();
        let mut seen: HashSet<StepOrder> = HashSet::new();
        let mut queue: BinaryHeap<StepOrder> = BinaryHeap::new();
        seen.insert(last);
        queue.push(last);

        while let Some(order) = queue.pop() {
            let step = trace
                .step(order)
                .ok_or(PathFinderError::UnknownStep(order))?;
            let node = graph.add_node(order);

            let mut targets: Vec<(StepOrder, UserFeedback, f64)> = Vec::new();
            for read in &step.reads {
                if let Some(producer) = trace.data_dependency(order, &read.id) {
                    let weight = beliefs.read_probability(trace, order, &read.id);
                    targets.push((
                        producer,
                        UserFeedback::WrongVariableValue {
                            var: read.id.clone(),
                        },
                        weight,
                    ));
                }
            }
            if let Some(dom) = step.control_dominator {
                let weight = beliefs
                    .control_probability(trace, order)
                    .unwrap_or_else(|| beliefs.step(dom));
                targets.push((dom, UserFeedback::WrongPath, weight));
            }

            for (target, feedback, weight) in targets {
                let to = graph.add_node(target);
                add_edge(&mut graph, node, to, weight, order, target, feedback)?;
                if seen.insert(target) {
                    queue.push(target);
                }
            }
        }

        if graph.node_count() != slice.len() {
            return Err(PathFinderError::SliceMismatch {
                step: last,
                built: graph.node_count(),
                expected: slice.len(),
            });
        }
        debug!(
            vertices = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph built"
        );
        Ok(Self { graph })
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn node(&self, order: StepOrder) -> Result<NodeId, PathFinderError> {
        self.graph
            .find_node(&order)
            .ok_or(PathFinderError::UnknownStep(order))
    }

    /// The minimum-weight feedback path from `start` to `end`, closed by a
    /// root-cause edge on `end`.
    pub fn find_path(&self, start: StepOrder, end: StepOrder) -> Result<FoundPath, PathFinderError> {
        let from = self.node(start)?;
        if start == end {
            return Ok(FoundPath {
                path: FeedbackPath::from_edges(vec![FeedbackEdge::new(
                    end,
                    UserFeedback::RootCause,
                )]),
                weight: 0.0,
            });
        }
        let to = self.node(end)?;
        let (edges, weight) = self
            .graph
            .dijkstra(from, to)
            .ok_or(PathFinderError::NoPath { start, end })?;

        let mut path = FeedbackPath::new();
        for eid in edges {
            if let Some(dep) = self.graph.edge_data(eid) {
                path.push(FeedbackEdge::new(dep.from, dep.feedback.clone()));
            }
        }
        path.push(FeedbackEdge::new(end, UserFeedback::RootCause));
        debug!(%start, %end, weight, "shortest feedback path");
        Ok(FoundPath { path, weight })
    }
}

fn add_edge(
    graph: &mut WeightedGraph<StepOrder, DependencyEdge>,
    from_node: NodeId,
    to_node: NodeId,
    weight: f64,
    from: StepOrder,
    to: StepOrder,
    feedback: UserFeedback,
) -> Result<(), PathFinderError> {
    graph
        .add_edge(from_node, to_node, weight, DependencyEdge { from, to, feedback })
        .map(|_| ())
        .map_err(|err| match err {
            GraphError::InvalidWeight(weight) => PathFinderError::InvalidWeight { step: from, weight },
            GraphError::UnknownNode(_) => PathFinderError::UnknownStep(from),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::ValueSite;
    use faultline_core::{TraceStep, VariableValue};

    /// 1: branch            (writes c1)
    /// 2: branch            (writes c2)
    /// 3: x = ..            (writes x, dominated by 1)
    /// 4: unrelated
    /// 5: print(x)          (reads x, dominated by 2)
    fn trace() -> Trace {
        Trace::from_steps(vec![
            TraceStep::new(1).writing(VariableValue::control_result("c1")),
            TraceStep::new(2).writing(VariableValue::control_result("c2")),
            TraceStep::new(3).writing(VariableValue::new("x")).dominated_by(1),
            TraceStep::new(4).writing(VariableValue::new("z")),
            TraceStep::new(5).reading(VariableValue::new("x")).dominated_by(2),
        ])
        .unwrap()
    }

    fn beliefs(w: f64) -> Beliefs {
        let mut b = Beliefs::new();
        b.set_value(ValueSite::new(Some(StepOrder(3)), "x"), 0.2);
        b.set_value(ValueSite::new(Some(StepOrder(2)), "c2"), 0.9);
        b.set_value(ValueSite::new(Some(StepOrder(1)), "c1"), w);
        b
    }

    fn orders(v: &[u32]) -> Vec<StepOrder> {
        v.iter().copied().map(StepOrder).collect()
    }

    #[test]
    fn vertex_count_matches_slice() {
        let t = trace();
        let slice = t.backward_slice(StepOrder(5)).unwrap();
        assert_eq!(slice, orders(&[1, 2, 3, 5]));
        let finder = PathFinder::build(&t, &slice, &beliefs(0.3)).unwrap();
        assert_eq!(finder.vertex_count(), slice.len());
        assert_eq!(finder.edge_count(), 3);
    }

    #[test]
    fn path_follows_the_least_likely_values() {
        let t = trace();
        let slice = t.backward_slice(StepOrder(5)).unwrap();
        let finder = PathFinder::build(&t, &slice, &beliefs(0.3)).unwrap();
        let found = finder.find_path(StepOrder(5), StepOrder(1)).unwrap();
        assert_eq!(found.path.steps(), orders(&[5, 3, 1]));
        assert_eq!(found.path.get(0).unwrap().primary(), &UserFeedback::wrong_var("x"));
        assert_eq!(found.path.get(1).unwrap().primary(), &UserFeedback::WrongPath);
        assert_eq!(found.path.last().unwrap().primary(), &UserFeedback::RootCause);
        assert!((found.weight - 0.5).abs() < 1e-12);
    }

    #[test]
    fn start_equals_end_is_a_single_root_cause_edge() {
        let t = trace();
        let slice = t.backward_slice(StepOrder(5)).unwrap();
        let finder = PathFinder::build(&t, &slice, &beliefs(0.3)).unwrap();
        let found = finder.find_path(StepOrder(5), StepOrder(5)).unwrap();
        assert_eq!(found.path.len(), 1);
        assert_eq!(found.path.get(0).unwrap().kind(), crate::feedback::FeedbackKind::RootCause);
        assert_eq!(found.weight, 0.0);
    }

    #[test]
    fn unreachable_end_is_fatal() {
        let t = trace();
        let slice = t.backward_slice(StepOrder(5)).unwrap();
        let finder = PathFinder::build(&t, &slice, &beliefs(0.3)).unwrap();
        let err = finder.find_path(StepOrder(3), StepOrder(2)).unwrap_err();
        assert_eq!(
            err,
            PathFinderError::NoPath {
                start: StepOrder(3),
                end: StepOrder(2)
            }
        );
        assert!(err.to_string().contains("step 3"));
    }

    #[test]
    fn slice_with_foreign_step_is_a_mismatch() {
        let t = trace();
        let err = PathFinder::build(&t, &orders(&[1, 2, 3, 4, 5]), &beliefs(0.3)).unwrap_err();
        assert!(matches!(
            err,
            PathFinderError::SliceMismatch {
                built: 4,
                expected: 5,
                ..
            }
        ));
    }

    #[test]
    fn empty_slice_is_rejected() {
        let t = trace();
        assert_eq!(
            PathFinder::build(&t, &[], &Beliefs::new()).unwrap_err(),
            PathFinderError::EmptySlice
        );
    }

    #[test]
    fn step_outside_graph_is_reported() {
        let t = trace();
        let slice = t.backward_slice(StepOrder(5)).unwrap();
        let finder = PathFinder::build(&t, &slice, &beliefs(0.3)).unwrap();
        assert_eq!(
            finder.find_path(StepOrder(5), StepOrder(4)).unwrap_err(),
            PathFinderError::UnknownStep(StepOrder(4))
        );
    }
}
