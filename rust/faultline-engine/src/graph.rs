//! Directed weighted multigraph with keyed nodes.
//!
//! Nodes are deduplicated by key; parallel edges between the same pair of
//! nodes are kept apart, each with its own data and weight. Weights must be
//! non-negative, which is what [`WeightedGraph::dijkstra`] relies on.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

// ---------------------------------------------------------------------------
// Typed IDs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("edge weight {0} is negative or not a number")]
    InvalidWeight(f64),
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct EdgeEntry<E> {
    from: NodeId,
    to: NodeId,
    weight: f64,
    data: E,
}

#[derive(Debug, Clone)]
pub struct WeightedGraph<K, E> {
    keys: Vec<K>,
    index: HashMap<K, NodeId>,
    edges: Vec<EdgeEntry<E>>,
    outgoing: Vec<Vec<EdgeId>>,
}

impl<K: Clone + Eq + Hash, E> Default for WeightedGraph<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash, E> WeightedGraph<K, E> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    // -- Nodes --------------------------------------------------------------

    /// Add a node for `key`, or return the existing one.
    pub fn add_node(&mut self, key: K) -> NodeId {
        if let Some(&existing) = self.index.get(&key) {
            return existing;
        }
        let id = NodeId(self.keys.len());
        self.keys.push(key.clone());
        self.index.insert(key, id);
        self.outgoing.push(Vec::new());
        id
    }

    pub fn find_node(&self, key: &K) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn node_count(&self) -> usize {
        self.keys.len()
    }

    // -- Edges --------------------------------------------------------------

    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        weight: f64,
        data: E,
    ) -> Result<EdgeId, GraphError> {
        for id in [from, to] {
            if id.0 >= self.keys.len() {
                return Err(GraphError::UnknownNode(id));
            }
        }
        if weight.is_nan() || weight < 0.0 {
            return Err(GraphError::InvalidWeight(weight));
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(EdgeEntry {
            from,
            to,
            weight,
            data,
        });
        self.outgoing[from.0].push(id);
        Ok(id)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_data(&self, id: EdgeId) -> Option<&E> {
        self.edges.get(id.0).map(|e| &e.data)
    }

    pub fn outgoing(&self, id: NodeId) -> &[EdgeId] {
        self.outgoing.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    // -- Algorithms ---------------------------------------------------------

    /// Minimum-weight path from `from` to `to`.
    ///
    /// Returns the edges in walk order with the total weight, or `None` when
    /// `to` is unreachable. Equal-distance entries are settled in node id
    /// order so the result is deterministic.
    pub fn dijkstra(&self, from: NodeId, to: NodeId) -> Option<(Vec<EdgeId>, f64)> {
        if from.0 >= self.keys.len() || to.0 >= self.keys.len() {
            return None;
        }
        let mut dist = vec![f64::INFINITY; self.keys.len()];
        let mut via: Vec<Option<EdgeId>> = vec![None; self.keys.len()];
        let mut done = vec![false; self.keys.len()];
        let mut heap = BinaryHeap::new();

        dist[from.0] = 0.0;
        heap.push(Frontier {
            dist: 0.0,
            node: from,
        });

        while let Some(Frontier { dist: d, node }) = heap.pop() {
            if done[node.0] {
                continue;
            }
            done[node.0] = true;
            if node == to {
                break;
            }
            for &eid in self.outgoing(node) {
                let edge = &self.edges[eid.0];
                let candidate = d + edge.weight;
                if candidate < dist[edge.to.0] {
                    dist[edge.to.0] = candidate;
                    via[edge.to.0] = Some(eid);
                    heap.push(Frontier {
                        dist: candidate,
                        node: edge.to,
                    });
                }
            }
        }

        if !done[to.0] {
            return None;
        }
        let mut path = Vec::new();
        let mut cur = to;
        while cur != from {
            let eid = via[cur.0]?;
            path.push(eid);
            cur = self.edges[eid.0].from;
        }
        path.reverse();
        Some((path, dist[to.0]))
    }
}

/// Min-heap entry for Dijkstra.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    dist: f64,
    node: NodeId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed: BinaryHeap is a max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
