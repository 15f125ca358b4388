/// Negotiation Engine — Estate Graph
///
/// Node/edge storage, lookups and the primitive mutators used by the
/// resolver. Every metric mutation clamps. Nodes are never added or
/// removed after construction; edges are immutable.
/// Analytics (`density`, `isolated_nodes`) describe the fixed topology
/// and feed the participant view.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::arithmetic::{clamp, is_valid_id, SCALE};
use crate::domain::{Capability, Deployment, Edge, EdgeStrength, Node, NodeMetric};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Estate {
    nodes: BTreeMap<String, Node>,
    edges: Vec<Edge>,
}

impl Estate {
    /// Build an estate, rejecting bad ids, duplicates and dangling edges.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for node in nodes {
            if !is_valid_id(&node.id) {
                return Err(EngineError::Scenario(format!(
                    "node id {:?} must match [a-zA-Z0-9_-]+",
                    node.id
                )));
            }
            if map.contains_key(&node.id) {
                return Err(EngineError::Scenario(format!(
                    "duplicate node id {:?}",
                    node.id
                )));
            }
            map.insert(node.id.clone(), node);
        }
        for edge in &edges {
            for end in [&edge.a, &edge.b] {
                if !map.contains_key(end) {
                    return Err(EngineError::Scenario(format!(
                        "edge {}-{} references unknown node {:?}",
                        edge.a, edge.b, end
                    )));
                }
            }
            if edge.a == edge.b {
                return Err(EngineError::Scenario(format!("self edge on {:?}", edge.a)));
            }
        }
        let mut edges = edges;
        edges.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));
        Ok(Self { nodes: map, edges })
    }

    // -- lookups ---------------------------------------------------------

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Neighbours of `id`, optionally restricted to one edge strength.
    /// Sorted, without duplicates.
    pub fn neighbours(&self, id: &str, strength: Option<EdgeStrength>) -> Vec<&str> {
        let set: BTreeSet<&str> = self
            .edges
            .iter()
            .filter(|e| strength.map_or(true, |s| e.strength == s))
            .filter_map(|e| e.other(id))
            .collect();
        set.into_iter().collect()
    }

    pub fn blocked_nodes(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.blocked)
            .map(|n| n.id.as_str())
            .collect()
    }

    pub fn deployment_count(&self) -> usize {
        self.nodes.values().map(|n| n.deployments.len()).sum()
    }

    /// Number of nodes carrying `capability`.
    pub fn capability_count(&self, capability: Capability) -> usize {
        self.nodes
            .values()
            .filter(|n| n.has_capability(capability))
            .count()
    }

    // -- mutators --------------------------------------------------------

    fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownNode(id.to_string()))
    }

    pub fn apply_deployment(&mut self, id: &str, deployment: Deployment) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.has_capability(deployment.capability) {
            return Err(EngineError::Invariant(format!(
                "{} already deployed on {id:?}",
                deployment.capability
            )));
        }
        node.deployments.push(deployment);
        Ok(())
    }

    /// Add `delta` to one node metric and clamp into `range`.
    /// Returns the change actually applied.
    pub fn adjust_metric(
        &mut self,
        id: &str,
        metric: NodeMetric,
        delta: i64,
        range: (i64, i64),
    ) -> Result<i64> {
        let node = self.node_mut(id)?;
        let slot = node.metric_mut(metric);
        let before = *slot;
        *slot = clamp(before.saturating_add(delta), range.0, range.1);
        Ok(*slot - before)
    }

    /// Block `id` for `turns`. An existing longer block is kept.
    pub fn set_blocked(&mut self, id: &str, turns: u32) -> Result<()> {
        let node = self.node_mut(id)?;
        if turns == 0 {
            return Ok(());
        }
        node.block_turns = node.block_turns.max(turns);
        node.blocked = true;
        Ok(())
    }

    /// Lift any block on `id`. Returns whether the node was blocked.
    pub fn clear_block(&mut self, id: &str) -> Result<bool> {
        let node = self.node_mut(id)?;
        let was = node.blocked;
        node.blocked = false;
        node.block_turns = 0;
        Ok(was)
    }

    /// Once per resolved turn: count every block down by one.
    /// Returns ids whose block expired.
    pub fn decrement_blocks(&mut self) -> Vec<String> {
        let mut cleared = Vec::new();
        for node in self.nodes.values_mut().filter(|n| n.blocked) {
            node.block_turns = node.block_turns.saturating_sub(1);
            if node.block_turns == 0 {
                node.blocked = false;
                cleared.push(node.id.clone());
            }
        }
        cleared
    }

    // -- analytics -------------------------------------------------------

    /// Connectivity density = (edges * SCALE) // (n * (n - 1) / 2).
    /// Returns 0 with fewer than 2 nodes.
    pub fn density(&self) -> i64 {
        let n = self.nodes.len() as i64;
        if n < 2 {
            return 0;
        }
        let max_edges = n * (n - 1) / 2;
        (self.edges.len() as i64).saturating_mul(SCALE) / max_edges
    }

    /// Node ids with no edge at all, sorted.
    pub fn isolated_nodes(&self) -> Vec<String> {
        let mut connected: BTreeSet<&str> = BTreeSet::new();
        for edge in &self.edges {
            connected.insert(&edge.a);
            connected.insert(&edge.b);
        }
        self.nodes
            .keys()
            .filter(|id| !connected.contains(id.as_str()))
            .cloned()
            .collect()
    }
}
