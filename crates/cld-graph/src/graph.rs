//! The typed dependency graph
//!
//! Nodes are stored in insertion order; topological sorts break ties by id
//! so every ordering operation is deterministic across runs.

use crate::node::{Node, NodeId, NodeState};
use crate::{Error, Result};
use cld_schema::InputMap;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// A graph of resource nodes for one environment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    /// Target environment name
    pub environment: String,
    /// Target datacenter name
    pub datacenter: String,
    nodes: IndexMap<NodeId, Node>,
    #[serde(skip)]
    dependents: HashMap<NodeId, Vec<NodeId>>,
}

impl Graph {
    /// Create an empty graph
    pub fn new(environment: impl Into<String>, datacenter: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            datacenter: datacenter.into(),
            nodes: IndexMap::new(),
            dependents: HashMap::new(),
        }
    }

    /// Insert a node; ids must be unique
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(Error::DuplicateNode(node.id.to_string()));
        }
        debug!(id = %node.id, "adding node");
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Record that `from` depends on `to`; both endpoints must exist
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId) -> Result<()> {
        if !self.nodes.contains_key(to) {
            return Err(Error::UnknownNode(to.to_string()));
        }
        let node = self
            .nodes
            .get_mut(from)
            .ok_or_else(|| Error::UnknownNode(from.to_string()))?;
        if node.depends_on.insert(to.clone()) {
            self.dependents
                .entry(to.clone())
                .or_default()
                .push(from.clone());
        }
        Ok(())
    }

    /// Look up a node
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Iterate nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that directly depend on `id`
    pub fn dependents_of(&self, id: &NodeId) -> &[NodeId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All nodes reachable through dependent edges from `id`
    pub fn transitive_dependents(&self, id: &NodeId) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&NodeId> = self.dependents_of(id).iter().collect();

        while let Some(current) = queue.pop_front() {
            if seen.insert(current.clone()) {
                queue.extend(self.dependents_of(current));
            }
        }
        seen.into_iter().collect()
    }

    /// Dependencies-first ordering, ties broken lexicographically by id
    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: HashMap<&NodeId, usize> = self
            .nodes
            .values()
            .map(|node| (&node.id, node.depends_on.len()))
            .collect();

        let mut ready: BTreeSet<&NodeId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for dependent in self.dependents_of(id) {
                let degree = in_degree
                    .get_mut(dependent)
                    .expect("dependent must be a known node");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(self.nodes.get_key_value(dependent).map(|(k, _)| k).unwrap());
                }
            }
        }

        if order.len() != self.nodes.len() {
            let remaining = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            return Err(Error::Cycle(remaining));
        }

        Ok(order)
    }

    /// Dependents-first ordering; the exact reverse of the forward sort
    pub fn reverse_topological_sort(&self) -> Result<Vec<NodeId>> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// Pending nodes whose dependencies have all Completed or Skipped, in
    /// insertion order
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|node| node.state == NodeState::Pending)
            .filter(|node| {
                node.depends_on.iter().all(|dep| {
                    self.nodes
                        .get(dep)
                        .map(|n| n.state.unblocks_dependents())
                        .unwrap_or(false)
                })
            })
            .map(|node| node.id.clone())
            .collect()
    }

    fn set_state(&mut self, id: &NodeId, state: NodeState) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))?;
        debug!(id = %id, ?state, "node state change");
        node.state = state;
        Ok(())
    }

    /// Mark a node Running
    pub fn mark_running(&mut self, id: &NodeId) -> Result<()> {
        self.set_state(id, NodeState::Running)
    }

    /// Mark a node Completed
    pub fn mark_completed(&mut self, id: &NodeId) -> Result<()> {
        self.set_state(id, NodeState::Completed)
    }

    /// Mark a node Failed
    pub fn mark_failed(&mut self, id: &NodeId) -> Result<()> {
        self.set_state(id, NodeState::Failed)
    }

    /// Mark a node Skipped
    pub fn mark_skipped(&mut self, id: &NodeId) -> Result<()> {
        self.set_state(id, NodeState::Skipped)
    }

    /// Store the outputs a node produced during execution
    pub fn set_outputs(&mut self, id: &NodeId, outputs: InputMap) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))?;
        node.outputs = outputs;
        Ok(())
    }

    /// True when every node ended Completed or Skipped
    pub fn all_completed(&self) -> bool {
        self.nodes
            .values()
            .all(|node| node.state.unblocks_dependents())
    }

    /// True when any node Failed
    pub fn has_failed(&self) -> bool {
        self.nodes
            .values()
            .any(|node| node.state == NodeState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cld_schema::ResourceType;

    fn node(component: &str, ty: ResourceType, name: &str) -> Node {
        Node::new(component, ty, name, InputMap::new())
    }

    fn diamond() -> Graph {
        // db <- api <- route, db <- worker
        let mut graph = Graph::new("staging", "aws");
        graph
            .add_node(node("app", ResourceType::Database, "db"))
            .unwrap();
        graph
            .add_node(node("app", ResourceType::Deployment, "api"))
            .unwrap();
        graph
            .add_node(node("app", ResourceType::Deployment, "worker"))
            .unwrap();
        graph
            .add_node(node("app", ResourceType::Route, "public"))
            .unwrap();

        let db = NodeId::new("app", ResourceType::Database, "db");
        let api = NodeId::new("app", ResourceType::Deployment, "api");
        let worker = NodeId::new("app", ResourceType::Deployment, "worker");
        let route = NodeId::new("app", ResourceType::Route, "public");

        graph.add_edge(&api, &db).unwrap();
        graph.add_edge(&worker, &db).unwrap();
        graph.add_edge(&route, &api).unwrap();
        graph
    }

    #[test]
    fn test_topological_sort_orders_dependencies_first() {
        let graph = diamond();
        let order = graph.topological_sort().unwrap();
        let pos = |id: &NodeId| order.iter().position(|o| o == id).unwrap();

        let db = NodeId::new("app", ResourceType::Database, "db");
        let api = NodeId::new("app", ResourceType::Deployment, "api");
        let route = NodeId::new("app", ResourceType::Route, "public");

        assert!(pos(&db) < pos(&api));
        assert!(pos(&api) < pos(&route));
    }

    #[test]
    fn test_topological_sort_deterministic() {
        let graph = diamond();
        let first = graph.topological_sort().unwrap();
        for _ in 0..10 {
            assert_eq!(graph.topological_sort().unwrap(), first);
        }
    }

    #[test]
    fn test_reverse_sort_is_exact_reverse() {
        let graph = diamond();
        let mut forward = graph.topological_sort().unwrap();
        forward.reverse();
        assert_eq!(graph.reverse_topological_sort().unwrap(), forward);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = Graph::new("staging", "aws");
        graph
            .add_node(node("app", ResourceType::Service, "a"))
            .unwrap();
        graph
            .add_node(node("app", ResourceType::Service, "b"))
            .unwrap();

        let a = NodeId::new("app", ResourceType::Service, "a");
        let b = NodeId::new("app", ResourceType::Service, "b");
        graph.add_edge(&a, &b).unwrap();
        graph.add_edge(&b, &a).unwrap();

        assert!(matches!(graph.topological_sort(), Err(Error::Cycle(_))));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = Graph::new("staging", "aws");
        graph
            .add_node(node("app", ResourceType::Database, "db"))
            .unwrap();
        let err = graph
            .add_node(node("app", ResourceType::Database, "db"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateNode(_)));
    }

    #[test]
    fn test_ready_nodes_follow_state() {
        let mut graph = diamond();
        let db = NodeId::new("app", ResourceType::Database, "db");
        let api = NodeId::new("app", ResourceType::Deployment, "api");

        let ready = graph.ready_nodes();
        assert_eq!(ready, vec![db.clone()]);

        graph.mark_completed(&db).unwrap();
        let ready = graph.ready_nodes();
        assert_eq!(ready.len(), 2);
        assert!(ready.contains(&api));

        // Skipped dependencies also unblock
        graph.mark_skipped(&api).unwrap();
        let route = NodeId::new("app", ResourceType::Route, "public");
        assert!(graph.ready_nodes().contains(&route));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = diamond();
        let db = NodeId::new("app", ResourceType::Database, "db");
        let dependents = graph.transitive_dependents(&db);
        assert_eq!(dependents.len(), 3);
    }

    #[test]
    fn test_all_completed_and_has_failed() {
        let mut graph = diamond();
        assert!(!graph.all_completed());

        for id in graph.topological_sort().unwrap() {
            graph.mark_completed(&id).unwrap();
        }
        assert!(graph.all_completed());
        assert!(!graph.has_failed());

        let db = NodeId::new("app", ResourceType::Database, "db");
        graph.mark_failed(&db).unwrap();
        assert!(graph.has_failed());
    }
}
