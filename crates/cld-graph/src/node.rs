//! Graph nodes and their execution state

use cld_schema::{InputMap, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A node identifier: `"<component>/<type>/<name>"`
///
/// Treated as an opaque token everywhere outside construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Derive an id from its identifying tuple
    pub fn new(component: &str, resource_type: ResourceType, name: &str) -> Self {
        Self(format!("{}/{}/{}", component, resource_type, name))
    }

    /// The raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the id back into `(component, type, name)`
    pub fn parts(&self) -> Option<(&str, ResourceType, &str)> {
        let mut pieces = self.0.splitn(3, '/');
        let component = pieces.next()?;
        let resource_type = pieces.next()?.parse().ok()?;
        let name = pieces.next()?;
        Some((component, resource_type, name))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Execution state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    /// Not yet started
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Skipped because a dependency failed or no hook matched
    Skipped,
}

impl NodeState {
    /// Terminal states that unblock dependents
    pub fn unblocks_dependents(&self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Skipped)
    }
}

/// A unit of desired resource state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Globally unique id within one plan
    pub id: NodeId,
    /// Resource kind
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Owning component
    pub component: String,
    /// Declared resource name
    pub name: String,
    /// Raw inputs; expression strings stay unevaluated
    pub inputs: InputMap,
    /// Outputs, populated after execution
    #[serde(default, skip_serializing_if = "InputMap::is_empty")]
    pub outputs: InputMap,
    /// Ids of nodes this one depends on
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<NodeId>,
    /// Execution state
    pub state: NodeState,
}

impl Node {
    /// Create a pending node
    pub fn new(component: &str, resource_type: ResourceType, name: &str, inputs: InputMap) -> Self {
        Self {
            id: NodeId::new(component, resource_type, name),
            resource_type,
            component: component.to_string(),
            name: name.to_string(),
            inputs,
            outputs: InputMap::new(),
            depends_on: BTreeSet::new(),
            state: NodeState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_format() {
        let id = NodeId::new("app", ResourceType::Database, "main");
        assert_eq!(id.as_str(), "app/database/main");
        assert_eq!(id.to_string(), "app/database/main");
    }

    #[test]
    fn test_node_id_parts() {
        let id = NodeId::new("app", ResourceType::Database, "main");
        assert_eq!(id.parts(), Some(("app", ResourceType::Database, "main")));
        assert_eq!(NodeId::from("garbage").parts(), None);
    }

    #[test]
    fn test_node_id_serde_transparent() {
        let id = NodeId::new("app", ResourceType::DockerBuild, "web");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"app/dockerBuild/web\"");
    }

    #[test]
    fn test_state_unblocking() {
        assert!(NodeState::Completed.unblocks_dependents());
        assert!(NodeState::Skipped.unblocks_dependents());
        assert!(!NodeState::Failed.unblocks_dependents());
        assert!(!NodeState::Pending.unblocks_dependents());
    }
}
