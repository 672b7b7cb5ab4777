//! # cld-graph
//!
//! The typed dependency graph at the heart of the engine: one node per
//! declared resource, edges inferred from cross-resource template
//! references, deterministic topological ordering, and per-node execution
//! state used by the executor's ready-set scheduling.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod builder;
mod graph;
mod node;

pub use builder::GraphBuilder;
pub use graph::Graph;
pub use node::{Node, NodeId, NodeState};

/// Error types for graph construction
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The graph contains a dependency cycle
    #[error("Dependency cycle involving: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// Two declarations produced the same node id
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// A same-component reference points at a resource that was never
    /// declared
    #[error("Node '{node}' references unknown resource '{target}'")]
    UnknownReference {
        /// The referring node id
        node: String,
        /// The missing target id
        target: String,
    },

    /// An edge endpoint does not exist in the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Template scanning failure
    #[error(transparent)]
    Expr(#[from] cld_expr::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
