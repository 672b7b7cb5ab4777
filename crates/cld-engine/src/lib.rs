//! # cld-engine
//!
//! The orchestration engine: plans diff a desired graph against persisted
//! state, the executor drives the plan with bounded parallelism, each node
//! resolving its hook, invoking its IaC plugin, and writing its state row
//! before dependents unblock.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod context;
mod event;
mod executor;
mod plan;
mod planner;
mod plugin;

pub use event::{DeployEvent, EventLevel, EventSender};
pub use executor::{CancelToken, ExecuteOptions, ExecutionSummary, Executor};
pub use plan::{Action, Plan, PlanSummary, PropertyDiff, ResourceChange};
pub use planner::Planner;
pub use plugin::{
    forwarded_environment, ApplyResult, Drift, IacPlugin, ImportOptions, ImportResult,
    PluginRegistry, PreviewResult, RefreshResult, RunOptions,
};

/// Error types for planning and execution
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Graph construction or ordering failure
    #[error(transparent)]
    Graph(#[from] cld_graph::Error),

    /// Expression evaluation failure
    #[error(transparent)]
    Expr(#[from] cld_expr::Error),

    /// Datacenter config or hook resolution failure
    #[error(transparent)]
    Datacenter(#[from] cld_datacenter::Error),

    /// State storage failure
    #[error(transparent)]
    State(#[from] cld_state::Error),

    /// No plugin registered under the requested name
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// IaC plugin invocation failure
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// A matched hook declared the resource unsupported
    #[error("Hook rejected resource: {0}")]
    HookRejected(String),

    /// Destroying a component that others still depend on
    #[error("Component '{component}' is depended on by: {}", dependents.join(", "))]
    DependentComponents {
        /// The component being destroyed
        component: String,
        /// Components that declare a dependency on it
        dependents: Vec<String>,
    },

    /// The run was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Node-level execution failure
    #[error("Execution failed for {node}: {message}")]
    NodeFailed {
        /// The failing node id
        node: String,
        /// Failure reason
        message: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
