//! # cld-datacenter
//!
//! The datacenter side of the engine: a platform-specific configuration
//! declaring, per resource type, an ordered list of hooks that bind
//! logical resources to IaC modules, plus the waterfall resolver that
//! picks the first matching hook for a node.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod config;
mod resolver;

pub use config::{
    DatacenterConfig, HookConfig, HookSource, ModuleConfig, ModuleSource, DEFAULT_PLUGIN,
};
pub use resolver::{HookMatch, HookResolution, HookResolver, ResolvedModule};

/// Error types for datacenter parsing and hook resolution
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A matched hook declared this resource unsupported
    #[error("Hook rejected resource: {0}")]
    HookRejected(String),

    /// A module declared neither a source nor a build path
    #[error("Module '{0}' declares neither source nor build")]
    ModuleWithoutSource(String),

    /// Expression failure while evaluating a predicate or module input
    #[error(transparent)]
    Expr(#[from] cld_expr::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error reading a datacenter file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config-level validation failure
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
