//! # cld-schema
//!
//! Logical models shared across the cldctl engine: the tagged input value
//! union, the closed resource type enum, and the parsed component spec.
//!
//! Component and datacenter files are YAML on disk; everything past
//! deserialization works with the typed models in this crate.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod component;
mod resource;
mod value;

pub use component::{ComponentDependency, ComponentSpec, InputMap, VariableDecl};
pub use resource::ResourceType;
pub use value::Value;

/// Error types for schema parsing and validation
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A section or scope name did not map to a known resource type
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// Spec-level validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error reading a spec file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
