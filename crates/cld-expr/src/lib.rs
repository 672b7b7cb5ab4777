//! # cld-expr
//!
//! Parsing and evaluation of `${{ … }}` template expressions.
//!
//! Templates interleave literal text with expression segments. An
//! expression is a dotted path with optional bracket indexing, followed by
//! zero or more pipes: `${{ databases.main.host }}`,
//! `${{ node.inputs.tags | join:, | upper }}`.
//!
//! Graph construction only *scans* templates for cross-resource
//! references; evaluation is lazy and happens in the executor once
//! dependency outputs are available.

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod context;
mod eval;
mod parser;
mod predicate;
mod scan;

pub use context::EvalContext;
pub use eval::{evaluate, evaluate_input_map, evaluate_input_map_lenient, interpolate};
pub use parser::{contains_expr, Expression, PathSegment, Pipe, Segment, Template};
pub use predicate::evaluate_predicate;
pub use scan::{scan_references, Reference};

/// Error types for template parsing and evaluation
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed expression inside a template segment
    #[error("Invalid expression '{0}': {1}")]
    Parse(String, String),

    /// Pipe name not recognized by the evaluator
    #[error("Unknown pipe: {0}")]
    UnknownPipe(String),

    /// Path could not be resolved against the context
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// A pipe was applied to a value of the wrong shape
    #[error("Pipe '{pipe}' cannot be applied to {value}")]
    PipeType {
        /// The pipe that failed
        pipe: String,
        /// Description of the offending value
        value: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
