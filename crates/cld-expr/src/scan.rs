//! Cross-resource reference scanning
//!
//! The graph builder scans every template for references to sibling
//! resources and turns them into dependency edges. Scanning never
//! evaluates; it only inspects parsed paths.

use crate::parser::Template;
use crate::Result;
use cld_schema::ResourceType;

/// Scopes whose references create dependency edges
const EDGE_SCOPES: [&str; 9] = [
    "databases",
    "services",
    "deployments",
    "routes",
    "functions",
    "buckets",
    "secrets",
    "dockerBuilds",
    "ports",
];

/// A cross-resource reference found inside a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Set when the reference reaches into a declared component
    /// dependency's namespace (`dependencies.<dep>.…`)
    pub dependency: Option<String>,
    /// Referenced resource type
    pub resource_type: ResourceType,
    /// Referenced resource name
    pub target: String,
    /// First field accessed past the target, when present
    pub field: Option<String>,
}

/// Scan a template for cross-resource references
///
/// `variables.*`, `node.*`, `environment.*`, and `dependents.*` never
/// produce references.
pub fn scan_references(template: &str) -> Result<Vec<Reference>> {
    let parsed = Template::parse(template)?;
    let mut references = Vec::new();

    for expr in parsed.expressions() {
        let Some(scope) = expr.scope() else {
            continue;
        };

        if scope == "dependencies" {
            // dependencies.<dep>.<scope>.<target>.<field>
            let (Some(dep), Some(dep_scope), Some(target)) =
                (expr.key_at(1), expr.key_at(2), expr.key_at(3))
            else {
                continue;
            };
            if !EDGE_SCOPES.contains(&dep_scope) {
                continue;
            }
            if let Some(resource_type) = ResourceType::from_scope(dep_scope) {
                references.push(Reference {
                    dependency: Some(dep.to_string()),
                    resource_type,
                    target: target.to_string(),
                    field: expr.key_at(4).map(str::to_string),
                });
            }
        } else if EDGE_SCOPES.contains(&scope) {
            // <scope>.<target>.<field>
            let Some(target) = expr.key_at(1) else {
                continue;
            };
            if let Some(resource_type) = ResourceType::from_scope(scope) {
                references.push(Reference {
                    dependency: None,
                    resource_type,
                    target: target.to_string(),
                    field: expr.key_at(2).map(str::to_string),
                });
            }
        }
    }

    Ok(references)
}
