//! Parsed component spec model
//!
//! A component declares the resources an application needs, one spec
//! section per resource type. Input values inside each declaration stay
//! dynamically typed (`Value`), so templates survive parsing unevaluated.

use crate::{Error, ResourceType, Result, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inputs of a single resource declaration
pub type InputMap = IndexMap<String, Value>;

/// A declared dependency on another component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDependency {
    /// Source reference of the dependency (registry ref, path, …)
    pub component: String,
    /// Variable overrides passed down to the dependency
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, Value>,
}

/// A variable declared by a component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableDecl {
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default value when the caller provides none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Whether a value must be supplied
    #[serde(default)]
    pub required: bool,
}

/// A parsed component spec
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Spec format version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Named dependencies on other components
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, ComponentDependency>,
    /// Variables this component accepts
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableDecl>,

    /// Database declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub databases: IndexMap<String, InputMap>,
    /// Bucket declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub buckets: IndexMap<String, InputMap>,
    /// Deployment declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub deployments: IndexMap<String, InputMap>,
    /// Service declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub services: IndexMap<String, InputMap>,
    /// Route declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub routes: IndexMap<String, InputMap>,
    /// Function declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub functions: IndexMap<String, InputMap>,
    /// Cronjob declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub cronjobs: IndexMap<String, InputMap>,
    /// Secret declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub secrets: IndexMap<String, InputMap>,
    /// Docker build declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub docker_builds: IndexMap<String, InputMap>,
    /// Task declarations
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tasks: IndexMap<String, InputMap>,
    /// Explicit port declarations (usually inferred instead)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub ports: IndexMap<String, InputMap>,
}

impl ComponentSpec {
    /// Parse a component spec from YAML text
    pub fn parse_str(content: &str) -> Result<Self> {
        let spec: ComponentSpec = serde_yaml::from_str(content)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a component spec from a YAML file
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Iterate the populated resource sections in declaration order
    pub fn sections(&self) -> impl Iterator<Item = (ResourceType, &IndexMap<String, InputMap>)> {
        [
            (ResourceType::Database, &self.databases),
            (ResourceType::Bucket, &self.buckets),
            (ResourceType::Deployment, &self.deployments),
            (ResourceType::Service, &self.services),
            (ResourceType::Route, &self.routes),
            (ResourceType::Function, &self.functions),
            (ResourceType::Cronjob, &self.cronjobs),
            (ResourceType::Secret, &self.secrets),
            (ResourceType::DockerBuild, &self.docker_builds),
            (ResourceType::Task, &self.tasks),
            (ResourceType::Port, &self.ports),
        ]
        .into_iter()
        .filter(|(_, section)| !section.is_empty())
    }

    /// Validate internal consistency of the spec
    pub fn validate(&self) -> Result<()> {
        for (name, decl) in &self.variables {
            if decl.required && decl.default.is_some() {
                return Err(Error::Validation(format!(
                    "Variable '{}' is required but also declares a default",
                    name
                )));
            }
        }

        for (ty, section) in self.sections() {
            for name in section.keys() {
                if name.is_empty() {
                    return Err(Error::Validation(format!(
                        "Empty {} name in component spec",
                        ty
                    )));
                }
                if name.contains('/') || name.contains('.') {
                    return Err(Error::Validation(format!(
                        "Invalid {} name '{}': '/' and '.' are reserved",
                        ty, name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Total number of declared resources
    pub fn resource_count(&self) -> usize {
        self.sections().map(|(_, section)| section.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
version: v1
description: Example application
variables:
  region:
    description: Cloud region
    default: us-east-1
databases:
  main:
    type: "postgres:16"
deployments:
  api:
    image: "registry.example.com/api:latest"
    replicas: 2
    environment:
      DB_HOST: "${{ databases.main.host }}"
services:
  api:
    deployment: "${{ deployments.api.id }}"
    port: 8080
"#;

    #[test]
    fn test_parse_sections() {
        let spec = ComponentSpec::parse_str(SPEC).unwrap();
        assert_eq!(spec.resource_count(), 3);
        assert!(spec.databases.contains_key("main"));
        assert!(spec.deployments.contains_key("api"));

        let api = spec.deployments.get("api").unwrap();
        assert_eq!(api.get("replicas").unwrap().as_int(), Some(2));
        assert!(api
            .get("environment")
            .unwrap()
            .get_path(&["DB_HOST"])
            .unwrap()
            .is_expr());
    }

    #[test]
    fn test_section_iteration_order() {
        let spec = ComponentSpec::parse_str(SPEC).unwrap();
        let order: Vec<ResourceType> = spec.sections().map(|(ty, _)| ty).collect();
        assert_eq!(
            order,
            vec![
                ResourceType::Database,
                ResourceType::Deployment,
                ResourceType::Service
            ]
        );
    }

    #[test]
    fn test_validate_rejects_reserved_names() {
        let bad = r#"
databases:
  "a/b":
    type: "postgres:16"
"#;
        assert!(ComponentSpec::parse_str(bad).is_err());
    }

    #[test]
    fn test_validate_required_with_default() {
        let bad = r#"
variables:
  region:
    required: true
    default: us-east-1
"#;
        assert!(ComponentSpec::parse_str(bad).is_err());
    }
}
