//! Layered evaluation context
//!
//! Lookup order follows the scope named by the first path segment:
//! node-local (`node.name`, `node.inputs.*`), environment, variables,
//! dependencies, dependents, and the dotted resource scopes over the
//! current component's already-resolved outputs (`databases.<n>.host`).

use crate::parser::PathSegment;
use cld_schema::{ResourceType, Value};
use indexmap::IndexMap;

/// Evaluation context for template expressions
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    node: IndexMap<String, Value>,
    environment: IndexMap<String, Value>,
    variables: IndexMap<String, Value>,
    dependencies: IndexMap<String, Value>,
    dependents: IndexMap<String, Value>,
    outputs: IndexMap<String, Value>,
}

impl EvalContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `node.name` binding
    pub fn set_node_name(&mut self, name: impl Into<String>) {
        self.node.insert("name".to_string(), Value::from(name.into()));
    }

    /// Set the `node.inputs.*` bindings
    pub fn set_node_inputs(&mut self, inputs: IndexMap<String, Value>) {
        self.node.insert("inputs".to_string(), Value::Map(inputs));
    }

    /// Set the `node.outputs.*` bindings; used when evaluating a hook's
    /// output bindings after its modules have applied
    pub fn set_node_outputs(&mut self, outputs: IndexMap<String, Value>) {
        self.node.insert("outputs".to_string(), Value::Map(outputs));
    }

    /// Set the `environment.name` and `environment.datacenter` bindings
    pub fn set_environment(&mut self, name: impl Into<String>, datacenter: impl Into<String>) {
        self.environment
            .insert("name".to_string(), Value::from(name.into()));
        self.environment
            .insert("datacenter".to_string(), Value::from(datacenter.into()));
    }

    /// Set a single variable
    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    /// Replace the whole variable layer
    pub fn set_variables(&mut self, variables: IndexMap<String, Value>) {
        self.variables = variables;
    }

    /// Record the resolved outputs of a same-component resource, making
    /// them visible as `<scope>.<name>.<field>`
    pub fn insert_output(
        &mut self,
        resource_type: ResourceType,
        name: &str,
        outputs: IndexMap<String, Value>,
    ) {
        let scope = self
            .outputs
            .entry(resource_type.section_name().to_string())
            .or_insert_with(|| Value::Map(IndexMap::new()));
        if let Value::Map(map) = scope {
            map.insert(name.to_string(), Value::Map(outputs));
        }
    }

    /// Record the outputs of a dependency component's resource, visible as
    /// `dependencies.<dep>.<scope>.<name>.<field>`
    pub fn insert_dependency_output(
        &mut self,
        dependency: &str,
        resource_type: ResourceType,
        name: &str,
        outputs: IndexMap<String, Value>,
    ) {
        Self::insert_scoped(
            &mut self.dependencies,
            dependency,
            resource_type,
            name,
            outputs,
        );
    }

    /// Record the outputs of a dependent component's resource, visible as
    /// `dependents.<dep>.<scope>.<name>.<field>`
    pub fn insert_dependent_output(
        &mut self,
        dependent: &str,
        resource_type: ResourceType,
        name: &str,
        outputs: IndexMap<String, Value>,
    ) {
        Self::insert_scoped(
            &mut self.dependents,
            dependent,
            resource_type,
            name,
            outputs,
        );
    }

    fn insert_scoped(
        layer: &mut IndexMap<String, Value>,
        component: &str,
        resource_type: ResourceType,
        name: &str,
        outputs: IndexMap<String, Value>,
    ) {
        let entry = layer
            .entry(component.to_string())
            .or_insert_with(|| Value::Map(IndexMap::new()));
        if let Value::Map(scopes) = entry {
            let scope = scopes
                .entry(resource_type.section_name().to_string())
                .or_insert_with(|| Value::Map(IndexMap::new()));
            if let Value::Map(map) = scope {
                map.insert(name.to_string(), Value::Map(outputs));
            }
        }
    }

    /// Resolve a parsed path against the context
    pub fn resolve(&self, path: &[PathSegment]) -> Option<&Value> {
        let scope = match path.first()? {
            PathSegment::Key(key) => key.as_str(),
            PathSegment::Index(_) => return None,
        };
        let rest = &path[1..];

        match scope {
            "node" => Self::walk_map(&self.node, rest),
            "environment" => Self::walk_map(&self.environment, rest),
            "variables" => Self::walk_map(&self.variables, rest),
            "dependencies" => Self::walk_map(&self.dependencies, rest),
            "dependents" => Self::walk_map(&self.dependents, rest),
            _ => {
                let scope_value = self.outputs.get(scope)?;
                Self::walk_value(scope_value, rest)
            }
        }
    }

    fn walk_map<'a>(map: &'a IndexMap<String, Value>, path: &[PathSegment]) -> Option<&'a Value> {
        let (first, rest) = path.split_first()?;
        let key = match first {
            PathSegment::Key(key) => key,
            PathSegment::Index(_) => return None,
        };
        Self::walk_value(map.get(key)?, rest)
    }

    fn walk_value<'a>(root: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
        let mut current = root;
        for segment in path {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Map(map)) => map.get(key)?,
                (PathSegment::Index(i), Value::List(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn outputs(pairs: &[(&str, &str)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_node_and_environment_layers() {
        let mut ctx = EvalContext::new();
        ctx.set_node_name("main");
        ctx.set_environment("staging", "aws-east");

        let expr = parse_expression("node.name").unwrap();
        assert_eq!(ctx.resolve(&expr.path).unwrap().as_str(), Some("main"));

        let expr = parse_expression("environment.datacenter").unwrap();
        assert_eq!(ctx.resolve(&expr.path).unwrap().as_str(), Some("aws-east"));
    }

    #[test]
    fn test_resource_output_scope() {
        let mut ctx = EvalContext::new();
        ctx.insert_output(
            ResourceType::Database,
            "main",
            outputs(&[("host", "db.internal"), ("port", "5432")]),
        );

        let expr = parse_expression("databases.main.host").unwrap();
        assert_eq!(
            ctx.resolve(&expr.path).unwrap().as_str(),
            Some("db.internal")
        );

        let expr = parse_expression("databases.other.host").unwrap();
        assert!(ctx.resolve(&expr.path).is_none());
    }

    #[test]
    fn test_dependency_scope() {
        let mut ctx = EvalContext::new();
        ctx.insert_dependency_output(
            "shared-db",
            ResourceType::Database,
            "primary",
            outputs(&[("host", "shared.internal")]),
        );

        let expr = parse_expression("dependencies.shared-db.databases.primary.host").unwrap();
        assert_eq!(
            ctx.resolve(&expr.path).unwrap().as_str(),
            Some("shared.internal")
        );
    }

    #[test]
    fn test_list_index_resolution() {
        let mut ctx = EvalContext::new();
        let mut inputs = IndexMap::new();
        inputs.insert(
            "command".to_string(),
            Value::List(vec![Value::from("run"), Value::from("--fast")]),
        );
        ctx.set_node_inputs(inputs);

        let expr = parse_expression("node.inputs.command[1]").unwrap();
        assert_eq!(ctx.resolve(&expr.path).unwrap().as_str(), Some("--fast"));
    }
}
