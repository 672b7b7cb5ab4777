//! Waterfall hook resolution
//!
//! Hooks for a resource type are probed in declared order; the first hook
//! whose `when` predicate is truthy (or absent) wins. No merging happens
//! across hooks. Predicate evaluation sees only `node.*`, `variables.*`,
//! and `environment.*`; a node's own outputs do not exist yet.

use crate::config::{DatacenterConfig, HookConfig, HookSource, ModuleSource};
use crate::Result;
use cld_expr::{evaluate_input_map, evaluate_predicate, EvalContext};
use cld_schema::{ResourceType, Value};
use indexmap::IndexMap;
use tracing::debug;

/// A fully resolved module ready for plugin invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModule {
    /// Module display name
    pub name: String,
    /// Plugin that executes it
    pub plugin: String,
    /// Resolved module source
    pub source: String,
    /// Evaluated inputs
    pub inputs: IndexMap<String, Value>,
}

/// A matched hook, prior to module resolution
#[derive(Debug, Clone, Copy)]
pub struct HookMatch<'a> {
    /// The resource type the hook list belongs to
    pub resource_type: ResourceType,
    /// Position in the declared hook list
    pub index: usize,
    /// The matched hook
    pub hook: &'a HookConfig,
}

impl HookMatch<'_> {
    /// Stable identity of the hook, compared by the planner to decide
    /// replacement
    pub fn identity(&self) -> String {
        format!("{}#{}", self.resource_type, self.index)
    }
}

/// Outcome of probing the hook list for a node
#[derive(Debug)]
pub enum HookResolution<'a> {
    /// A hook matched and can realize the resource
    Matched(HookMatch<'a>),
    /// A hook matched but declares the resource unsupported
    Rejected(String),
    /// No hook matched; the node will be skipped
    NoMatch,
}

/// Resolves nodes to hooks within one datacenter
pub struct HookResolver<'a> {
    config: &'a DatacenterConfig,
}

impl<'a> HookResolver<'a> {
    /// Create a resolver over a datacenter config
    pub fn new(config: &'a DatacenterConfig) -> Self {
        Self { config }
    }

    /// Probe the hook list for `resource_type`, first match wins
    pub fn match_hook(
        &self,
        resource_type: ResourceType,
        ctx: &EvalContext,
    ) -> Result<HookResolution<'a>> {
        for (index, hook) in self.config.hooks_for(resource_type).iter().enumerate() {
            let matched = match hook.when() {
                None => true,
                Some(when) => evaluate_predicate(when, ctx)?,
            };
            if !matched {
                continue;
            }

            debug!(%resource_type, index, "hook matched");
            if let Some(message) = hook.error() {
                return Ok(HookResolution::Rejected(message.to_string()));
            }
            return Ok(HookResolution::Matched(HookMatch {
                resource_type,
                index,
                hook,
            }));
        }

        Ok(HookResolution::NoMatch)
    }

    /// Resolve module sources without evaluating inputs; used by the
    /// planner to detect hook or module changes
    pub fn module_sources(&self, matched: &HookMatch<'_>) -> Result<Vec<String>> {
        matched
            .hook
            .modules()
            .iter()
            .map(|module| module.resolve_source(&self.config.source_dir))
            .collect()
    }

    /// Resolve every module of a matched hook, evaluating its input
    /// expressions against the full context
    pub fn resolve_modules(
        &self,
        matched: &HookMatch<'_>,
        ctx: &EvalContext,
    ) -> Result<Vec<ResolvedModule>> {
        matched
            .hook
            .modules()
            .iter()
            .map(|module| {
                Ok(ResolvedModule {
                    name: ModuleSource::name(module).to_string(),
                    plugin: module.plugin().to_string(),
                    source: module.resolve_source(&self.config.source_dir)?,
                    inputs: evaluate_input_map(module.inputs(), ctx)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cld_schema::Value;

    const DATACENTER: &str = r#"
environment:
  database:
    - when: node.inputs.type == "mongodb:7"
      error: "MongoDB not supported"
    - when: node.inputs.type == "postgres:16"
      modules:
        - name: pg
          build: ./modules/pg
          inputs:
            size: "${{ node.inputs.size | default:small }}"
    - modules:
        - name: generic
          source: registry.example.com/modules/generic-db
"#;

    fn ctx_with_type(db_type: &str) -> EvalContext {
        let mut ctx = EvalContext::new();
        let mut inputs = IndexMap::new();
        inputs.insert("type".to_string(), Value::from(db_type));
        ctx.set_node_inputs(inputs);
        ctx
    }

    #[test]
    fn test_waterfall_first_match_wins() {
        let config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        let resolver = HookResolver::new(&config);

        let resolution = resolver
            .match_hook(ResourceType::Database, &ctx_with_type("postgres:16"))
            .unwrap();
        let HookResolution::Matched(matched) = resolution else {
            panic!("expected a match");
        };
        assert_eq!(matched.index, 1);
        assert_eq!(matched.identity(), "database#1");
    }

    #[test]
    fn test_waterfall_falls_through_to_unconditional() {
        let config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        let resolver = HookResolver::new(&config);

        let resolution = resolver
            .match_hook(ResourceType::Database, &ctx_with_type("mysql:8"))
            .unwrap();
        let HookResolution::Matched(matched) = resolution else {
            panic!("expected a match");
        };
        assert_eq!(matched.index, 2);
    }

    #[test]
    fn test_rejection_sentinel() {
        let config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        let resolver = HookResolver::new(&config);

        let resolution = resolver
            .match_hook(ResourceType::Database, &ctx_with_type("mongodb:7"))
            .unwrap();
        assert!(
            matches!(resolution, HookResolution::Rejected(message) if message == "MongoDB not supported")
        );
    }

    #[test]
    fn test_no_hooks_for_type() {
        let config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        let resolver = HookResolver::new(&config);

        let resolution = resolver
            .match_hook(ResourceType::Bucket, &EvalContext::new())
            .unwrap();
        assert!(matches!(resolution, HookResolution::NoMatch));
    }

    #[test]
    fn test_resolve_modules_evaluates_inputs() {
        let mut config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        config.source_dir = std::path::PathBuf::from("/dc");
        let resolver = HookResolver::new(&config);

        let ctx = ctx_with_type("postgres:16");
        let HookResolution::Matched(matched) =
            resolver.match_hook(ResourceType::Database, &ctx).unwrap()
        else {
            panic!("expected a match");
        };

        let modules = resolver.resolve_modules(&matched, &ctx).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "pg");
        assert_eq!(modules[0].plugin, "native");
        assert_eq!(modules[0].source, "/dc/./modules/pg");
        assert_eq!(
            modules[0].inputs.get("size").unwrap().as_str(),
            Some("small")
        );
    }

    #[test]
    fn test_module_sources_for_planning() {
        let config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        let resolver = HookResolver::new(&config);

        let HookResolution::Matched(matched) = resolver
            .match_hook(ResourceType::Database, &ctx_with_type("mysql:8"))
            .unwrap()
        else {
            panic!("expected a match");
        };
        assert_eq!(
            resolver.module_sources(&matched).unwrap(),
            vec!["registry.example.com/modules/generic-db".to_string()]
        );
    }
}
