//! Datacenter configuration model
//!
//! Hooks and modules are consumed through capability traits so additional
//! source formats can provide them; the v1 YAML model below is the only
//! built-in provider.

use crate::{Error, Result};
use cld_schema::{ResourceType, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Plugin used when a module declares none
pub const DEFAULT_PLUGIN: &str = "native";

/// Capability view over a hook declaration
pub trait HookSource {
    /// The `when` predicate, if any
    fn when(&self) -> Option<&str>;
    /// Rejection sentinel: the hook declares this resource unsupported
    fn error(&self) -> Option<&str>;
    /// The modules this hook realizes the resource with
    fn modules(&self) -> &[ModuleConfig];
    /// Output bindings exposed to dependents, if any
    fn outputs(&self) -> Option<&IndexMap<String, Value>>;
}

/// Capability view over a module declaration
pub trait ModuleSource {
    /// Display name of the module
    fn name(&self) -> &str;
    /// Plugin that executes the module
    fn plugin(&self) -> &str;
    /// Resolve the module source, relative build paths against `base`
    fn resolve_source(&self, base: &Path) -> Result<String>;
    /// Input expressions bound to the module
    fn inputs(&self) -> &IndexMap<String, Value>;
}

/// A module declaration inside a hook (v1 format)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    /// Module name; defaults to "main" when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Plugin name; defaults to [`DEFAULT_PLUGIN`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    /// Remote module source reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Local build path, resolved against the datacenter source directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    /// Input expressions passed to the module
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, Value>,
}

impl ModuleSource for ModuleConfig {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("main")
    }

    fn plugin(&self) -> &str {
        self.plugin.as_deref().unwrap_or(DEFAULT_PLUGIN)
    }

    fn resolve_source(&self, base: &Path) -> Result<String> {
        if let Some(source) = &self.source {
            return Ok(source.clone());
        }
        if let Some(build) = &self.build {
            let path = Path::new(build);
            let resolved = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            };
            return Ok(resolved.to_string_lossy().into_owned());
        }
        Err(Error::ModuleWithoutSource(self.name().to_string()))
    }

    fn inputs(&self) -> &IndexMap<String, Value> {
        &self.inputs
    }
}

/// A hook declaration (v1 format)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    /// Match predicate; absent means always-match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Rejection message; a hook with this set refuses the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Modules realizing the resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleConfig>,
    /// Output bindings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<IndexMap<String, Value>>,
}

impl HookSource for HookConfig {
    fn when(&self) -> Option<&str> {
        self.when.as_deref()
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn modules(&self) -> &[ModuleConfig] {
        &self.modules
    }

    fn outputs(&self) -> Option<&IndexMap<String, Value>> {
        self.outputs.as_ref()
    }
}

/// A parsed datacenter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterConfig {
    /// Config format version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Datacenter-level variables, visible to hook predicates and inputs
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, Value>,
    /// Hook lists keyed by resource type
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<ResourceType, Vec<HookConfig>>,
    /// Directory the config was loaded from; build paths resolve here
    #[serde(skip)]
    pub source_dir: PathBuf,
}

impl DatacenterConfig {
    /// Parse a datacenter config from YAML text
    pub fn parse_str(content: &str) -> Result<Self> {
        let config: DatacenterConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a datacenter config from a YAML file; the file's directory
    /// becomes the build-path base
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse_str(&content)?;
        config.source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Hooks declared for a resource type, in declaration order
    pub fn hooks_for(&self, resource_type: ResourceType) -> &[HookConfig] {
        self.environment
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn validate(&self) -> Result<()> {
        for (resource_type, hooks) in &self.environment {
            for (index, hook) in hooks.iter().enumerate() {
                if hook.error.is_some() && !hook.modules.is_empty() {
                    return Err(Error::Validation(format!(
                        "{} hook #{} declares both error and modules",
                        resource_type, index
                    )));
                }
                if hook.error.is_none() && hook.modules.is_empty() {
                    return Err(Error::Validation(format!(
                        "{} hook #{} declares no modules",
                        resource_type, index
                    )));
                }
                for module in &hook.modules {
                    if module.source.is_none() && module.build.is_none() {
                        return Err(Error::ModuleWithoutSource(
                            ModuleSource::name(module).to_string(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATACENTER: &str = r#"
version: v1
variables:
  region: us-east-1
environment:
  database:
    - when: node.inputs.type == "mongodb:7"
      error: "MongoDB not supported"
    - modules:
        - build: ./modules/pg
          inputs:
            size: "${{ node.inputs.size | default:small }}"
  deployment:
    - modules:
        - source: "registry.example.com/modules/k8s-deployment"
          plugin: pulumi
"#;

    #[test]
    fn test_parse_hook_lists() {
        let config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        let hooks = config.hooks_for(ResourceType::Database);
        assert_eq!(hooks.len(), 2);
        assert!(hooks[0].error.is_some());
        assert_eq!(hooks[1].modules.len(), 1);
        assert!(config.hooks_for(ResourceType::Bucket).is_empty());
    }

    #[test]
    fn test_module_defaults() {
        let config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        let module = &config.hooks_for(ResourceType::Database)[1].modules[0];
        assert_eq!(ModuleSource::name(module), "main");
        assert_eq!(module.plugin(), DEFAULT_PLUGIN);

        let k8s = &config.hooks_for(ResourceType::Deployment)[0].modules[0];
        assert_eq!(k8s.plugin(), "pulumi");
    }

    #[test]
    fn test_build_path_resolution() {
        let config = DatacenterConfig::parse_str(DATACENTER).unwrap();
        let module = &config.hooks_for(ResourceType::Database)[1].modules[0];
        let source = module.resolve_source(Path::new("/dc/aws")).unwrap();
        assert_eq!(source, "/dc/aws/./modules/pg");

        let k8s = &config.hooks_for(ResourceType::Deployment)[0].modules[0];
        let source = k8s.resolve_source(Path::new("/dc/aws")).unwrap();
        assert_eq!(source, "registry.example.com/modules/k8s-deployment");
    }

    #[test]
    fn test_validation_rejects_empty_hook() {
        let bad = r#"
environment:
  database:
    - when: node.inputs.type == "x"
"#;
        assert!(DatacenterConfig::parse_str(bad).is_err());
    }

    #[test]
    fn test_parse_file_sets_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datacenter.yml");
        std::fs::write(&path, DATACENTER).unwrap();

        let config = DatacenterConfig::parse_file(&path).unwrap();
        assert_eq!(config.source_dir, dir.path());
    }
}
