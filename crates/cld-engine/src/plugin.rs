//! IaC plugin interface
//!
//! Plugins are opaque executors (Pulumi, OpenTofu, containers) consumed
//! through this trait. The engine looks plugins up by name in a registry;
//! `"native"` is the default when a module declares none.

use crate::{Error, Result};
use cld_schema::InputMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable prefixes forwarded verbatim into plugin
/// invocations
const FORWARDED_PREFIXES: [&str; 4] = ["AWS_", "GOOGLE_", "AZURE_", "ARM_"];

/// Exact environment variables forwarded verbatim
const FORWARDED_VARS: [&str; 1] = ["KUBECONFIG"];

/// Collect the cloud credential environment to forward to a plugin
pub fn forwarded_environment() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| {
            FORWARDED_VARS.contains(&key.as_str())
                || FORWARDED_PREFIXES
                    .iter()
                    .any(|prefix| key.starts_with(prefix))
        })
        .collect()
}

/// Options for one plugin operation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Resolved module source
    pub module_source: String,
    /// Evaluated module inputs
    pub inputs: InputMap,
    /// Environment forwarded to the plugin process
    pub environment: HashMap<String, String>,
    /// Working directory for the invocation
    pub work_dir: Option<PathBuf>,
    /// Prior opaque state, present on update/destroy
    pub state: Option<Vec<u8>>,
}

/// Result of an apply operation
#[derive(Debug, Clone, Default)]
pub struct ApplyResult {
    /// Outputs the module produced
    pub outputs: InputMap,
    /// Opaque state to persist
    pub state: Vec<u8>,
}

/// Result of a preview operation
#[derive(Debug, Clone, Default)]
pub struct PreviewResult {
    /// Rendered change descriptions
    pub changes: Vec<String>,
}

/// One detected drift between stored state and reality
#[derive(Debug, Clone)]
pub struct Drift {
    /// Property path that drifted
    pub path: String,
    /// Value the state expects
    pub expected: String,
    /// Value the provider reports
    pub actual: String,
}

/// Result of a refresh operation
#[derive(Debug, Clone, Default)]
pub struct RefreshResult {
    /// Detected drifts
    pub drifts: Vec<Drift>,
}

/// Options for importing existing infrastructure
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Base run options
    pub run: RunOptions,
    /// Provider addresses to import
    pub addresses: Vec<String>,
}

/// Result of an import operation
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    /// Outputs derived from the imported resources
    pub outputs: InputMap,
    /// Opaque state to persist
    pub state: Vec<u8>,
    /// Addresses that were actually imported
    pub imported_addresses: Vec<String>,
}

/// Trait for IaC plugin implementations
#[async_trait::async_trait]
pub trait IacPlugin: Send + Sync {
    /// Create or update infrastructure
    async fn apply(&self, opts: RunOptions) -> Result<ApplyResult>;

    /// Show what an apply would change, without mutating anything
    async fn preview(&self, opts: RunOptions) -> Result<PreviewResult>;

    /// Tear infrastructure down
    async fn destroy(&self, opts: RunOptions) -> Result<()>;

    /// Compare stored state against the provider's reality
    async fn refresh(&self, opts: RunOptions) -> Result<RefreshResult>;

    /// Adopt existing infrastructure into state
    async fn import(&self, opts: ImportOptions) -> Result<ImportResult>;
}

/// Registry of plugins, consulted by name
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn IacPlugin>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Register a plugin under a name
    pub fn register(&mut self, name: &str, plugin: Arc<dyn IacPlugin>) {
        self.plugins.insert(name.to_string(), plugin);
    }

    /// Look up a plugin by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn IacPlugin>> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))
    }

    /// Registered plugin names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
