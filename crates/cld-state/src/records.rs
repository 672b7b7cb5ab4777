//! Persisted state records
//!
//! One JSON document per record. Field names are stable; opaque IaC state
//! travels base64-encoded.

use chrono::{DateTime, Utc};
use cld_schema::{InputMap, ResourceType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Serde helpers for opaque IaC state bytes
mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Status of a persisted resource or module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceStatus {
    /// Last operation succeeded
    Ready,
    /// Last operation failed; see `status_reason`
    Failed,
}

/// Per-module state captured inside a multi-module resource row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    /// Resolved module source
    pub source: String,
    /// Plugin that executed the module
    pub plugin: String,
    /// Inputs passed to the module
    pub inputs: InputMap,
    /// Outputs the module returned
    #[serde(default, skip_serializing_if = "InputMap::is_empty")]
    pub outputs: InputMap,
    /// Opaque plugin state
    #[serde(default, with = "b64", skip_serializing_if = "Option::is_none")]
    pub iac_state: Option<Vec<u8>>,
    /// Module status
    pub status: ResourceStatus,
}

/// One persisted resource row, keyed by `"<type>.<name>"` within its
/// component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    /// Owning component
    pub component: String,
    /// Declared resource name
    pub name: String,
    /// Resource kind
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Identity of the hook that realized the resource
    pub hook: String,
    /// Primary module source
    pub module: String,
    /// Resolved inputs at apply time
    pub inputs: InputMap,
    /// Outputs returned by the plugin
    #[serde(default, skip_serializing_if = "InputMap::is_empty")]
    pub outputs: InputMap,
    /// Opaque plugin state
    #[serde(default, with = "b64", skip_serializing_if = "Option::is_none")]
    pub iac_state: Option<Vec<u8>>,
    /// Per-module state for multi-module hooks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_states: Option<IndexMap<String, ModuleState>>,
    /// Node ids this resource depended on; drives destroy ordering
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Row status
    pub status: ResourceStatus,
    /// Failure reason when status is Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// First write time
    pub created_at: DateTime<Utc>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    /// Storage key within the component: `"<type>.<name>"`
    pub fn key(&self) -> String {
        Self::key_for(self.resource_type, &self.name)
    }

    /// Storage key for an arbitrary type/name pair
    pub fn key_for(resource_type: ResourceType, name: &str) -> String {
        format!("{}.{}", resource_type, name)
    }

    /// Node id of this row: `"<component>/<type>/<name>"`
    pub fn node_id(&self) -> String {
        format!("{}/{}/{}", self.component, self.resource_type, self.name)
    }
}

/// Persisted component record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    /// Component name
    pub name: String,
    /// Names of other components this one depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// First deploy time
    pub created_at: DateTime<Utc>,
    /// Last deploy time
    pub updated_at: DateTime<Utc>,
}

/// Persisted environment record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRecord {
    /// Environment name
    pub name: String,
    /// Datacenter the environment lives in
    pub datacenter: String,
    /// Environment status
    pub status: ResourceStatus,
    /// Variables the environment was deployed with
    #[serde(default, skip_serializing_if = "InputMap::is_empty")]
    pub variables: InputMap,
    /// First deploy time
    pub created_at: DateTime<Utc>,
    /// Last deploy time
    pub updated_at: DateTime<Utc>,
}

/// Persisted datacenter record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterRecord {
    /// Datacenter name
    pub name: String,
    /// First registration time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// A component record assembled with its resource rows
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentState {
    /// The stored record
    #[serde(flatten)]
    pub record: ComponentRecord,
    /// Resource rows keyed by `"<type>.<name>"`
    pub resources: IndexMap<String, ResourceState>,
}

/// An environment record assembled with its components
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentState {
    /// The stored record
    #[serde(flatten)]
    pub record: EnvironmentRecord,
    /// Component states keyed by name
    pub components: IndexMap<String, ComponentState>,
    /// Environment-scoped module states keyed by name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub modules: IndexMap<String, ModuleState>,
}

impl EnvironmentState {
    /// Find a resource row by component, type, and name
    pub fn resource(
        &self,
        component: &str,
        resource_type: ResourceType,
        name: &str,
    ) -> Option<&ResourceState> {
        self.components
            .get(component)?
            .resources
            .get(&ResourceState::key_for(resource_type, name))
    }

    /// Every resource row across all components
    pub fn all_resources(&self) -> impl Iterator<Item = &ResourceState> {
        self.components
            .values()
            .flat_map(|component| component.resources.values())
    }
}
