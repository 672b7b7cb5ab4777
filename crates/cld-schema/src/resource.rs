//! Closed resource type enum
//!
//! Every node in a graph carries one of these types. The wire form is the
//! camelCase singular ("database", "dockerBuild"); component spec sections
//! and expression scopes use the plural form ("databases", "dockerBuilds").

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of a logical resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    /// A managed database instance
    Database,
    /// A user/credential pair scoped to a database
    DatabaseUser,
    /// An object storage bucket
    Bucket,
    /// A managed encryption key
    EncryptionKey,
    /// An outbound mail relay
    Smtp,
    /// A long-running workload
    Deployment,
    /// A serverless function
    Function,
    /// An internal service endpoint
    Service,
    /// An externally routable ingress
    Route,
    /// A scheduled job
    Cronjob,
    /// An opaque secret value
    Secret,
    /// A container image build
    DockerBuild,
    /// A one-shot task
    Task,
    /// An observability rule or dashboard
    Observability,
    /// A network port claim (usually inferred)
    Port,
    /// A network policy between services
    NetworkPolicy,
}

impl ResourceType {
    /// All resource types, in declaration order
    pub const ALL: [ResourceType; 16] = [
        ResourceType::Database,
        ResourceType::DatabaseUser,
        ResourceType::Bucket,
        ResourceType::EncryptionKey,
        ResourceType::Smtp,
        ResourceType::Deployment,
        ResourceType::Function,
        ResourceType::Service,
        ResourceType::Route,
        ResourceType::Cronjob,
        ResourceType::Secret,
        ResourceType::DockerBuild,
        ResourceType::Task,
        ResourceType::Observability,
        ResourceType::Port,
        ResourceType::NetworkPolicy,
    ];

    /// Stable singular wire name, used inside node ids and state keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Database => "database",
            ResourceType::DatabaseUser => "databaseUser",
            ResourceType::Bucket => "bucket",
            ResourceType::EncryptionKey => "encryptionKey",
            ResourceType::Smtp => "smtp",
            ResourceType::Deployment => "deployment",
            ResourceType::Function => "function",
            ResourceType::Service => "service",
            ResourceType::Route => "route",
            ResourceType::Cronjob => "cronjob",
            ResourceType::Secret => "secret",
            ResourceType::DockerBuild => "dockerBuild",
            ResourceType::Task => "task",
            ResourceType::Observability => "observability",
            ResourceType::Port => "port",
            ResourceType::NetworkPolicy => "networkPolicy",
        }
    }

    /// Plural section name as it appears in component specs
    pub fn section_name(&self) -> &'static str {
        match self {
            ResourceType::Database => "databases",
            ResourceType::DatabaseUser => "databaseUsers",
            ResourceType::Bucket => "buckets",
            ResourceType::EncryptionKey => "encryptionKeys",
            ResourceType::Smtp => "smtp",
            ResourceType::Deployment => "deployments",
            ResourceType::Function => "functions",
            ResourceType::Service => "services",
            ResourceType::Route => "routes",
            ResourceType::Cronjob => "cronjobs",
            ResourceType::Secret => "secrets",
            ResourceType::DockerBuild => "dockerBuilds",
            ResourceType::Task => "tasks",
            ResourceType::Observability => "observability",
            ResourceType::Port => "ports",
            ResourceType::NetworkPolicy => "networkPolicies",
        }
    }

    /// Map an expression scope or spec section (plural) to a type
    pub fn from_scope(scope: &str) -> Option<ResourceType> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.section_name() == scope)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownResourceType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for ty in ResourceType::ALL {
            assert_eq!(ty.as_str().parse::<ResourceType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&ResourceType::DockerBuild).unwrap();
        assert_eq!(json, "\"dockerBuild\"");
        let parsed: ResourceType = serde_json::from_str("\"databaseUser\"").unwrap();
        assert_eq!(parsed, ResourceType::DatabaseUser);
    }

    #[test]
    fn test_scope_mapping() {
        assert_eq!(
            ResourceType::from_scope("databases"),
            Some(ResourceType::Database)
        );
        assert_eq!(
            ResourceType::from_scope("dockerBuilds"),
            Some(ResourceType::DockerBuild)
        );
        assert_eq!(ResourceType::from_scope("variables"), None);
    }
}
