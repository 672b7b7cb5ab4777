//! Typed CRUD surface over the path layout
//!
//! The coordinator owns all resource state. The executor holds short
//! lived read/write handles through it and never touches backend paths
//! directly. Mutating operations are expected to run under a lock lease
//! acquired from [`StateCoordinator::lock`].

use crate::lock::{LockLease, LockScope};
use crate::records::{
    ComponentRecord, ComponentState, DatacenterRecord, EnvironmentRecord, EnvironmentState,
    ModuleState, ResourceState,
};
use crate::{backend::StateBackend, paths, Error, Result};
use cld_schema::ResourceType;
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Coordinates reads and writes of deployment state
#[derive(Clone)]
pub struct StateCoordinator {
    backend: Arc<dyn StateBackend>,
}

impl StateCoordinator {
    /// Create a coordinator over a backend
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self { backend }
    }

    /// The underlying backend
    pub fn backend(&self) -> &Arc<dyn StateBackend> {
        &self.backend
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let bytes = self.backend.read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn put_json<T: Serialize>(&self, path: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.backend.write(path, &bytes).await
    }

    async fn read_all<T: DeserializeOwned>(&self, prefix: &str, suffix: &str) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for key in self.backend.list(prefix).await? {
            if key.ends_with(suffix) {
                records.push(self.get_json(&key).await?);
            }
        }
        Ok(records)
    }

    // --- datacenters -----------------------------------------------------

    /// Store a datacenter record
    pub async fn put_datacenter(&self, record: &DatacenterRecord) -> Result<()> {
        self.put_json(&paths::datacenter(&record.name), record).await
    }

    /// Read a datacenter record
    pub async fn get_datacenter(&self, name: &str) -> Result<DatacenterRecord> {
        self.get_json(&paths::datacenter(name)).await
    }

    /// Remove a datacenter record
    pub async fn delete_datacenter(&self, name: &str) -> Result<()> {
        self.backend.delete(&paths::datacenter(name)).await
    }

    /// List all datacenter records
    pub async fn list_datacenters(&self) -> Result<Vec<DatacenterRecord>> {
        self.read_all(&paths::datacenters_prefix(), "/datacenter.state.json")
            .await
    }

    // --- environments ----------------------------------------------------

    /// Store an environment record
    pub async fn put_environment(&self, record: &EnvironmentRecord) -> Result<()> {
        self.put_json(
            &paths::environment(&record.datacenter, &record.name),
            record,
        )
        .await
    }

    /// Read an environment record
    pub async fn get_environment(&self, dc: &str, env: &str) -> Result<EnvironmentRecord> {
        self.get_json(&paths::environment(dc, env)).await
    }

    /// Remove an environment record
    pub async fn delete_environment(&self, dc: &str, env: &str) -> Result<()> {
        self.backend.delete(&paths::environment(dc, env)).await
    }

    /// List environment records of a datacenter
    pub async fn list_environments(&self, dc: &str) -> Result<Vec<EnvironmentRecord>> {
        self.read_all(&paths::environments_prefix(dc), "/environment.state.json")
            .await
    }

    // --- components ------------------------------------------------------

    /// Store a component record
    pub async fn put_component(&self, dc: &str, env: &str, record: &ComponentRecord) -> Result<()> {
        self.put_json(&paths::component(dc, env, &record.name), record)
            .await
    }

    /// Read a component record
    pub async fn get_component(&self, dc: &str, env: &str, name: &str) -> Result<ComponentRecord> {
        self.get_json(&paths::component(dc, env, name)).await
    }

    /// List component records of an environment
    pub async fn list_components(&self, dc: &str, env: &str) -> Result<Vec<ComponentRecord>> {
        self.read_all(&paths::components_prefix(dc, env), "/component.state.json")
            .await
    }

    /// Names of components that declare a dependency on `name`
    pub async fn dependent_components(
        &self,
        dc: &str,
        env: &str,
        name: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .list_components(dc, env)
            .await?
            .into_iter()
            .filter(|record| record.dependencies.iter().any(|dep| dep == name))
            .map(|record| record.name)
            .collect())
    }

    // --- resources -------------------------------------------------------

    /// Store a resource row under its component
    pub async fn put_resource(&self, dc: &str, env: &str, row: &ResourceState) -> Result<()> {
        debug!(component = %row.component, key = %row.key(), "writing resource state");
        self.put_json(&paths::resource(dc, env, &row.component, &row.key()), row)
            .await
    }

    /// Read a resource row
    pub async fn get_resource(
        &self,
        dc: &str,
        env: &str,
        component: &str,
        resource_type: ResourceType,
        name: &str,
    ) -> Result<ResourceState> {
        let key = ResourceState::key_for(resource_type, name);
        self.get_json(&paths::resource(dc, env, component, &key))
            .await
    }

    /// List resource rows of a component
    pub async fn list_resources(
        &self,
        dc: &str,
        env: &str,
        component: &str,
    ) -> Result<Vec<ResourceState>> {
        self.read_all(&paths::resources_prefix(dc, env, component), ".state.json")
            .await
    }

    /// Remove a resource row, pruning empty component and environment
    /// records behind it
    ///
    /// An environment record is removed only when its last resource goes.
    pub async fn delete_resource(
        &self,
        dc: &str,
        env: &str,
        component: &str,
        resource_type: ResourceType,
        name: &str,
    ) -> Result<()> {
        let key = ResourceState::key_for(resource_type, name);
        self.backend
            .delete(&paths::resource(dc, env, component, &key))
            .await?;

        let remaining = self
            .backend
            .list(&paths::resources_prefix(dc, env, component))
            .await?;
        if !remaining.is_empty() {
            return Ok(());
        }

        info!(component, "last resource removed, pruning component record");
        self.backend
            .delete(&paths::component(dc, env, component))
            .await?;

        let siblings = self
            .backend
            .list(&paths::components_prefix(dc, env))
            .await?;
        if siblings.is_empty() {
            info!(env, "last component removed, pruning environment record");
            self.backend.delete(&paths::environment(dc, env)).await?;
        }
        Ok(())
    }

    // --- modules ---------------------------------------------------------

    /// Store a datacenter-scoped module state
    pub async fn put_datacenter_module(
        &self,
        dc: &str,
        name: &str,
        state: &ModuleState,
    ) -> Result<()> {
        self.put_json(&paths::datacenter_module(dc, name), state).await
    }

    /// Read a datacenter-scoped module state
    pub async fn get_datacenter_module(&self, dc: &str, name: &str) -> Result<ModuleState> {
        self.get_json(&paths::datacenter_module(dc, name)).await
    }

    /// Remove a datacenter-scoped module state
    pub async fn delete_datacenter_module(&self, dc: &str, name: &str) -> Result<()> {
        self.backend.delete(&paths::datacenter_module(dc, name)).await
    }

    /// Store an environment-scoped module state
    pub async fn put_environment_module(
        &self,
        dc: &str,
        env: &str,
        name: &str,
        state: &ModuleState,
    ) -> Result<()> {
        self.put_json(&paths::environment_module(dc, env, name), state)
            .await
    }

    /// Read an environment-scoped module state
    pub async fn get_environment_module(
        &self,
        dc: &str,
        env: &str,
        name: &str,
    ) -> Result<ModuleState> {
        self.get_json(&paths::environment_module(dc, env, name)).await
    }

    // --- assembled views -------------------------------------------------

    /// Assemble the full environment state: record, components, resources,
    /// and environment-scoped modules
    pub async fn environment_state(&self, dc: &str, env: &str) -> Result<EnvironmentState> {
        let record = self.get_environment(dc, env).await?;

        let mut components = IndexMap::new();
        for component_record in self.list_components(dc, env).await? {
            let rows = self
                .list_resources(dc, env, &component_record.name)
                .await?;
            let resources = rows.into_iter().map(|row| (row.key(), row)).collect();
            components.insert(
                component_record.name.clone(),
                ComponentState {
                    record: component_record,
                    resources,
                },
            );
        }

        let mut modules = IndexMap::new();
        for key in self
            .backend
            .list(&paths::environment_modules_prefix(dc, env))
            .await?
        {
            if let Some(name) = paths::record_name(&key) {
                modules.insert(name.to_string(), self.get_json(&key).await?);
            }
        }

        Ok(EnvironmentState {
            record,
            components,
            modules,
        })
    }

    // --- locking ---------------------------------------------------------

    /// Acquire the lock for an environment-scoped operation
    ///
    /// A live lease held by someone else fails with [`Error::Locked`]; a
    /// stale lease (older than the staleness window) is taken over.
    pub async fn lock(&self, scope: LockScope) -> Result<LockLease> {
        let path = paths::lock(&scope.datacenter, &scope.environment);

        match self.get_json::<LockLease>(&path).await {
            Ok(existing) if !existing.is_stale() => {
                return Err(Error::Locked {
                    who: existing.scope.who,
                    operation: existing.scope.operation,
                    since: existing.acquired_at,
                });
            }
            Ok(stale) => {
                info!(id = %stale.id, who = %stale.scope.who, "taking over stale lock");
            }
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let lease = LockLease::new(scope);
        self.put_json(&path, &lease).await?;
        debug!(id = %lease.id, "lock acquired");
        Ok(lease)
    }

    /// Release a lease; fails if the stored lease is no longer ours
    pub async fn unlock(&self, lease: &LockLease) -> Result<()> {
        let path = paths::lock(&lease.scope.datacenter, &lease.scope.environment);
        let current: LockLease = self.get_json(&path).await?;
        if current.id != lease.id {
            return Err(Error::StaleLease(lease.id));
        }
        self.backend.delete(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::records::ResourceStatus;
    use chrono::Utc;
    use cld_schema::InputMap;

    fn coordinator() -> StateCoordinator {
        StateCoordinator::new(Arc::new(MemoryBackend::new()))
    }

    fn row(component: &str, resource_type: ResourceType, name: &str) -> ResourceState {
        let now = Utc::now();
        ResourceState {
            component: component.to_string(),
            name: name.to_string(),
            resource_type,
            hook: "database#0".to_string(),
            module: "./modules/pg".to_string(),
            inputs: InputMap::new(),
            outputs: InputMap::new(),
            iac_state: None,
            module_states: None,
            depends_on: vec![],
            status: ResourceStatus::Ready,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn env_record() -> EnvironmentRecord {
        let now = Utc::now();
        EnvironmentRecord {
            name: "staging".to_string(),
            datacenter: "aws".to_string(),
            status: ResourceStatus::Ready,
            variables: InputMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn component_record(name: &str, dependencies: &[&str]) -> ComponentRecord {
        let now = Utc::now();
        ComponentRecord {
            name: name.to_string(),
            dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    #[smol_potat::test]
    async fn test_resource_round_trip() {
        let coordinator = coordinator();
        let row = row("app", ResourceType::Database, "main");

        coordinator.put_resource("aws", "staging", &row).await.unwrap();
        let read = coordinator
            .get_resource("aws", "staging", "app", ResourceType::Database, "main")
            .await
            .unwrap();
        assert_eq!(read.name, "main");
        assert_eq!(read.module, "./modules/pg");

        assert!(matches!(
            coordinator
                .get_resource("aws", "staging", "app", ResourceType::Database, "gone")
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[smol_potat::test]
    async fn test_delete_prunes_empty_records() {
        let coordinator = coordinator();

        coordinator.put_environment(&env_record()).await.unwrap();
        coordinator
            .put_component("aws", "staging", &component_record("app", &[]))
            .await
            .unwrap();
        coordinator
            .put_resource("aws", "staging", &row("app", ResourceType::Database, "main"))
            .await
            .unwrap();

        coordinator
            .delete_resource("aws", "staging", "app", ResourceType::Database, "main")
            .await
            .unwrap();

        // Component and environment records pruned with the last resource
        assert!(matches!(
            coordinator.get_component("aws", "staging", "app").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            coordinator.get_environment("aws", "staging").await,
            Err(Error::NotFound(_))
        ));
    }

    #[smol_potat::test]
    async fn test_environment_survives_while_resources_remain() {
        let coordinator = coordinator();

        coordinator.put_environment(&env_record()).await.unwrap();
        coordinator
            .put_component("aws", "staging", &component_record("app", &[]))
            .await
            .unwrap();
        coordinator
            .put_resource("aws", "staging", &row("app", ResourceType::Database, "main"))
            .await
            .unwrap();
        coordinator
            .put_resource(
                "aws",
                "staging",
                &row("app", ResourceType::Deployment, "api"),
            )
            .await
            .unwrap();

        coordinator
            .delete_resource("aws", "staging", "app", ResourceType::Database, "main")
            .await
            .unwrap();

        assert!(coordinator.get_environment("aws", "staging").await.is_ok());
        assert!(coordinator.get_component("aws", "staging", "app").await.is_ok());
    }

    #[smol_potat::test]
    async fn test_dependent_components() {
        let coordinator = coordinator();
        coordinator
            .put_component("aws", "staging", &component_record("shared-db", &[]))
            .await
            .unwrap();
        coordinator
            .put_component("aws", "staging", &component_record("api", &["shared-db"]))
            .await
            .unwrap();

        let dependents = coordinator
            .dependent_components("aws", "staging", "shared-db")
            .await
            .unwrap();
        assert_eq!(dependents, vec!["api"]);

        let none = coordinator
            .dependent_components("aws", "staging", "api")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[smol_potat::test]
    async fn test_environment_state_assembly() {
        let coordinator = coordinator();
        coordinator.put_environment(&env_record()).await.unwrap();
        coordinator
            .put_component("aws", "staging", &component_record("app", &[]))
            .await
            .unwrap();
        coordinator
            .put_resource("aws", "staging", &row("app", ResourceType::Database, "main"))
            .await
            .unwrap();

        let state = coordinator.environment_state("aws", "staging").await.unwrap();
        assert_eq!(state.record.name, "staging");
        assert_eq!(state.components.len(), 1);
        assert!(state
            .resource("app", ResourceType::Database, "main")
            .is_some());
        assert_eq!(state.all_resources().count(), 1);
    }

    #[smol_potat::test]
    async fn test_lock_conflict_and_release() {
        let coordinator = coordinator();
        let scope = LockScope {
            datacenter: "aws".to_string(),
            environment: "staging".to_string(),
            component: None,
            operation: "deploy".to_string(),
            who: "alice@laptop".to_string(),
        };

        let lease = coordinator.lock(scope.clone()).await.unwrap();

        let mut second = scope.clone();
        second.who = "bob@laptop".to_string();
        let err = coordinator.lock(second).await.unwrap_err();
        assert!(matches!(err, Error::Locked { who, .. } if who == "alice@laptop"));

        coordinator.unlock(&lease).await.unwrap();
        let scope2 = LockScope {
            who: "bob@laptop".to_string(),
            ..scope
        };
        assert!(coordinator.lock(scope2).await.is_ok());
    }

    #[smol_potat::test]
    async fn test_stale_lock_takeover() {
        let coordinator = coordinator();
        let scope = LockScope {
            datacenter: "aws".to_string(),
            environment: "staging".to_string(),
            component: None,
            operation: "deploy".to_string(),
            who: "alice@laptop".to_string(),
        };

        // Plant a stale lease directly
        let mut stale = LockLease::new(scope.clone());
        stale.acquired_at = Utc::now() - chrono::Duration::hours(2);
        let path = paths::lock("aws", "staging");
        coordinator
            .backend()
            .write(&path, &serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();

        let taken = coordinator.lock(scope).await.unwrap();
        assert_ne!(taken.id, stale.id);
    }
}
