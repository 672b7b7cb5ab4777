//! Path layout for persisted records
//!
//! Every key is a forward-slash path relative to the backend root. The
//! layout is an implementation detail; callers go through the
//! coordinator.

/// `datacenters/<dc>/datacenter.state.json`
pub fn datacenter(dc: &str) -> String {
    format!("datacenters/{dc}/datacenter.state.json")
}

/// Prefix listing all datacenters
pub fn datacenters_prefix() -> String {
    "datacenters/".to_string()
}

/// `datacenters/<dc>/environments/<env>/environment.state.json`
pub fn environment(dc: &str, env: &str) -> String {
    format!("datacenters/{dc}/environments/{env}/environment.state.json")
}

/// Prefix listing all environments of a datacenter
pub fn environments_prefix(dc: &str) -> String {
    format!("datacenters/{dc}/environments/")
}

/// `…/components/<comp>/component.state.json`
pub fn component(dc: &str, env: &str, comp: &str) -> String {
    format!("datacenters/{dc}/environments/{env}/components/{comp}/component.state.json")
}

/// Prefix listing all components of an environment
pub fn components_prefix(dc: &str, env: &str) -> String {
    format!("datacenters/{dc}/environments/{env}/components/")
}

/// `…/resources/<type>.<name>.state.json`
pub fn resource(dc: &str, env: &str, comp: &str, key: &str) -> String {
    format!(
        "datacenters/{dc}/environments/{env}/components/{comp}/resources/{key}.state.json"
    )
}

/// Prefix listing all resources of a component
pub fn resources_prefix(dc: &str, env: &str, comp: &str) -> String {
    format!("datacenters/{dc}/environments/{env}/components/{comp}/resources/")
}

/// Datacenter-scoped module state
pub fn datacenter_module(dc: &str, name: &str) -> String {
    format!("datacenters/{dc}/modules/{name}.state.json")
}

/// Prefix listing datacenter-scoped modules
pub fn datacenter_modules_prefix(dc: &str) -> String {
    format!("datacenters/{dc}/modules/")
}

/// Environment-scoped module state
pub fn environment_module(dc: &str, env: &str, name: &str) -> String {
    format!("datacenters/{dc}/environments/{env}/modules/{name}.state.json")
}

/// Prefix listing environment-scoped modules
pub fn environment_modules_prefix(dc: &str, env: &str) -> String {
    format!("datacenters/{dc}/environments/{env}/modules/")
}

/// Lock file for an environment-scoped operation
pub fn lock(dc: &str, env: &str) -> String {
    format!("datacenters/{dc}/environments/{env}/.lock.json")
}

/// Extract the last path segment without the `.state.json` suffix
pub fn record_name(path: &str) -> Option<&str> {
    path.rsplit('/').next()?.strip_suffix(".state.json")
}
