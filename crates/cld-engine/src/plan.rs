//! Plan model
//!
//! A plan is a snapshot: an ordered sequence of resource changes with a
//! summary. Plans are never mutated after construction.

use cld_graph::NodeId;
use cld_schema::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Property names carrying one of these substrings (case-insensitive) are
/// redacted in rendered diffs
const SENSITIVE_MARKERS: [&str; 10] = [
    "password",
    "secret",
    "key",
    "token",
    "credential",
    "private",
    "auth",
    "api_key",
    "apikey",
    "access_key",
];

/// Whether a property path names something sensitive
pub(crate) fn is_sensitive_property(path: &str) -> bool {
    let lowered = path.to_lowercase();
    SENSITIVE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Plan action for a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The resource does not exist yet
    Create,
    /// Inputs changed in place
    Update,
    /// Hook or module identity changed; destroy then apply
    Replace,
    /// The resource is being removed
    Delete,
    /// Nothing to do
    Noop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::Delete => "delete",
            Action::Noop => "noop",
        };
        f.write_str(label)
    }
}

/// One property-level difference between stored and desired inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDiff {
    /// Dotted property path
    pub path: String,
    /// Previous value, absent on addition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// New value, absent on removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    /// Whether rendered output must redact the values
    pub sensitive: bool,
}

impl PropertyDiff {
    /// Render the diff, redacting sensitive values
    pub fn render(&self) -> String {
        let display = |value: &Option<Value>| -> String {
            if self.sensitive {
                "(sensitive)".to_string()
            } else {
                value
                    .as_ref()
                    .map(Value::to_display_string)
                    .unwrap_or_else(|| "(none)".to_string())
            }
        };
        format!(
            "{}: {} -> {}",
            self.path,
            display(&self.old_value),
            display(&self.new_value)
        )
    }
}

/// A planned change for one node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    /// The node the change applies to
    pub node_id: NodeId,
    /// What will happen
    pub action: Action,
    /// Why
    pub reason: String,
    /// Property-level differences, for updates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property_diffs: Vec<PropertyDiff>,
}

/// Counts per action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    /// Resources to create
    pub to_create: usize,
    /// Resources to update
    pub to_update: usize,
    /// Resources to replace
    pub to_replace: usize,
    /// Resources to delete
    pub to_delete: usize,
    /// Resources left untouched
    pub no_change: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.to_create, self.to_update, self.to_replace, self.to_delete, self.no_change
        )
    }
}

/// An ordered plan for one environment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Target environment
    pub environment: String,
    /// Target datacenter
    pub datacenter: String,
    /// Changes in execution order
    pub changes: Vec<ResourceChange>,
    /// Counts per action
    pub summary: PlanSummary,
}

impl Plan {
    /// Build a plan from ordered changes, computing the summary
    pub fn new(
        environment: impl Into<String>,
        datacenter: impl Into<String>,
        changes: Vec<ResourceChange>,
    ) -> Self {
        let mut summary = PlanSummary::default();
        for change in &changes {
            match change.action {
                Action::Create => summary.to_create += 1,
                Action::Update => summary.to_update += 1,
                Action::Replace => summary.to_replace += 1,
                Action::Delete => summary.to_delete += 1,
                Action::Noop => summary.no_change += 1,
            }
        }
        Self {
            environment: environment.into(),
            datacenter: datacenter.into(),
            changes,
            summary,
        }
    }

    /// True when every change is a Noop
    pub fn is_empty(&self) -> bool {
        self.changes
            .iter()
            .all(|change| change.action == Action::Noop)
    }

    /// Look up the planned change for a node
    pub fn change_for(&self, node_id: &NodeId) -> Option<&ResourceChange> {
        self.changes.iter().find(|change| &change.node_id == node_id)
    }

    /// Render the plan as console lines, redacting sensitive diffs
    pub fn render(&self) -> String {
        let mut out = String::new();
        for change in &self.changes {
            if change.action == Action::Noop {
                continue;
            }
            out.push_str(&format!(
                "{} {} ({})\n",
                change.action, change.node_id, change.reason
            ));
            for diff in &change.property_diffs {
                out.push_str(&format!("    {}\n", diff.render()));
            }
        }
        out.push_str(&format!("Plan: {}\n", self.summary));
        out
    }
}

/// Compute property diffs between stored and desired input maps
pub(crate) fn diff_inputs(
    stored: &IndexMap<String, Value>,
    desired: &IndexMap<String, Value>,
) -> Vec<PropertyDiff> {
    let mut diffs = Vec::new();
    diff_maps("", stored, desired, &mut diffs);
    diffs
}

fn diff_maps(
    prefix: &str,
    stored: &IndexMap<String, Value>,
    desired: &IndexMap<String, Value>,
    diffs: &mut Vec<PropertyDiff>,
) {
    for (key, desired_value) in desired {
        let path = join_path(prefix, key);
        match stored.get(key) {
            None => diffs.push(diff_entry(path, None, Some(desired_value.clone()))),
            Some(stored_value) => diff_values(&path, stored_value, desired_value, diffs),
        }
    }
    for (key, stored_value) in stored {
        if !desired.contains_key(key) {
            let path = join_path(prefix, key);
            diffs.push(diff_entry(path, Some(stored_value.clone()), None));
        }
    }
}

fn diff_values(path: &str, stored: &Value, desired: &Value, diffs: &mut Vec<PropertyDiff>) {
    match (stored, desired) {
        (Value::Map(stored_map), Value::Map(desired_map)) => {
            diff_maps(path, stored_map, desired_map, diffs)
        }
        _ if stored == desired => {}
        _ => diffs.push(diff_entry(
            path.to_string(),
            Some(stored.clone()),
            Some(desired.clone()),
        )),
    }
}

fn diff_entry(path: String, old_value: Option<Value>, new_value: Option<Value>) -> PropertyDiff {
    let sensitive = is_sensitive_property(&path);
    PropertyDiff {
        path,
        old_value,
        new_value,
        sensitive,
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_diff_detects_changed_property() {
        let stored = map(&[("replicas", Value::Int(1)), ("image", Value::from("api:1"))]);
        let desired = map(&[("replicas", Value::Int(3)), ("image", Value::from("api:1"))]);

        let diffs = diff_inputs(&stored, &desired);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "replicas");
        assert_eq!(diffs[0].old_value, Some(Value::Int(1)));
        assert_eq!(diffs[0].new_value, Some(Value::Int(3)));
        assert!(!diffs[0].sensitive);
    }

    #[test]
    fn test_diff_recurses_into_maps() {
        let stored = map(&[(
            "environment",
            Value::Map(map(&[("LOG_LEVEL", Value::from("info"))])),
        )]);
        let desired = map(&[(
            "environment",
            Value::Map(map(&[("LOG_LEVEL", Value::from("debug"))])),
        )]);

        let diffs = diff_inputs(&stored, &desired);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "environment.LOG_LEVEL");
    }

    #[test]
    fn test_diff_additions_and_removals() {
        let stored = map(&[("old", Value::Int(1))]);
        let desired = map(&[("new", Value::Int(2))]);

        let diffs = diff_inputs(&stored, &desired);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].path, "new");
        assert_eq!(diffs[0].old_value, None);
        assert_eq!(diffs[1].path, "old");
        assert_eq!(diffs[1].new_value, None);
    }

    #[test]
    fn test_sensitive_properties_flagged_and_redacted() {
        let stored = map(&[("db_password", Value::from("hunter2"))]);
        let desired = map(&[("db_password", Value::from("correct-horse"))]);

        let diffs = diff_inputs(&stored, &desired);
        assert!(diffs[0].sensitive);

        let rendered = diffs[0].render();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("correct-horse"));
        assert!(rendered.contains("(sensitive)"));
    }

    #[test]
    fn test_sensitivity_markers() {
        for name in [
            "db_password",
            "API_KEY",
            "authToken",
            "private_ssh",
            "aws_access_key_id",
        ] {
            assert!(is_sensitive_property(name), "{name} should be sensitive");
        }
        assert!(!is_sensitive_property("replicas"));
        assert!(!is_sensitive_property("image"));
    }

    #[test]
    fn test_plan_summary_and_is_empty() {
        let changes = vec![
            ResourceChange {
                node_id: NodeId::from("app/database/main"),
                action: Action::Create,
                reason: "new resource".to_string(),
                property_diffs: vec![],
            },
            ResourceChange {
                node_id: NodeId::from("app/deployment/api"),
                action: Action::Noop,
                reason: "no changes".to_string(),
                property_diffs: vec![],
            },
        ];
        let plan = Plan::new("staging", "aws", changes);
        assert_eq!(plan.summary.to_create, 1);
        assert_eq!(plan.summary.no_change, 1);
        assert!(!plan.is_empty());

        let noop_plan = Plan::new("staging", "aws", vec![]);
        assert!(noop_plan.is_empty());
    }

    #[test]
    fn test_render_skips_noops_and_redacts() {
        let changes = vec![ResourceChange {
            node_id: NodeId::from("app/database/main"),
            action: Action::Update,
            reason: "inputs changed".to_string(),
            property_diffs: vec![PropertyDiff {
                path: "db_password".to_string(),
                old_value: Some(Value::from("hunter2")),
                new_value: Some(Value::from("new-secret")),
                sensitive: true,
            }],
        }];
        let plan = Plan::new("staging", "aws", changes);
        let rendered = plan.render();
        assert!(rendered.contains("update app/database/main"));
        assert!(!rendered.contains("hunter2"));
    }
}
