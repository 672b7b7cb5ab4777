//! Plan computation
//!
//! Walks the graph in topological order, locates each node's stored row,
//! and classifies it: no row is a Create, a changed hook or module is a
//! Replace, changed inputs are an Update, anything else a Noop. Destroy
//! plans run the other direction, ordered by the persisted rows alone.

use crate::context::{node_context, predicate_context};
use crate::plan::{diff_inputs, Action, Plan, ResourceChange};
use crate::{Error, Result};
use cld_datacenter::{DatacenterConfig, HookResolution, HookResolver};
use cld_expr::evaluate_input_map_lenient;
use cld_graph::{Graph, Node, NodeId};
use cld_schema::InputMap;
use cld_state::EnvironmentState;
use std::collections::HashMap;
use tracing::debug;

/// Computes plans for one datacenter
pub struct Planner<'a> {
    config: &'a DatacenterConfig,
}

impl<'a> Planner<'a> {
    /// Create a planner over a datacenter config
    pub fn new(config: &'a DatacenterConfig) -> Self {
        Self { config }
    }

    /// Diff the desired graph against current state
    ///
    /// Input resolution is best-effort against stored dependency outputs;
    /// templates that cannot resolve yet compare as raw text, which keeps
    /// planning free of side effects.
    pub fn plan(
        &self,
        graph: &Graph,
        state: Option<&EnvironmentState>,
        variables: &InputMap,
    ) -> Result<Plan> {
        let resolver = HookResolver::new(self.config);
        let order = graph.topological_sort()?;

        // Seed outputs from what previous runs persisted
        let mut stored_outputs: HashMap<NodeId, InputMap> = HashMap::new();
        if let Some(state) = state {
            for row in state.all_resources() {
                stored_outputs.insert(NodeId::from(row.node_id().as_str()), row.outputs.clone());
            }
        }

        let mut changes = Vec::with_capacity(order.len());
        for id in &order {
            let node = graph.get(id).expect("sorted ids come from the graph");

            let ctx = node_context(
                node,
                &graph.environment,
                &graph.datacenter,
                variables,
                &stored_outputs,
            );
            let resolved_inputs = evaluate_input_map_lenient(&node.inputs, &ctx)?;
            // Hook predicates see the already-resolved inputs and nothing
            // of the output scopes
            let when_ctx = predicate_context(
                node,
                &graph.environment,
                &graph.datacenter,
                variables,
                &resolved_inputs,
            );

            let hook = match resolver.match_hook(node.resource_type, &when_ctx)? {
                HookResolution::Matched(matched) => Some((
                    matched.identity(),
                    resolver.module_sources(&matched)?,
                )),
                _ => None,
            };

            let row = state.and_then(|s| {
                s.resource(&node.component, node.resource_type, &node.name)
            });

            let change = match row {
                None => ResourceChange {
                    node_id: id.clone(),
                    action: Action::Create,
                    reason: "new resource".to_string(),
                    property_diffs: vec![],
                },
                Some(row) => {
                    let hook_changed = hook.as_ref().is_some_and(|(identity, sources)| {
                        identity != &row.hook
                            || sources.first().is_some_and(|source| source != &row.module)
                    });
                    if hook_changed {
                        ResourceChange {
                            node_id: id.clone(),
                            action: Action::Replace,
                            reason: "hook or module changed".to_string(),
                            property_diffs: vec![],
                        }
                    } else {
                        let diffs = diff_inputs(&row.inputs, &resolved_inputs);
                        if diffs.is_empty() {
                            ResourceChange {
                                node_id: id.clone(),
                                action: Action::Noop,
                                reason: "no changes".to_string(),
                                property_diffs: vec![],
                            }
                        } else {
                            ResourceChange {
                                node_id: id.clone(),
                                action: Action::Update,
                                reason: "inputs changed".to_string(),
                                property_diffs: diffs,
                            }
                        }
                    }
                }
            };
            debug!(node = %id, action = %change.action, "planned");
            changes.push(change);
        }

        Ok(Plan::new(
            graph.environment.clone(),
            graph.datacenter.clone(),
            changes,
        ))
    }

    /// Plan the removal of every stored resource, dependents first
    pub fn plan_destroy(&self, state: &EnvironmentState) -> Result<Plan> {
        let graph = Self::destroy_graph(state, None)?;
        Self::destroy_plan_from_graph(state, graph)
    }

    /// Plan the removal of one component's resources
    ///
    /// Fails when other components declare a dependency on it, unless
    /// `force` is set.
    pub fn plan_destroy_component(
        &self,
        state: &EnvironmentState,
        component: &str,
        force: bool,
    ) -> Result<Plan> {
        let dependents: Vec<String> = state
            .components
            .values()
            .filter(|c| c.record.dependencies.iter().any(|dep| dep == component))
            .map(|c| c.record.name.clone())
            .collect();
        if !dependents.is_empty() && !force {
            return Err(Error::DependentComponents {
                component: component.to_string(),
                dependents,
            });
        }

        let graph = Self::destroy_graph(state, Some(component))?;
        Self::destroy_plan_from_graph(state, graph)
    }

    /// Build the scheduling graph for a destroy
    ///
    /// Edges are inverted relative to deploy: a dependency's delete waits
    /// on its dependents' deletes, so ready-set scheduling tears the
    /// environment down from the leaves.
    pub fn destroy_graph(state: &EnvironmentState, component: Option<&str>) -> Result<Graph> {
        let mut graph = Graph::new(
            state.record.name.clone(),
            state.record.datacenter.clone(),
        );

        let rows: Vec<_> = state
            .all_resources()
            .filter(|row| component.map_or(true, |c| row.component == c))
            .collect();

        for row in &rows {
            graph.add_node(Node::new(
                &row.component,
                row.resource_type,
                &row.name,
                row.inputs.clone(),
            ))?;
        }

        for row in &rows {
            let row_id = NodeId::from(row.node_id().as_str());
            for dep in &row.depends_on {
                let dep_id = NodeId::from(dep.as_str());
                if graph.get(&dep_id).is_some() {
                    // Inverted: the dependency's delete depends on ours
                    graph.add_edge(&dep_id, &row_id)?;
                }
            }
        }

        Ok(graph)
    }

    fn destroy_plan_from_graph(state: &EnvironmentState, graph: Graph) -> Result<Plan> {
        let order = graph.topological_sort()?;
        let changes = order
            .into_iter()
            .map(|id| ResourceChange {
                node_id: id,
                action: Action::Delete,
                reason: "destroy".to_string(),
                property_diffs: vec![],
            })
            .collect();

        Ok(Plan::new(
            state.record.name.clone(),
            state.record.datacenter.clone(),
            changes,
        ))
    }
}
