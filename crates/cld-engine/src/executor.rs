//! Plan execution
//!
//! A single driver task owns the node state map and keeps at most
//! `parallelism` node futures in flight. A node future evaluates its
//! inputs against the live outputs, resolves its hook, invokes the
//! plugin operation for its planned action, and persists its state row,
//! all before the driver marks it terminal, which is what unblocks
//! dependents. Failure containment and skip propagation happen in the
//! driver.

use crate::context::{node_context, predicate_context};
use crate::event::{DeployEvent, EventLevel, EventSender};
use crate::plan::{Action, Plan};
use crate::plugin::{forwarded_environment, PluginRegistry, RunOptions};
use crate::{Error, Result};
use chrono::Utc;
use cld_datacenter::{
    DatacenterConfig, HookResolution, HookResolver, HookSource, ModuleSource, ResolvedModule,
};
use cld_expr::{evaluate_input_map, EvalContext};
use cld_graph::{Graph, Node, NodeId, NodeState};
use cld_schema::InputMap;
use cld_state::{
    ComponentRecord, EnvironmentRecord, EnvironmentState, LockScope, ModuleState, ResourceState,
    ResourceStatus, StateCoordinator,
};
use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Options controlling one execution run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum nodes in flight at once
    pub parallelism: usize,
    /// Preview only; never mutates state
    pub dry_run: bool,
    /// Stop pulling new nodes after the first failure
    pub stop_on_error: bool,
    /// Lock holder identity
    pub who: String,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            dry_run: false,
            stop_on_error: true,
            who: "cldctl".to_string(),
        }
    }
}

/// Cooperative cancellation handle, checked between node starts
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a live token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of one execution run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Whether every non-skipped node completed
    pub success: bool,
    /// Whether the run stopped on cancellation
    pub cancelled: bool,
    /// Nodes that completed (including noops)
    pub completed: usize,
    /// Nodes that failed
    pub failed: usize,
    /// Nodes that were skipped
    pub skipped: usize,
}

enum NodeOutcome {
    Applied { outputs: InputMap },
    Deleted,
    Skipped(String),
}

/// Per-run context shared by every node future
struct RunCtx<'r> {
    datacenter: &'r str,
    environment: &'r str,
    resolver: &'r HookResolver<'r>,
    variables: &'r InputMap,
    outputs: &'r Arc<RwLock<HashMap<NodeId, InputMap>>>,
    dry_run: bool,
}

/// Drives a plan to completion
pub struct Executor {
    coordinator: StateCoordinator,
    plugins: Arc<PluginRegistry>,
    events: EventSender,
}

impl Executor {
    /// Create an executor
    pub fn new(
        coordinator: StateCoordinator,
        plugins: Arc<PluginRegistry>,
        events: EventSender,
    ) -> Self {
        Self {
            coordinator,
            plugins,
            events,
        }
    }

    /// Execute a plan against the graph snapshot it was computed from
    pub async fn execute(
        &self,
        graph: &mut Graph,
        plan: &Plan,
        config: &DatacenterConfig,
        variables: &InputMap,
        options: &ExecuteOptions,
        cancel: &CancelToken,
    ) -> Result<ExecutionSummary> {
        let resolver = HookResolver::new(config);
        let dc = graph.datacenter.clone();
        let env = graph.environment.clone();

        let destroying = !plan.changes.is_empty()
            && plan.changes.iter().all(|c| c.action == Action::Delete);

        // Prior rows seed the live outputs and carry the state bytes
        // destroys and updates need
        let prior_state = match self.coordinator.environment_state(&dc, &env).await {
            Ok(state) => Some(state),
            Err(cld_state::Error::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let mut prior_rows: HashMap<NodeId, ResourceState> = HashMap::new();
        let mut outputs_seed: HashMap<NodeId, InputMap> = HashMap::new();
        if let Some(state) = &prior_state {
            for row in state.all_resources() {
                let id = NodeId::from(row.node_id().as_str());
                outputs_seed.insert(id.clone(), row.outputs.clone());
                prior_rows.insert(id, row.clone());
            }
        }
        let outputs = Arc::new(RwLock::new(outputs_seed));

        self.events.emit(DeployEvent::new(
            EventLevel::Info,
            format!("Plan: {}", plan.summary),
        ));

        let rctx = RunCtx {
            datacenter: &dc,
            environment: &env,
            resolver: &resolver,
            variables,
            outputs: &outputs,
            dry_run: options.dry_run,
        };

        // Dry runs never touch the lock or any record
        if options.dry_run {
            return self
                .run_loop(graph, plan, &rctx, &prior_rows, options, cancel)
                .await;
        }

        let lease = self
            .coordinator
            .lock(LockScope {
                datacenter: dc.clone(),
                environment: env.clone(),
                component: None,
                operation: if destroying { "destroy" } else { "deploy" }.to_string(),
                who: options.who.clone(),
            })
            .await?;

        if !destroying {
            self.write_scope_records(graph, variables, prior_state.as_ref())
                .await?;
        }

        let result = self
            .run_loop(graph, plan, &rctx, &prior_rows, options, cancel)
            .await;

        self.coordinator.unlock(&lease).await?;
        result
    }

    /// Ensure environment and component records exist before resource
    /// rows are written under them
    async fn write_scope_records(
        &self,
        graph: &Graph,
        variables: &InputMap,
        prior_state: Option<&EnvironmentState>,
    ) -> Result<()> {
        let now = Utc::now();

        let created_at = prior_state.map(|s| s.record.created_at).unwrap_or(now);
        self.coordinator
            .put_environment(&EnvironmentRecord {
                name: graph.environment.clone(),
                datacenter: graph.datacenter.clone(),
                status: ResourceStatus::Ready,
                variables: variables.clone(),
                created_at,
                updated_at: now,
            })
            .await?;

        // Component dependency sets fall out of cross-component edges
        let mut component_deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for node in graph.nodes() {
            component_deps.entry(node.component.clone()).or_default();
            for dep in &node.depends_on {
                if let Some((dep_component, _, _)) = dep.parts() {
                    if dep_component != node.component {
                        component_deps
                            .entry(node.component.clone())
                            .or_default()
                            .insert(dep_component.to_string());
                    }
                }
            }
        }

        for (component, deps) in component_deps {
            let created_at = prior_state
                .and_then(|s| s.components.get(&component))
                .map(|c| c.record.created_at)
                .unwrap_or(now);
            self.coordinator
                .put_component(
                    &graph.datacenter,
                    &graph.environment,
                    &ComponentRecord {
                        name: component,
                        dependencies: deps.into_iter().collect(),
                        created_at,
                        updated_at: now,
                    },
                )
                .await?;
        }
        Ok(())
    }

    async fn run_loop(
        &self,
        graph: &mut Graph,
        plan: &Plan,
        rctx: &RunCtx<'_>,
        prior_rows: &HashMap<NodeId, ResourceState>,
        options: &ExecuteOptions,
        cancel: &CancelToken,
    ) -> Result<ExecutionSummary> {
        let parallelism = options.parallelism.max(1);
        let total = graph.len();
        let mut summary = ExecutionSummary::default();
        let mut started: HashSet<NodeId> = HashSet::new();
        let mut stopped = false;
        let mut in_flight = FuturesUnordered::new();

        loop {
            // Pull ready work until the pool is full, in plan order so a
            // single worker degenerates to exactly the planned sequence.
            // Noop nodes complete inline, which can ready new nodes, so
            // keep scanning until nothing more starts.
            while !stopped && !cancel.is_cancelled() && in_flight.len() < parallelism {
                let ready: BTreeSet<NodeId> = graph.ready_nodes().into_iter().collect();
                let next = plan
                    .changes
                    .iter()
                    .map(|change| &change.node_id)
                    .find(|id| ready.contains(*id) && !started.contains(*id))
                    .or_else(|| {
                        // Nodes the plan never saw execute as noops
                        ready.iter().find(|id| !started.contains(*id))
                    })
                    .cloned();
                let Some(id) = next else { break };
                started.insert(id.clone());

                let action = plan
                    .change_for(&id)
                    .map(|change| change.action)
                    .unwrap_or(Action::Noop);

                if action == Action::Noop {
                    debug!(node = %id, "no changes, plugin not invoked");
                    graph.mark_completed(&id)?;
                    summary.completed += 1;
                    continue;
                }

                let node = graph
                    .get(&id)
                    .expect("ready ids come from the graph")
                    .clone();
                self.events.emit(
                    DeployEvent::new(EventLevel::Info, format!("{} {}", action_verb(action), id))
                        .for_resource(&node.component, id.as_str(), action)
                        .with_progress(progress(summary.completed, total)),
                );
                graph.mark_running(&id)?;

                in_flight.push(self.run_node(node, action, rctx, prior_rows.get(&id).cloned()));
            }

            let Some((id, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(NodeOutcome::Applied {
                    outputs: node_outputs,
                }) => {
                    graph.set_outputs(&id, node_outputs)?;
                    graph.mark_completed(&id)?;
                    summary.completed += 1;
                    self.events.emit(
                        DeployEvent::new(EventLevel::Info, format!("completed {}", id))
                            .with_progress(progress(summary.completed, total)),
                    );
                }
                Ok(NodeOutcome::Deleted) => {
                    graph.mark_completed(&id)?;
                    summary.completed += 1;
                    self.events.emit(
                        DeployEvent::new(EventLevel::Info, format!("deleted {}", id))
                            .with_progress(progress(summary.completed, total)),
                    );
                }
                Ok(NodeOutcome::Skipped(reason)) => {
                    graph.mark_skipped(&id)?;
                    summary.skipped += 1;
                    self.events.emit(DeployEvent::new(
                        EventLevel::Warn,
                        format!("skipped {}: {}", id, reason),
                    ));
                }
                Err(e) => {
                    warn!(node = %id, error = %e, "node failed");
                    graph.mark_failed(&id)?;
                    summary.failed += 1;
                    self.events.error(format!("failed {}: {}", id, e));

                    if options.stop_on_error {
                        stopped = true;
                    } else {
                        for dependent in graph.transitive_dependents(&id) {
                            if graph.get(&dependent).map(|n| n.state)
                                == Some(NodeState::Pending)
                            {
                                graph.mark_skipped(&dependent)?;
                                summary.skipped += 1;
                                self.events.emit(DeployEvent::new(
                                    EventLevel::Warn,
                                    format!("skipped {}: dependency failed", dependent),
                                ));
                            }
                        }
                    }
                }
            }
        }

        // Whatever never started is skipped, not silently dropped
        let remaining: Vec<NodeId> = graph
            .nodes()
            .filter(|node| node.state == NodeState::Pending)
            .map(|node| node.id.clone())
            .collect();
        for id in remaining {
            graph.mark_skipped(&id)?;
            summary.skipped += 1;
        }

        summary.cancelled = cancel.is_cancelled();
        summary.success = !graph.has_failed() && !summary.cancelled;
        info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            success = summary.success,
            "execution finished"
        );
        Ok(summary)
    }

    /// Execute one node end to end; suspends only at plugin calls and
    /// state I/O
    async fn run_node(
        &self,
        node: Node,
        action: Action,
        rctx: &RunCtx<'_>,
        prior_row: Option<ResourceState>,
    ) -> (NodeId, Result<NodeOutcome>) {
        let id = node.id.clone();
        let result = self.run_node_inner(node, action, rctx, prior_row).await;
        (id, result)
    }

    async fn run_node_inner(
        &self,
        node: Node,
        action: Action,
        rctx: &RunCtx<'_>,
        prior_row: Option<ResourceState>,
    ) -> Result<NodeOutcome> {
        if action == Action::Delete {
            return self.destroy_node(&node, rctx, prior_row).await;
        }

        // Snapshot under the read lock; evaluation runs on the copy so
        // the lock is never held across an await
        let known_outputs = rctx.outputs.read().expect("outputs lock").clone();

        let mut ctx = node_context(
            &node,
            rctx.environment,
            rctx.datacenter,
            rctx.variables,
            &known_outputs,
        );
        let resolved_inputs = evaluate_input_map(&node.inputs, &ctx)?;
        ctx.set_node_inputs(resolved_inputs.clone());
        // Hook predicates get the narrow context, module inputs the full
        // one
        let when_ctx = predicate_context(
            &node,
            rctx.environment,
            rctx.datacenter,
            rctx.variables,
            &resolved_inputs,
        );

        let matched = match rctx.resolver.match_hook(node.resource_type, &when_ctx)? {
            HookResolution::Matched(matched) => matched,
            HookResolution::Rejected(message) => {
                if !rctx.dry_run {
                    self.persist_failed_row(rctx, &node, &resolved_inputs, &message)
                        .await?;
                }
                return Err(Error::HookRejected(message));
            }
            HookResolution::NoMatch => {
                return Ok(NodeOutcome::Skipped("no matching hook".to_string()));
            }
        };
        let modules = rctx.resolver.resolve_modules(&matched, &ctx)?;

        if rctx.dry_run {
            for module in &modules {
                let plugin = self.plugins.get(&module.plugin)?;
                let preview = plugin
                    .preview(run_options(module, &resolved_inputs, None))
                    .await?;
                for line in preview.changes {
                    self.events.info(format!("preview {}: {}", node.id, line));
                }
            }
            return Ok(NodeOutcome::Applied {
                outputs: InputMap::new(),
            });
        }

        // Replace tears the old incarnation down before applying anew
        if action == Action::Replace {
            if let Some(row) = &prior_row {
                self.destroy_row_modules(row, rctx).await?;
            }
        }

        let mut merged_outputs = InputMap::new();
        let mut module_states: IndexMap<String, ModuleState> = IndexMap::new();

        for module in &modules {
            let plugin = self.plugins.get(&module.plugin)?;
            let prior_bytes = prior_module_state(&prior_row, &module.name);
            let applied = match plugin
                .apply(run_options(module, &resolved_inputs, prior_bytes))
                .await
            {
                Ok(applied) => applied,
                Err(e) => {
                    // Partial module state stays authoritative; cleanup
                    // requires an explicit destroy
                    self.persist_partial_row(
                        rctx,
                        &node,
                        &matched.identity(),
                        &modules,
                        &resolved_inputs,
                        module_states,
                        &e.to_string(),
                    )
                    .await?;
                    return Err(e);
                }
            };

            merged_outputs.extend(applied.outputs.clone());
            module_states.insert(
                module.name.clone(),
                ModuleState {
                    source: module.source.clone(),
                    plugin: module.plugin.clone(),
                    inputs: module.inputs.clone(),
                    outputs: applied.outputs,
                    iac_state: Some(applied.state),
                    status: ResourceStatus::Ready,
                },
            );
        }

        // Hook-level output bindings override raw module outputs
        let node_outputs = match matched.hook.outputs() {
            Some(bindings) => {
                ctx.set_node_outputs(merged_outputs.clone());
                evaluate_input_map(bindings, &ctx)?
            }
            None => merged_outputs,
        };

        rctx.outputs
            .write()
            .expect("outputs lock")
            .insert(node.id.clone(), node_outputs.clone());

        let now = Utc::now();
        let row = ResourceState {
            component: node.component.clone(),
            name: node.name.clone(),
            resource_type: node.resource_type,
            hook: matched.identity(),
            module: modules
                .first()
                .map(|m| m.source.clone())
                .unwrap_or_default(),
            inputs: resolved_inputs,
            outputs: node_outputs.clone(),
            iac_state: module_states
                .values()
                .next()
                .and_then(|m| m.iac_state.clone()),
            module_states: Some(module_states),
            depends_on: node.depends_on.iter().map(|d| d.to_string()).collect(),
            status: ResourceStatus::Ready,
            status_reason: None,
            created_at: prior_row.as_ref().map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.coordinator
            .put_resource(rctx.datacenter, rctx.environment, &row)
            .await?;

        Ok(NodeOutcome::Applied {
            outputs: node_outputs,
        })
    }

    async fn destroy_node(
        &self,
        node: &Node,
        rctx: &RunCtx<'_>,
        prior_row: Option<ResourceState>,
    ) -> Result<NodeOutcome> {
        let row = prior_row.ok_or_else(|| Error::NodeFailed {
            node: node.id.to_string(),
            message: "no stored state to destroy".to_string(),
        })?;

        if rctx.dry_run {
            self.events
                .info(format!("preview {}: would destroy", node.id));
            return Ok(NodeOutcome::Deleted);
        }

        self.destroy_row_modules(&row, rctx).await?;

        self.coordinator
            .delete_resource(
                rctx.datacenter,
                rctx.environment,
                &row.component,
                row.resource_type,
                &row.name,
            )
            .await?;
        Ok(NodeOutcome::Deleted)
    }

    /// Destroy a stored row's modules in reverse apply order
    ///
    /// Stored module states are authoritative; hook re-resolution is only
    /// a fallback for rows written before per-module capture.
    async fn destroy_row_modules(&self, row: &ResourceState, rctx: &RunCtx<'_>) -> Result<()> {
        if let Some(module_states) = &row.module_states {
            for (name, state) in module_states.iter().rev() {
                debug!(module = %name, "destroying module");
                let plugin = self.plugins.get(&state.plugin)?;
                plugin
                    .destroy(RunOptions {
                        module_source: state.source.clone(),
                        inputs: state.inputs.clone(),
                        environment: forwarded_environment(),
                        work_dir: None,
                        state: state.iac_state.clone(),
                    })
                    .await?;
            }
            return Ok(());
        }

        let mut ctx = EvalContext::new();
        ctx.set_node_name(&row.name);
        ctx.set_node_inputs(row.inputs.clone());
        ctx.set_environment(rctx.environment, rctx.datacenter);
        let matched = match rctx.resolver.match_hook(row.resource_type, &ctx)? {
            HookResolution::Matched(matched) => matched,
            _ => {
                return Err(Error::NodeFailed {
                    node: row.node_id(),
                    message: "no module state and no resolvable hook".to_string(),
                })
            }
        };
        for module in matched.hook.modules() {
            let plugin = self.plugins.get(ModuleSource::plugin(module))?;
            plugin
                .destroy(RunOptions {
                    module_source: row.module.clone(),
                    inputs: row.inputs.clone(),
                    environment: forwarded_environment(),
                    work_dir: None,
                    state: row.iac_state.clone(),
                })
                .await?;
        }
        Ok(())
    }

    async fn persist_failed_row(
        &self,
        rctx: &RunCtx<'_>,
        node: &Node,
        inputs: &InputMap,
        reason: &str,
    ) -> Result<()> {
        let now = Utc::now();
        let row = ResourceState {
            component: node.component.clone(),
            name: node.name.clone(),
            resource_type: node.resource_type,
            hook: String::new(),
            module: String::new(),
            inputs: inputs.clone(),
            outputs: InputMap::new(),
            iac_state: None,
            module_states: None,
            depends_on: node.depends_on.iter().map(|d| d.to_string()).collect(),
            status: ResourceStatus::Failed,
            status_reason: Some(reason.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.coordinator
            .put_resource(rctx.datacenter, rctx.environment, &row)
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_partial_row(
        &self,
        rctx: &RunCtx<'_>,
        node: &Node,
        hook: &str,
        modules: &[ResolvedModule],
        inputs: &InputMap,
        module_states: IndexMap<String, ModuleState>,
        reason: &str,
    ) -> Result<()> {
        let now = Utc::now();
        let row = ResourceState {
            component: node.component.clone(),
            name: node.name.clone(),
            resource_type: node.resource_type,
            hook: hook.to_string(),
            module: modules
                .first()
                .map(|m| m.source.clone())
                .unwrap_or_default(),
            inputs: inputs.clone(),
            outputs: InputMap::new(),
            iac_state: None,
            module_states: Some(module_states),
            depends_on: node.depends_on.iter().map(|d| d.to_string()).collect(),
            status: ResourceStatus::Failed,
            status_reason: Some(reason.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.coordinator
            .put_resource(rctx.datacenter, rctx.environment, &row)
            .await?;
        Ok(())
    }
}

fn run_options(module: &ResolvedModule, node_inputs: &InputMap, state: Option<Vec<u8>>) -> RunOptions {
    // Modules without explicit bindings receive the node's inputs
    let inputs = if module.inputs.is_empty() {
        node_inputs.clone()
    } else {
        module.inputs.clone()
    };
    RunOptions {
        module_source: module.source.clone(),
        inputs,
        environment: forwarded_environment(),
        work_dir: None,
        state,
    }
}

fn prior_module_state(row: &Option<ResourceState>, module: &str) -> Option<Vec<u8>> {
    let row = row.as_ref()?;
    if let Some(states) = &row.module_states {
        return states.get(module).and_then(|s| s.iac_state.clone());
    }
    row.iac_state.clone()
}

fn action_verb(action: Action) -> &'static str {
    match action {
        Action::Create => "creating",
        Action::Update => "updating",
        Action::Replace => "replacing",
        Action::Delete => "deleting",
        Action::Noop => "unchanged",
    }
}

fn progress(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((completed * 100) / total) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_progress_rounding() {
        assert_eq!(progress(0, 4), 0);
        assert_eq!(progress(1, 4), 25);
        assert_eq!(progress(4, 4), 100);
        assert_eq!(progress(0, 0), 100);
    }

    #[test]
    fn test_prior_module_state_prefers_module_entry() {
        let now = Utc::now();
        let mut states = IndexMap::new();
        states.insert(
            "main".to_string(),
            ModuleState {
                source: "s".to_string(),
                plugin: "native".to_string(),
                inputs: InputMap::new(),
                outputs: InputMap::new(),
                iac_state: Some(b"module".to_vec()),
                status: ResourceStatus::Ready,
            },
        );
        let row = ResourceState {
            component: "app".to_string(),
            name: "main".to_string(),
            resource_type: cld_schema::ResourceType::Database,
            hook: "database#0".to_string(),
            module: "s".to_string(),
            inputs: InputMap::new(),
            outputs: InputMap::new(),
            iac_state: Some(b"row".to_vec()),
            module_states: Some(states),
            depends_on: vec![],
            status: ResourceStatus::Ready,
            status_reason: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(
            prior_module_state(&Some(row.clone()), "main"),
            Some(b"module".to_vec())
        );
        assert_eq!(prior_module_state(&Some(row), "other"), None);
        assert_eq!(prior_module_state(&None, "main"), None);
    }
}
