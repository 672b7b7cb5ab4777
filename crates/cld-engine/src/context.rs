//! Evaluation context assembly
//!
//! Both the planner and the executor build per-node contexts the same
//! way: same-component outputs land under the dotted resource scopes,
//! other components' outputs under `dependencies.<component>`.

use cld_expr::EvalContext;
use cld_graph::{Node, NodeId};
use cld_schema::InputMap;
use std::collections::HashMap;

/// Build the narrow context hook predicates evaluate in
///
/// `when` clauses see only the node's (already evaluated) inputs,
/// variables, and the environment. Sibling outputs do not exist at match
/// time and must stay invisible here.
pub(crate) fn predicate_context(
    node: &Node,
    environment: &str,
    datacenter: &str,
    variables: &InputMap,
    resolved_inputs: &InputMap,
) -> EvalContext {
    let mut ctx = EvalContext::new();
    ctx.set_node_name(&node.name);
    ctx.set_node_inputs(resolved_inputs.clone());
    ctx.set_environment(environment, datacenter);
    ctx.set_variables(variables.clone());
    ctx
}

/// Build the evaluation context for one node
///
/// `outputs` holds every known output map keyed by node id; stored rows
/// seed it before execution, completed nodes overwrite during the run.
pub(crate) fn node_context(
    node: &Node,
    environment: &str,
    datacenter: &str,
    variables: &InputMap,
    outputs: &HashMap<NodeId, InputMap>,
) -> EvalContext {
    let mut ctx = EvalContext::new();
    ctx.set_node_name(&node.name);
    ctx.set_node_inputs(node.inputs.clone());
    ctx.set_environment(environment, datacenter);
    ctx.set_variables(variables.clone());

    for (id, output_map) in outputs {
        let Some((component, resource_type, name)) = id.parts() else {
            continue;
        };
        if component == node.component {
            ctx.insert_output(resource_type, name, output_map.clone());
        } else {
            ctx.insert_dependency_output(component, resource_type, name, output_map.clone());
        }
    }

    ctx
}
