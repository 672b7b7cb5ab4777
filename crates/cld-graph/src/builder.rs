//! Graph construction from component specs
//!
//! One node per declared resource. Input values keep raw template strings;
//! templates are scanned (never evaluated) for cross-resource references,
//! and each same-component reference becomes a dependency edge. A
//! reference to `ports.<X>.port` materializes a synthetic Port node on
//! first sight.

use crate::graph::Graph;
use crate::node::{Node, NodeId};
use crate::{Error, Result};
use cld_expr::scan_references;
use cld_schema::{ComponentSpec, InputMap, ResourceType};
use tracing::debug;

struct EdgeRequest {
    from: NodeId,
    to: NodeId,
    // Edges into a declared component dependency's namespace are allowed
    // to dangle until composition; same-component targets must exist.
    same_component: bool,
    infer_port: Option<(String, String)>,
}

/// Builds an immutable graph from one or more component specs
pub struct GraphBuilder {
    environment: String,
    datacenter: String,
    components: Vec<(String, ComponentSpec)>,
}

impl GraphBuilder {
    /// Create a builder for one environment/datacenter pair
    pub fn new(environment: impl Into<String>, datacenter: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            datacenter: datacenter.into(),
            components: Vec::new(),
        }
    }

    /// Append a component's resources to the graph under `name`
    pub fn add_component(&mut self, name: impl Into<String>, spec: ComponentSpec) -> &mut Self {
        self.components.push((name.into(), spec));
        self
    }

    /// Emit the graph; nodes are immutable afterwards
    pub fn build(self) -> Result<Graph> {
        let mut graph = Graph::new(self.environment, self.datacenter);
        let mut edges: Vec<EdgeRequest> = Vec::new();

        for (component, spec) in &self.components {
            for (resource_type, section) in spec.sections() {
                for (name, inputs) in section {
                    let node = Node::new(component, resource_type, name, inputs.clone());
                    let from = node.id.clone();
                    graph.add_node(node)?;

                    for template in inputs_templates(inputs) {
                        for reference in scan_references(template)? {
                            let target_component =
                                reference.dependency.as_deref().unwrap_or(component);
                            let to = NodeId::new(
                                target_component,
                                reference.resource_type,
                                &reference.target,
                            );
                            let infer_port = (reference.dependency.is_none()
                                && reference.resource_type == ResourceType::Port
                                && reference.field.as_deref() == Some("port"))
                            .then(|| (component.clone(), reference.target.clone()));

                            edges.push(EdgeRequest {
                                from: from.clone(),
                                to,
                                same_component: reference.dependency.is_none(),
                                infer_port,
                            });
                        }
                    }
                }
            }
        }

        for edge in &edges {
            if graph.get(&edge.to).is_none() {
                if let Some((component, port)) = &edge.infer_port {
                    debug!(component, port, "inferring port node");
                    graph.add_node(Node::new(
                        component,
                        ResourceType::Port,
                        port,
                        InputMap::new(),
                    ))?;
                } else if edge.same_component {
                    return Err(Error::UnknownReference {
                        node: edge.from.to_string(),
                        target: edge.to.to_string(),
                    });
                } else {
                    // Cross-component edge whose target component was not
                    // composed into this graph; left dangling.
                    continue;
                }
            }
            graph.add_edge(&edge.from, &edge.to)?;
        }

        // Surfaces cycles introduced by mutual references
        graph.topological_sort()?;

        Ok(graph)
    }
}

fn inputs_templates(inputs: &InputMap) -> Vec<&str> {
    let mut templates = Vec::new();
    for value in inputs.values() {
        templates.extend(value.expressions());
    }
    templates
}
