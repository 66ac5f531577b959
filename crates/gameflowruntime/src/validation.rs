//! Static checks over a compiled asset.

use crate::registry::{NodeRegistry, TypeStatus};
use gameflowcore::{FlowAsset, NodeCategory, NodeId};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Block compilation.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.errors.push(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Check node types, entry/exit points, subgraph bindings and cycles.
pub fn validate(asset: &FlowAsset, registry: &NodeRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();

    for entry in asset.nodes() {
        let label = node_label(entry.id(), entry.type_name());
        match registry.status(entry.type_name()) {
            None => report.error(format!("{} has an unknown type", label)),
            Some(TypeStatus::Abstract) => report.error(format!("{} uses an abstract type", label)),
            Some(TypeStatus::Removed) => report.error(format!("{} uses a removed type", label)),
            Some(TypeStatus::Deprecated) => {
                let replacement = registry
                    .get_metadata(entry.type_name())
                    .and_then(|m| m.replacement)
                    .map(|r| format!(", use '{}' instead", r))
                    .unwrap_or_default();
                report.warn(format!("{} uses a deprecated type{}", label, replacement));
            }
            Some(TypeStatus::Active) => {}
        }

        if entry.behavior().is_subgraph() {
            match entry.behavior().nested_asset() {
                Some(nested) if asset.is_nested_in(nested) => report.error(format!(
                    "{} references '{}', which contains this asset",
                    label,
                    nested.name()
                )),
                Some(_) => {}
                None => report.warn(format!("{} has no asset bound", label)),
            }
        }
    }

    if asset.entry_points().is_empty() {
        report.warn(format!("'{}' has no entry point", asset.name()));
    }
    for (name, node) in asset.entry_points() {
        match asset.node(*node) {
            Some(entry) if entry.category() == NodeCategory::Input => {}
            Some(_) => report.error(format!("Entry point '{}' is not an Input node", name)),
            None => report.error(format!("Entry point '{}' maps to a missing node", name)),
        }
    }
    for (name, node) in asset.exit_points() {
        match asset.node(*node) {
            Some(entry) if entry.category() == NodeCategory::Output => {}
            Some(_) => report.error(format!("Exit point '{}' is not an Output node", name)),
            None => report.error(format!("Exit point '{}' maps to a missing node", name)),
        }
    }

    if has_synchronous_cycle(asset) {
        report.warn(format!(
            "'{}' contains a cycle without a join or latent node; it may hit the cascade depth limit",
            asset.name()
        ));
    }

    report
}

/// Cycles through joins or latent nodes end the synchronous cascade and are fine.
fn has_synchronous_cycle(asset: &FlowAsset) -> bool {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let indices: HashMap<NodeId, NodeIndex> = asset
        .node_ids()
        .map(|id| (id, graph.add_node(id)))
        .collect();

    for wire in asset.wires() {
        let breaks = asset
            .node(wire.to_node)
            .map_or(true, |entry| entry.behavior().breaks_cascade());
        if breaks {
            continue;
        }
        if let (Some(from), Some(to)) = (indices.get(&wire.from_node), indices.get(&wire.to_node)) {
            graph.add_edge(*from, *to, ());
        }
    }
    is_cyclic_directed(&graph)
}

fn node_label(id: NodeId, type_name: &str) -> String {
    format!("Node {} ({})", id, type_name)
}
