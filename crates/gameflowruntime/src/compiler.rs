//! Turns a [`GraphDocument`] into a runnable [`FlowAsset`].

use crate::library::AssetLibrary;
use crate::registry::{NodeRegistry, PLACEHOLDER_NODE_TYPE};
use crate::validation::{validate, ValidationReport};
use gameflowcore::{FlowAsset, FlowNode, GraphDocument, GraphError, NodeId, NodeSpec, Result};

/// A compiled asset and everything validation found.
#[derive(Debug)]
pub struct CompiledGraph {
    pub asset: FlowAsset,
    pub report: ValidationReport,
}

impl CompiledGraph {
    /// The asset, unless validation reported errors.
    pub fn into_result(self) -> Result<FlowAsset> {
        if self.report.has_errors() {
            return Err(GraphError::Validation(self.report.errors.join("; ")).into());
        }
        Ok(self.asset)
    }
}

/// Build an asset from a document.
///
/// Node types that cannot be instantiated (unknown, abstract, removed) are
/// replaced by a placeholder that keeps the declared pins and type name, so
/// the topology survives and validation can report them. Subgraph nodes are
/// bound against `library`; connections are applied last.
pub fn compile_document(
    document: &GraphDocument,
    registry: &NodeRegistry,
    library: &AssetLibrary,
) -> Result<CompiledGraph> {
    tracing::info!("Compiling flow graph '{}' ({} nodes)", document.name, document.nodes.len());
    let mut asset = FlowAsset::with_id(document.id, document.name.clone());
    asset.set_singleton(document.singleton);
    let mut report = ValidationReport::default();

    for spec in &document.nodes {
        let behavior = instantiate(spec, registry)?;
        asset.add_node_with_id(spec.id, spec.node_type.clone(), behavior)?;
        if let Some(name) = &spec.name {
            asset.set_node_name(spec.id, name.clone());
        }
        if let Some(entry) = asset.node_mut(spec.id) {
            entry.metadata = spec.metadata.clone();
        }
        if !spec.inputs.is_empty() || !spec.outputs.is_empty() {
            let Some(entry) = asset.node(spec.id) else {
                continue;
            };
            let inputs = if spec.inputs.is_empty() {
                entry.pins().inputs().to_vec()
            } else {
                spec.inputs.clone()
            };
            let outputs = if spec.outputs.is_empty() {
                entry.pins().outputs().to_vec()
            } else {
                spec.outputs.clone()
            };
            asset.set_pins(spec.id, inputs, outputs)?;
        }
    }

    for (name, node) in &document.custom_inputs {
        if let Err(e) = asset.add_entry_point(name.clone(), *node) {
            report.error(e.to_string());
        }
    }
    for (name, node) in &document.custom_outputs {
        if let Err(e) = asset.add_exit_point(name.clone(), *node) {
            report.error(e.to_string());
        }
    }

    bind_subgraphs(&mut asset, library, &mut report);

    for rejected in asset.apply_wires(&document.connections) {
        report.warn(format!(
            "Dropped connection {}:{} -> {}:{}: {}",
            rejected.wire.from_node,
            rejected.wire.from_pin,
            rejected.wire.to_node,
            rejected.wire.to_pin,
            rejected.error
        ));
    }

    report.merge(validate(&asset, registry));
    tracing::info!(
        "Compiled '{}': {} errors, {} warnings, {} orphans",
        asset.name(),
        report.errors.len(),
        report.warnings.len(),
        asset.orphans().len()
    );
    Ok(CompiledGraph { asset, report })
}

fn instantiate(spec: &NodeSpec, registry: &NodeRegistry) -> Result<Box<dyn FlowNode>> {
    match registry.status(&spec.node_type) {
        Some(status) if status.is_instantiable() => {
            Ok(registry.create_node(&spec.node_type, &spec.config)?)
        }
        status => {
            tracing::debug!(
                "Placeholder for node {} of type '{}' ({:?})",
                spec.id,
                spec.node_type,
                status
            );
            Ok(registry.create_node(PLACEHOLDER_NODE_TYPE, &spec.config)?)
        }
    }
}

fn bind_subgraphs(asset: &mut FlowAsset, library: &AssetLibrary, report: &mut ValidationReport) {
    let references: Vec<(NodeId, String)> = asset
        .nodes()
        .filter(|entry| entry.behavior().is_subgraph())
        .filter_map(|entry| {
            entry
                .behavior()
                .asset_reference()
                .map(|name| (entry.id(), name.to_string()))
        })
        .collect();

    for (node, name) in references {
        if name == asset.name() {
            report.error(format!(
                "Subgraph node {} references its owning asset '{}'",
                node, name
            ));
            continue;
        }
        match library.get(&name) {
            Some(template) => {
                if let Err(e) = asset.bind_subgraph(node, template) {
                    report.error(format!("Subgraph node {}: {}", node, e));
                }
            }
            None => report.error(format!("Subgraph node {}: asset '{}' not found", node, name)),
        }
    }
}
