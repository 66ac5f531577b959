//! Rebuilding the pin connection tables from a flat wire list.

use crate::document::Connection;
use crate::error::ConnectionError;
use crate::{FlowAsset, NodeCategory, NodeId, PinDirection, PinLink, PinRef};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashSet, VecDeque};

/// A wire that could not be applied during compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedWire {
    pub wire: Connection,
    pub error: ConnectionError,
}

impl FlowAsset {
    /// Rebuild every node's `inputs`/`outputs` tables from `wires`.
    ///
    /// Existing links are discarded, not merged. Wires are applied breadth
    /// first from the roots (entry nodes, Input nodes and nodes nothing
    /// points at), then whatever no root reaches. A wire whose pin an earlier
    /// wire already claimed is rejected. Orphans are recomputed from the
    /// result.
    pub fn apply_wires(&mut self, wires: &[Connection]) -> Vec<RejectedWire> {
        for entry in self.nodes.values_mut() {
            entry.pins.clear_links();
        }

        let mut outgoing: IndexMap<NodeId, Vec<usize>> = IndexMap::new();
        let mut targeted = HashSet::new();
        for (index, wire) in wires.iter().enumerate() {
            outgoing.entry(wire.from_node).or_default().push(index);
            targeted.insert(wire.to_node);
        }

        let mut roots: IndexSet<NodeId> = self.custom_inputs.values().copied().collect();
        for entry in self.nodes.values() {
            if entry.category() == NodeCategory::Input || !targeted.contains(&entry.id()) {
                roots.insert(entry.id());
            }
        }

        let mut applied = vec![false; wires.len()];
        let mut rejected = Vec::new();
        let mut visited: HashSet<NodeId> = roots.iter().copied().collect();
        let mut queue: VecDeque<NodeId> = roots.into_iter().collect();

        while let Some(node) = queue.pop_front() {
            let Some(indices) = outgoing.get(&node) else {
                continue;
            };
            for &index in indices {
                applied[index] = true;
                let wire = &wires[index];
                if let Err(error) = self.apply_wire(wire) {
                    rejected.push(RejectedWire {
                        wire: wire.clone(),
                        error,
                    });
                }
                if visited.insert(wire.to_node) {
                    queue.push_back(wire.to_node);
                }
            }
        }

        for (index, wire) in wires.iter().enumerate() {
            if applied[index] {
                continue;
            }
            tracing::debug!(
                "Wire {}:{} -> {}:{} is not reachable from any root",
                wire.from_node,
                wire.from_pin,
                wire.to_node,
                wire.to_pin
            );
            if let Err(error) = self.apply_wire(wire) {
                rejected.push(RejectedWire {
                    wire: wire.clone(),
                    error,
                });
            }
        }

        for rejection in &rejected {
            tracing::warn!("Rejected wire {:?}: {}", rejection.wire, rejection.error);
        }
        self.refresh_orphans();
        rejected
    }

    /// Rebuild the tables from the current topology. Idempotent.
    pub fn recompile(&mut self) -> Vec<RejectedWire> {
        let wires = self.wires();
        self.apply_wires(&wires)
    }

    /// Links were cleared before this pass, so a pin that is already linked
    /// elsewhere was claimed by an earlier wire. That wire keeps it.
    fn apply_wire(&mut self, wire: &Connection) -> Result<(), ConnectionError> {
        let claimed = |node: NodeId, direction: PinDirection, pin: &str, peer: PinLink| {
            self.nodes
                .get(&node)
                .and_then(|entry| entry.pins.link(direction, pin))
                .is_some_and(|link| *link != peer)
        };
        if claimed(
            wire.from_node,
            PinDirection::Output,
            &wire.from_pin,
            PinLink::new(wire.to_pin.clone(), wire.to_node),
        ) {
            return Err(ConnectionError::AlreadyConnected {
                node: wire.from_node,
                pin: wire.from_pin.clone(),
            });
        }
        if claimed(
            wire.to_node,
            PinDirection::Input,
            &wire.to_pin,
            PinLink::new(wire.from_pin.clone(), wire.from_node),
        ) {
            return Err(ConnectionError::AlreadyConnected {
                node: wire.to_node,
                pin: wire.to_pin.clone(),
            });
        }
        self.connect(
            &PinRef::output(wire.from_node, wire.from_pin.clone()),
            &PinRef::input(wire.to_node, wire.to_pin.clone()),
        )
    }

    fn refresh_orphans(&mut self) {
        self.orphans = self
            .nodes
            .values()
            .filter(|entry| entry.category() != NodeCategory::Input)
            .filter(|entry| !entry.pins().has_connected_inputs())
            .map(|entry| entry.id())
            .collect();
    }
}
