//! Game flow execution runtime
//!
//! This crate provides the engine that runs flow graphs: the node registry,
//! document compilation and validation, running instances and the
//! per-world subsystem that owns them.

mod compiler;
mod executor;
mod library;
mod registry;
mod runtime;
mod subsystem;
mod validation;

pub use compiler::{compile_document, CompiledGraph};
pub use executor::{FlowFinished, FlowInstance, InstanceState};
pub use library::AssetLibrary;
pub use registry::{
    NodeFactory, NodeMetadata, NodeRegistry, PortDefinition, TypeStatus, PLACEHOLDER_NODE_TYPE,
};
pub use runtime::{FlowRuntime, RuntimeConfig, DEFAULT_MAX_CASCADE_DEPTH};
pub use subsystem::FlowSubsystem;
pub use validation::{validate, ValidationReport};
