// crates/gameflowcore/src/events/mod.rs

mod base;

pub use base::{EventBus, EventEmitter, ExecutionEvent, FinishReason, NodeEvent};
