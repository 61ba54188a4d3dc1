//! Core abstractions for the integration engine
//!
//! This crate provides the flow data model, the typed node configurations,
//! the error taxonomy and the collaborator traits (stores, backend
//! executors, audit sinks) that the runtime and backends depend on.

pub mod assignment;
mod backend;
mod error;
pub mod events;
mod flow;
mod node;
mod result;
mod store;
mod value;

pub use assignment::{Assignment, AssignmentGroups, AssignmentKind};
pub use backend::BackendExecutor;
pub use error::{BackendError, FlowError, NodeError, ResolveError, StoreError, SubprocessError};
pub use events::*;
pub use flow::{EdgeKind, EdgeSpec, FlowDefinition, FlowId, NodeId, NodeSpec, Position};
pub use node::{
    decode_data, BlockConfig, ConditionConfig, EntryConfig, EntryField, ErrorOutputConfig,
    FieldDef, NodeConfig, NodeKind, OutputConfig, ProcessConfig, Segment, SplitterConfig,
    SubprocessConfig,
};
pub use result::{ExecutionResult, STATUS_ERROR, STATUS_INCOMPLETE, STATUS_OK};
pub use store::{
    FlowRecord, FlowStore, MemoryStore, ServerConfig, ServerStore, TableData, TableRecord,
    TableStore,
};
pub use value::{coerce, keys, Context, Map, Value, ValueExt};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
