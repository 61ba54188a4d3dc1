//! Flow execution runtime
//!
//! This crate interprets stored flow graphs: it resolves assignments and
//! system functions, evaluates conditions, runs the per-type node
//! executors, routes between nodes on success and failure, and guards
//! nested subprocess invocations.

mod executor;
pub mod expression;
pub mod functions;
pub mod nodes;
mod registry;
pub mod resolver;
mod runtime;
pub mod subprocess;
pub mod tables;

pub use executor::{EngineServices, ExecutionRequest, FlowExecutor, FlowGraph, GraphNode};
pub use expression::{ExpressionEvaluator, RhaiEvaluator};
pub use functions::{CallScope, FunctionRegistry, SystemFunction};
pub use registry::BackendRegistry;
pub use resolver::{OnFailure, ValueResolver};
pub use runtime::{MotorRuntime, RuntimeBuilder, RuntimeConfig};
pub use subprocess::{check_invocation, InvocationContext};
pub use tables::resolve_table;
