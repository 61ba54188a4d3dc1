//! Per-type node executors driven by the traversal engine

pub(crate) mod condition;
pub(crate) mod entry;
pub(crate) mod output;
pub(crate) mod process;
pub mod schema;
pub mod splitter;
