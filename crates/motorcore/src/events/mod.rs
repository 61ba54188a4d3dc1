// crates/motorcore/src/events/mod.rs

mod base;

pub use base::{AuditBus, AuditSink, LogEntry, LogStatus, TracingAuditSink};
