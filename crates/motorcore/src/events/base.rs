use crate::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Outcome recorded for a node or a whole flow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Ok,
    Error,
    Incomplete,
}

/// One audit record; `object_type` is the node type or `"flujo"` for a run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub process_id: String,
    pub process_name: String,
    pub channel: String,
    pub object_type: String,
    pub object_name: String,
    pub parameters: Value,
    pub result: Value,
    pub full_output: Value,
    pub assignments: Value,
    pub duration_ms: u64,
    pub status: LogStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl LogEntry {
    pub fn new(
        trace_id: impl Into<String>,
        process_id: impl Into<String>,
        object_type: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            trace_id: trace_id.into(),
            process_id: process_id.into(),
            process_name: String::new(),
            channel: String::new(),
            object_type: object_type.into(),
            object_name: object_name.into(),
            parameters: Value::Null,
            result: Value::Null,
            full_output: Value::Null,
            assignments: Value::Null,
            duration_ms: 0,
            status: LogStatus::Ok,
            error_detail: None,
        }
    }

    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = name.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    pub fn with_full_output(mut self, full_output: Value) -> Self {
        self.full_output = full_output;
        self
    }

    pub fn with_assignments(mut self, assignments: Value) -> Self {
        self.assignments = assignments;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn failed(mut self, detail: impl Into<String>) -> Self {
        self.status = LogStatus::Error;
        self.error_detail = Some(detail.into());
        self
    }

    pub fn with_status(mut self, status: LogStatus) -> Self {
        self.status = status;
        self
    }
}

/// Receiver of audit records. Recording never fails the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: LogEntry);
}

/// Broadcasts audit records to any number of subscribers
pub struct AuditBus {
    sender: broadcast::Sender<LogEntry>,
}

impl AuditBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl AuditSink for AuditBus {
    fn record(&self, entry: LogEntry) {
        // No subscribers is fine
        let _ = self.sender.send(entry);
    }
}

/// Writes audit records as structured tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: LogEntry) {
        match entry.status {
            LogStatus::Ok => tracing::info!(
                target: "motor::audit",
                trace_id = %entry.trace_id,
                process_id = %entry.process_id,
                object_type = %entry.object_type,
                object_name = %entry.object_name,
                duration_ms = entry.duration_ms,
                "executed"
            ),
            LogStatus::Error | LogStatus::Incomplete => tracing::warn!(
                target: "motor::audit",
                trace_id = %entry.trace_id,
                process_id = %entry.process_id,
                object_type = %entry.object_type,
                object_name = %entry.object_name,
                duration_ms = entry.duration_ms,
                status = ?entry.status,
                error = entry.error_detail.as_deref().unwrap_or(""),
                "executed with errors"
            ),
        }
    }
}
