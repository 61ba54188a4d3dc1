use motorcore::{BackendExecutor, NodeError};
use std::collections::HashMap;
use std::sync::Arc;

/// Backend executors keyed by server type (case-insensitive)
#[derive(Clone, Default)]
pub struct BackendRegistry {
    executors: HashMap<String, Arc<dyn BackendExecutor>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own server type
    pub fn register(&mut self, executor: Arc<dyn BackendExecutor>) {
        let server_type = executor.server_type().to_lowercase();
        tracing::info!("Registering backend executor: {}", server_type);
        self.executors.insert(server_type, executor);
    }

    /// Register an executor under an additional server type tag
    pub fn register_as(&mut self, server_type: &str, executor: Arc<dyn BackendExecutor>) {
        self.executors.insert(server_type.to_lowercase(), executor);
    }

    pub fn get(&self, server_type: &str) -> Result<Arc<dyn BackendExecutor>, NodeError> {
        self.executors
            .get(&server_type.to_lowercase())
            .cloned()
            .ok_or_else(|| NodeError::UnsupportedServerType(server_type.to_string()))
    }

    pub fn list_server_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }
}
