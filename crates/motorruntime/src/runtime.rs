use crate::executor::{EngineServices, ExecutionRequest, FlowExecutor};
use crate::expression::{ExpressionEvaluator, RhaiEvaluator};
use crate::functions::FunctionRegistry;
use crate::registry::BackendRegistry;
use crate::subprocess::InvocationContext;
use motorcore::{
    AuditBus, AuditSink, BackendExecutor, ExecutionResult, FlowError, FlowStore, LogEntry, Map,
    MemoryStore, ServerStore, TableStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deepest allowed subprocess nesting
    pub max_subprocess_depth: usize,
    pub default_subprocess_timeout_ms: u64,
    /// Keep draining pending nodes after an output node ran; the last output wins
    pub drain_after_output: bool,
    pub audit_buffer_size: usize,
    pub default_user: String,
    pub default_role: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_subprocess_depth: 10,
            default_subprocess_timeout_ms: 60_000,
            drain_after_output: false,
            audit_buffer_size: 1000,
            default_user: "sistema".to_string(),
            default_role: String::new(),
        }
    }
}

/// Main runtime for executing stored flows
pub struct MotorRuntime {
    executor: FlowExecutor,
    audit_bus: Arc<AuditBus>,
}

impl MotorRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Runtime over a single in-memory store with the given backends
    pub fn with_store(store: Arc<MemoryStore>, backends: BackendRegistry) -> Self {
        Self::builder().with_store(store).with_backends(backends).build()
    }

    /// Execute a stored flow by process id
    pub async fn execute_flow(
        &self,
        process_id: &str,
        input: Map,
        channel: &str,
        trigger: &str,
    ) -> Result<ExecutionResult, FlowError> {
        self.execute(ExecutionRequest {
            process_id: process_id.to_string(),
            input,
            channel: channel.to_string(),
            trigger: trigger.to_string(),
        })
        .await
    }

    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, FlowError> {
        let invocation =
            InvocationContext::root(&request.process_id, &request.input, self.config());
        self.executor.execute(request, invocation).await
    }

    /// Subscribe to audit records of every execution
    pub fn subscribe_audit(&self) -> broadcast::Receiver<LogEntry> {
        self.audit_bus.subscribe()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.executor.services().functions
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.executor.services().backends
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.executor.services().config
    }
}

/// Assembles a [`MotorRuntime`]; unset stores default to one shared in-memory store
#[derive(Default)]
pub struct RuntimeBuilder {
    flows: Option<Arc<dyn FlowStore>>,
    servers: Option<Arc<dyn ServerStore>>,
    tables: Option<Arc<dyn TableStore>>,
    backends: BackendRegistry,
    functions: Option<FunctionRegistry>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    sinks: Vec<Arc<dyn AuditSink>>,
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Use one in-memory store for flows, servers and tables
    pub fn with_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.flows = Some(store.clone());
        self.servers = Some(store.clone());
        self.tables = Some(store);
        self
    }

    pub fn with_flow_store(mut self, flows: Arc<dyn FlowStore>) -> Self {
        self.flows = Some(flows);
        self
    }

    pub fn with_server_store(mut self, servers: Arc<dyn ServerStore>) -> Self {
        self.servers = Some(servers);
        self
    }

    pub fn with_table_store(mut self, tables: Arc<dyn TableStore>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_backend(mut self, executor: Arc<dyn BackendExecutor>) -> Self {
        self.backends.register(executor);
        self
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Additional audit sink; the runtime's broadcast bus always receives records
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> MotorRuntime {
        let fallback = Arc::new(MemoryStore::new());
        let flows = self.flows.unwrap_or_else(|| fallback.clone());
        let servers = self.servers.unwrap_or_else(|| fallback.clone());
        let tables: Arc<dyn TableStore> = self.tables.unwrap_or_else(|| fallback.clone());

        let functions = Arc::new(self.functions.unwrap_or_default());
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Arc::new(RhaiEvaluator::new(functions.clone(), tables.clone())));

        let audit_bus = Arc::new(AuditBus::new(self.config.audit_buffer_size));
        let bus_sink: Arc<dyn AuditSink> = audit_bus.clone();
        let mut sinks = vec![bus_sink];
        sinks.extend(self.sinks);

        let services = EngineServices {
            flows,
            servers,
            tables,
            backends: Arc::new(self.backends),
            functions,
            evaluator,
            audit: Arc::new(FanoutSink { sinks }),
            config: self.config,
        };

        MotorRuntime {
            executor: FlowExecutor::new(Arc::new(services)),
            audit_bus,
        }
    }
}

/// Forwards every record to each inner sink
struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditSink for FanoutSink {
    fn record(&self, entry: LogEntry) {
        for sink in &self.sinks {
            sink.record(entry.clone());
        }
    }
}
