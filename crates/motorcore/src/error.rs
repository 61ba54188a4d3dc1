use thiserror::Error;

/// Failures that abort a flow execution outright
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Flow not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed flow: {0}")]
    Malformed(String),

    #[error("Flow has no entry node")]
    NoEntryNode,

    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Entry field '{field}' could not be resolved: {source}")]
    EntryField {
        field: String,
        #[source]
        source: ResolveError,
    },

    #[error("Invalid configuration in node '{node}': {message}")]
    InvalidNode { node: String, message: String },

    #[error("Execution cancelled")]
    Cancelled,
}

/// Node-local failures; the engine records them in the context and routes on
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Server '{server}' could not be loaded: {source}")]
    Server {
        server: String,
        #[source]
        source: StoreError,
    },

    #[error("Unsupported server type: {0}")]
    UnsupportedServerType(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Splitter error: {0}")]
    Splitter(String),

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
}

/// Failures while turning an assignment or expression into a value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Field not found in context: {0}")]
    FieldNotFound(String),

    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("Unsupported assignment type: {0}")]
    UnsupportedAssignmentType(String),

    #[error("Unknown system function: {0}")]
    UnknownSystemFunction(String),

    #[error("Invalid arguments for {function}: {message}")]
    InvalidArguments { function: String, message: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table '{0}' has no data")]
    TableEmpty(String),

    #[error("Key '{key}' with field '{field}' not found in table '{table}'")]
    KeyNotFound {
        table: String,
        key: String,
        field: String,
    },

    #[error("Table '{table}' could not be read: {message}")]
    TableUnreadable { table: String, message: String },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Expression did not produce a boolean (got {0})")]
    ExpressionTypeError(String),
}

/// Guard and runtime failures of nested flow invocations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubprocessError {
    #[error("Subprocess node '{0}' has no procesoId")]
    MissingSubprocessId(String),

    #[error("Maximum subprocess depth exceeded ({depth} >= {max})")]
    MaxDepthExceeded { depth: usize, max: usize },

    #[error("Recursion detected: {process_id} is already in the call stack [{stack}]")]
    RecursionDetected { process_id: String, stack: String },

    #[error("Subprocess {process_id} timed out after {timeout_ms}ms")]
    Timeout { process_id: String, timeout_ms: u64 },

    #[error("Subprocess {process_id} failed: {message}")]
    Failed { process_id: String, message: String },
}

/// Failures reported by backend executors
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Backend returned status {status}")]
    Status { status: u16, body: String },

    #[error("SOAP fault {code}: {message}")]
    Fault {
        code: String,
        message: String,
        body: String,
    },

    #[error("Cancelled")]
    Cancelled,
}

impl BackendError {
    /// Raw response text carried by the failure, if the backend answered at all
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            BackendError::Status { body, .. } | BackendError::Fault { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }
}

/// Failures of the persistence collaborators
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid stored data: {0}")]
    Invalid(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Invalid(err.to_string())
    }
}
