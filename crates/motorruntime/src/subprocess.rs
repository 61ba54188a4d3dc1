use crate::executor::{ExecutionRequest, FlowExecutor};
use crate::runtime::RuntimeConfig;
use chrono::Local;
use motorcore::assignment::flatten;
use motorcore::{
    keys, AssignmentKind, AssignmentGroups, Context, Map, NodeSpec, SubprocessConfig,
    SubprocessError, Value, ValueExt, STATUS_INCOMPLETE, STATUS_OK,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Trigger recorded on nested executions
pub const SUBPROCESS_TRIGGER: &str = "subproceso";

/// Per-invocation state of one flow execution in a (possibly nested) call chain
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub process_id: String,
    pub parent_process_id: Option<String>,
    /// Values passed in by the caller
    pub variables: Map,
    /// Shared by every invocation of the chain
    pub globals: Arc<RwLock<Map>>,
    pub depth: usize,
    /// Ancestors of this invocation, outermost first
    pub call_stack: Vec<String>,
    pub trace_id: String,
    pub timeout: Duration,
    pub started_at: Instant,
    pub cancellation: CancellationToken,
}

impl InvocationContext {
    /// Top-level invocation: globals start from the input plus `Usuario`/`Fecha` defaults
    pub fn root(process_id: impl Into<String>, input: &Map, config: &RuntimeConfig) -> Self {
        let mut globals = input.clone();
        globals
            .entry("Usuario")
            .or_insert_with(|| Value::String(config.default_user.clone()));
        globals
            .entry("Fecha")
            .or_insert_with(|| Value::String(Local::now().format("%Y-%m-%d").to_string()));

        Self {
            process_id: process_id.into(),
            parent_process_id: None,
            variables: input.clone(),
            globals: Arc::new(RwLock::new(globals)),
            depth: 0,
            call_stack: Vec::new(),
            trace_id: uuid::Uuid::new_v4().to_string(),
            timeout: Duration::from_millis(config.default_subprocess_timeout_ms),
            started_at: Instant::now(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Invocation of `process_id` called from this one
    pub fn child(&self, process_id: impl Into<String>, variables: Map, timeout: Duration) -> Self {
        let mut call_stack = self.call_stack.clone();
        call_stack.push(self.process_id.clone());

        Self {
            process_id: process_id.into(),
            parent_process_id: Some(self.process_id.clone()),
            variables,
            globals: Arc::clone(&self.globals),
            depth: self.depth + 1,
            call_stack,
            trace_id: self.trace_id.clone(),
            timeout,
            started_at: Instant::now(),
            cancellation: self.cancellation.child_token(),
        }
    }

    pub fn global(&self, key: &str) -> Option<Value> {
        self.globals.read().get(key).cloned()
    }

    /// Whether `process_id` is this invocation or one of its ancestors
    pub fn is_active(&self, process_id: &str) -> bool {
        self.process_id == process_id || self.call_stack.iter().any(|p| p == process_id)
    }

    fn chain(&self) -> String {
        let mut chain = self.call_stack.clone();
        chain.push(self.process_id.clone());
        chain.join(" -> ")
    }
}

/// Check that `target` may be invoked from `parent`
pub fn check_invocation(
    node_id: &str,
    target: &str,
    parent: &InvocationContext,
    max_depth: usize,
) -> Result<(), SubprocessError> {
    if target.trim().is_empty() {
        return Err(SubprocessError::MissingSubprocessId(node_id.to_string()));
    }
    if parent.depth >= max_depth {
        return Err(SubprocessError::MaxDepthExceeded {
            depth: parent.depth + 1,
            max: max_depth,
        });
    }
    if parent.is_active(target) {
        return Err(SubprocessError::RecursionDetected {
            process_id: target.to_string(),
            stack: parent.chain(),
        });
    }
    Ok(())
}

pub(crate) struct SubprocessOutcome {
    pub errored: bool,
    pub applied: Map,
}

/// Run another flow as a step of the current one.
///
/// The nested run executes on its own task under the invocation timeout;
/// on expiry its cancellation token fires and the task is aborted. Guard
/// and timeout failures are returned as errors; failures reported by the
/// nested run itself are recorded in the context as a soft failure.
pub(crate) async fn invoke(
    executor: &FlowExecutor,
    node: &NodeSpec,
    config: &SubprocessConfig,
    context: &mut Context,
    parent: &InvocationContext,
    channel: &str,
) -> Result<SubprocessOutcome, SubprocessError> {
    let settings = &executor.services().config;
    check_invocation(&node.id, &config.process_id, parent, settings.max_subprocess_depth)?;

    let variables = map_variables(&config.assignments, context);
    let timeout_ms = config
        .timeout_ms
        .unwrap_or(settings.default_subprocess_timeout_ms);
    let timeout = Duration::from_millis(timeout_ms);
    let child = parent.child(config.process_id.clone(), variables.clone(), timeout);
    let cancellation = child.cancellation.clone();

    tracing::info!(
        "Invoking subprocess {} from {} (depth {})",
        config.process_id,
        parent.process_id,
        child.depth
    );

    let request = ExecutionRequest {
        process_id: config.process_id.clone(),
        input: variables,
        channel: channel.to_string(),
        trigger: SUBPROCESS_TRIGGER.to_string(),
    };
    let mut handle = tokio::spawn(executor.execute_boxed(request, child));

    let joined = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            cancellation.cancel();
            handle.abort();
            return Err(SubprocessError::Timeout {
                process_id: config.process_id.clone(),
                timeout_ms,
            });
        }
    };

    let result = match joined {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            tracing::warn!("Subprocess {} failed: {}", config.process_id, err);
            context.set_error("SUB_ERROR", "Error en subproceso", err.to_string());
            return Ok(SubprocessOutcome {
                errored: true,
                applied: Map::new(),
            });
        }
        Err(join_err) => {
            return Err(SubprocessError::Failed {
                process_id: config.process_id.clone(),
                message: join_err.to_string(),
            })
        }
    };

    match result.status {
        STATUS_OK => {
            let data = result.data.clone().unwrap_or_default();
            context.extend(&data);
            Ok(SubprocessOutcome {
                errored: result.error_code().is_some(),
                applied: data,
            })
        }
        STATUS_INCOMPLETE => {
            context.set_error(
                STATUS_INCOMPLETE.to_string(),
                result.message.clone(),
                format!("subprocess {} did not reach an output node", config.process_id),
            );
            Ok(SubprocessOutcome {
                errored: true,
                applied: Map::new(),
            })
        }
        _ => {
            let fields = result.data.clone().unwrap_or_default();
            for key in [keys::ERROR_CODE, keys::ERROR_MESSAGE, keys::ERROR_DETAIL] {
                let value = fields.get(key).cloned().unwrap_or(Value::String(String::new()));
                context.insert(key, value);
            }
            Ok(SubprocessOutcome {
                errored: true,
                applied: fields,
            })
        }
    }
}

/// Values passed to the nested flow: field copies and literals only
fn map_variables(groups: &AssignmentGroups, context: &Context) -> Map {
    let mut variables = Map::new();
    for assignment in flatten(groups) {
        if assignment.destination.trim().is_empty() {
            continue;
        }
        match assignment.kind {
            AssignmentKind::Field => {
                let field = assignment.value.to_plain_string();
                match context.get(&field) {
                    Some(value) => {
                        variables.insert(assignment.destination.clone(), value.clone());
                    }
                    None => tracing::warn!(
                        "Subprocess variable '{}': field '{}' not in context",
                        assignment.destination,
                        field
                    ),
                }
            }
            AssignmentKind::Literal => {
                variables.insert(assignment.destination.clone(), assignment.value.clone());
            }
            ref other => tracing::warn!(
                "Subprocess variable '{}': assignment type {:?} is not supported here",
                assignment.destination,
                other
            ),
        }
    }
    variables
}
