use crate::expression::ExpressionEvaluator;
use crate::functions::FunctionRegistry;
use crate::nodes::condition::{self, ConditionIdentity};
use crate::nodes::{entry, output, process, splitter};
use crate::registry::BackendRegistry;
use crate::resolver::ValueResolver;
use crate::runtime::RuntimeConfig;
use crate::subprocess::{self, InvocationContext};
use futures::future::BoxFuture;
use motorcore::{
    keys, AuditSink, Context, EdgeSpec, ExecutionResult, FlowDefinition, FlowError, FlowStore,
    LogEntry, LogStatus, Map, NodeConfig, NodeKind, NodeSpec, ServerStore, StoreError,
    TableStore, Value, ValueExt,
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Collaborators shared by every execution of a runtime
pub struct EngineServices {
    pub flows: Arc<dyn FlowStore>,
    pub servers: Arc<dyn ServerStore>,
    pub tables: Arc<dyn TableStore>,
    pub backends: Arc<BackendRegistry>,
    pub functions: Arc<FunctionRegistry>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    pub audit: Arc<dyn AuditSink>,
    pub config: RuntimeConfig,
}

impl EngineServices {
    pub fn resolver(&self) -> ValueResolver<'_> {
        ValueResolver::new(&self.functions, self.tables.as_ref())
    }
}

/// A request to run one stored flow
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub process_id: String,
    pub input: Map,
    pub channel: String,
    pub trigger: String,
}

/// One node of a compiled flow graph with its decoded configuration
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub spec: NodeSpec,
    pub kind: NodeKind,
    pub config: Result<NodeConfig, String>,
}

/// Flow definition indexed as a directed graph
pub struct FlowGraph {
    pub id: String,
    pub name: String,
    graph: DiGraph<GraphNode, EdgeSpec>,
    entry: Option<NodeIndex>,
    issues: Vec<String>,
}

impl FlowGraph {
    /// Index the nodes and edges of a definition.
    ///
    /// Dangling edges are dropped; they and other structural oddities are
    /// reported through [`FlowGraph::issues`].
    pub fn build(definition: FlowDefinition) -> Self {
        let mut graph = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        let mut issues = Vec::new();
        let mut entry = None;

        for spec in definition.nodes {
            let kind = spec.kind();
            let config = NodeConfig::decode(&spec).map_err(|e| e.to_string());
            if let Err(err) = &config {
                issues.push(format!("node '{}' has invalid data: {}", spec.id, err));
            }
            if let NodeKind::Unknown(raw) = &kind {
                issues.push(format!("node '{}' has unknown type '{}'", spec.id, raw));
            }

            let id = spec.id.clone();
            let idx = graph.add_node(GraphNode { spec, kind, config });
            if index.insert(id.clone(), idx).is_some() {
                issues.push(format!("duplicate node id '{}'", id));
            }
            if graph[idx].kind == NodeKind::Entry {
                match entry {
                    None => entry = Some(idx),
                    Some(_) => issues.push(format!("extra entry node '{}' is ignored", id)),
                }
            }
        }

        for edge in definition.edges {
            match (index.get(&edge.source), index.get(&edge.target)) {
                (Some(&from), Some(&to)) => {
                    graph.add_edge(from, to, edge);
                }
                _ => {
                    tracing::warn!("Ignoring dangling edge {} -> {}", edge.source, edge.target);
                    issues.push(format!(
                        "edge '{}' references unknown node ({} -> {})",
                        edge.id, edge.source, edge.target
                    ));
                }
            }
        }

        if entry.is_none() {
            issues.push("flow has no entry node".to_string());
        }

        Self {
            id: definition.id,
            name: definition.name,
            graph,
            entry,
            issues,
        }
    }

    pub fn entry(&self) -> Option<NodeIndex> {
        self.entry
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges of a node with their targets
    pub fn outgoing(&self, idx: NodeIndex) -> impl Iterator<Item = (NodeIndex, &EdgeSpec)> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (edge.target(), edge.weight()))
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }
}

/// How a node wants the traversal to continue
enum Step {
    /// Follow edges matching the error state
    Routed { errored: bool },
    /// Follow the `true`/`false` handle
    Branch(bool),
    /// Route by target type, then by error state
    Subprocess { errored: bool },
    /// Output node produced the response
    Output(Map),
}

struct NodeReport {
    step: Step,
    applied: Map,
    error: Option<String>,
}

impl NodeReport {
    fn routed(applied: Map) -> Self {
        Self {
            step: Step::Routed { errored: false },
            applied,
            error: None,
        }
    }
}

/// Interprets flow graphs: runs the entry node, then drains a pending set
/// of successors, routing each executed node by its outcome.
#[derive(Clone)]
pub struct FlowExecutor {
    services: Arc<EngineServices>,
}

impl FlowExecutor {
    pub fn new(services: Arc<EngineServices>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &EngineServices {
        &self.services
    }

    /// Execute a stored flow under the given invocation
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        invocation: InvocationContext,
    ) -> Result<ExecutionResult, FlowError> {
        self.execute_boxed(request, invocation).await
    }

    /// Owned, boxed execution future; nested subprocess runs are spawned from it
    pub(crate) fn execute_boxed(
        &self,
        request: ExecutionRequest,
        invocation: InvocationContext,
    ) -> BoxFuture<'static, Result<ExecutionResult, FlowError>> {
        let executor = self.clone();
        Box::pin(async move { executor.run(request, invocation).await })
    }

    async fn run(
        &self,
        request: ExecutionRequest,
        invocation: InvocationContext,
    ) -> Result<ExecutionResult, FlowError> {
        let started = Instant::now();

        let record = self
            .services
            .flows
            .load_flow(&request.process_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => FlowError::NotFound(request.process_id.clone()),
                other => FlowError::Store(other),
            })?;
        let graph = FlowGraph::build(FlowDefinition::parse(&record.flow)?);
        let entry_idx = graph.entry().ok_or(FlowError::NoEntryNode)?;
        let flow_name = if record.name.is_empty() {
            graph.name.clone()
        } else {
            record.name.clone()
        };

        tracing::info!(
            "Starting flow {} ({}) trigger={} depth={}",
            request.process_id,
            flow_name,
            request.trigger,
            invocation.depth
        );

        let resolver = self.services.resolver();
        let mut applied = Map::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut pending: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut response: Option<Map> = None;
        let mut unrouted_error = false;

        let entry_node = graph.node(entry_idx);
        let entry_config = match &entry_node.config {
            Ok(NodeConfig::Entry(config)) => config,
            Ok(_) => return Err(FlowError::NoEntryNode),
            Err(message) => {
                return Err(FlowError::InvalidNode {
                    node: entry_node.spec.id.clone(),
                    message: message.clone(),
                })
            }
        };
        let entry_started = Instant::now();
        let (mut context, entry_applied) = entry::execute(entry_config, &request.input, &resolver)?;
        self.audit_node(
            &request,
            &invocation,
            &flow_name,
            entry_node,
            Value::Object(request.input.clone()),
            &entry_applied,
            &context,
            None,
            entry_started,
        );
        applied.extend(entry_applied);
        visited.insert(entry_idx);
        enqueue(&graph, entry_idx, &visited, &mut pending, |edge, _| !edge.is_error());

        while let Some(idx) = pending.pop_first() {
            if invocation.cancellation.is_cancelled() {
                tracing::warn!("Flow {} cancelled", request.process_id);
                return Err(FlowError::Cancelled);
            }
            if !visited.insert(idx) {
                continue;
            }

            let node = graph.node(idx);
            let node_started = Instant::now();
            let before = Value::Object(context.as_map().clone());
            tracing::debug!("Executing node {} ({})", node.spec.id, node.kind);

            let report = self
                .run_node(node, &mut context, &request, &invocation, &flow_name)
                .await?;

            self.audit_node(
                &request,
                &invocation,
                &flow_name,
                node,
                before,
                &report.applied,
                &context,
                report.error.as_deref(),
                node_started,
            );
            applied.extend(report.applied);

            match report.step {
                Step::Routed { errored } => {
                    let taken = enqueue(&graph, idx, &visited, &mut pending, |edge, _| {
                        edge.follows(errored)
                    });
                    if errored && taken == 0 {
                        unrouted_error = true;
                    }
                }
                Step::Branch(met) => {
                    let handle = met.to_string();
                    enqueue(&graph, idx, &visited, &mut pending, |edge, _| {
                        edge.source_handle.as_deref() == Some(handle.as_str())
                    });
                }
                Step::Subprocess { errored } => {
                    let taken = enqueue(&graph, idx, &visited, &mut pending, |edge, target| {
                        match target.kind {
                            NodeKind::Output => !errored,
                            NodeKind::ErrorOutput => errored,
                            _ => edge.follows(errored),
                        }
                    });
                    if errored && taken == 0 {
                        unrouted_error = true;
                    }
                }
                Step::Output(data) => {
                    response = Some(data);
                    if !self.services.config.drain_after_output {
                        break;
                    }
                }
            }
        }

        let result = match response {
            Some(data) => ExecutionResult::completed(&request.process_id, &request.trigger, data),
            None if unrouted_error => ExecutionResult::failed(
                &request.process_id,
                &request.trigger,
                format!("node execution error: {}", context.get_string(keys::ERROR_MESSAGE)),
                context.error_fields(),
            ),
            None => ExecutionResult::incomplete(&request.process_id, &request.trigger),
        };

        let status = match result.status {
            motorcore::STATUS_OK => LogStatus::Ok,
            motorcore::STATUS_INCOMPLETE => LogStatus::Incomplete,
            _ => LogStatus::Error,
        };
        self.services.audit.record(
            LogEntry::new(&invocation.trace_id, &request.process_id, "flujo", &flow_name)
                .with_process_name(&flow_name)
                .with_channel(&request.channel)
                .with_parameters(Value::Object(request.input.clone()))
                .with_result(serde_json::to_value(&result).unwrap_or(Value::Null))
                .with_assignments(Value::Object(applied))
                .with_duration_ms(started.elapsed().as_millis() as u64)
                .with_status(status),
        );
        tracing::info!(
            "Flow {} finished with status {} in {}ms ({} node(s) visited)",
            request.process_id,
            result.status,
            started.elapsed().as_millis(),
            visited.len()
        );

        Ok(result)
    }

    async fn run_node(
        &self,
        node: &GraphNode,
        context: &mut Context,
        request: &ExecutionRequest,
        invocation: &InvocationContext,
        flow_name: &str,
    ) -> Result<NodeReport, FlowError> {
        let config = match &node.config {
            Ok(config) => config,
            Err(message) => return self.invalid_config(node, message, context),
        };

        match config {
            NodeConfig::Process(config) => {
                let call = process::ProcessCall {
                    node: &node.spec,
                    config,
                    process_id: &request.process_id,
                    services: &self.services,
                    cancellation: &invocation.cancellation,
                };
                match process::execute(call, context).await {
                    Ok(applied) => Ok(NodeReport::routed(applied)),
                    Err(err) => {
                        tracing::warn!("Process node {} failed: {}", node.spec.id, err);
                        context.set_error("99", "Error en ejecución", err.to_string());
                        Ok(soft_failure(Step::Routed { errored: true }, err.to_string()))
                    }
                }
            }

            NodeConfig::Condition(config) => {
                let user = invocation
                    .global("Usuario")
                    .map(|v| v.to_plain_string())
                    .unwrap_or_else(|| self.services.config.default_user.clone());
                let role = invocation
                    .global("Rol")
                    .map(|v| v.to_plain_string())
                    .unwrap_or_else(|| self.services.config.default_role.clone());
                let identity = ConditionIdentity {
                    user: &user,
                    role: &role,
                    process_name: flow_name,
                    flow_id: &request.process_id,
                };
                let outcome = condition::execute(
                    &node.spec,
                    config,
                    context,
                    self.services.evaluator.as_ref(),
                    &identity,
                )?;
                Ok(NodeReport {
                    step: Step::Branch(outcome.met),
                    applied: outcome.applied,
                    error: outcome.error,
                })
            }

            NodeConfig::Splitter(config) => {
                match splitter::execute(config, context, &self.services.resolver()) {
                    Ok(produced) => Ok(NodeReport::routed(produced)),
                    Err(err) => {
                        tracing::warn!("Splitter node {} failed: {}", node.spec.id, err);
                        context.set_error("SPLITTER_ERROR", "Error en splitter", err.to_string());
                        Ok(soft_failure(Step::Routed { errored: true }, err.to_string()))
                    }
                }
            }

            NodeConfig::Subprocess(config) => {
                match subprocess::invoke(self, &node.spec, config, context, invocation, &request.channel)
                    .await
                {
                    Ok(outcome) => Ok(NodeReport {
                        step: Step::Subprocess {
                            errored: outcome.errored,
                        },
                        applied: outcome.applied,
                        error: None,
                    }),
                    Err(err) => {
                        tracing::warn!("Subprocess node {} failed: {}", node.spec.id, err);
                        context.set_error("SUB_ERROR", "Error en subproceso", err.to_string());
                        Ok(soft_failure(Step::Subprocess { errored: true }, err.to_string()))
                    }
                }
            }

            NodeConfig::Output(config) => {
                let data = output::execute(config, context, &self.services.resolver());
                Ok(NodeReport {
                    step: Step::Output(data.clone()),
                    applied: data,
                    error: None,
                })
            }

            NodeConfig::ErrorOutput(config) => {
                let data = output::execute_error(config, context);
                Ok(NodeReport {
                    step: Step::Output(data.clone()),
                    applied: data,
                    error: None,
                })
            }

            // A second entry node reached through an edge only passes through
            NodeConfig::Entry(_) | NodeConfig::Unknown => Ok(NodeReport::routed(Map::new())),
        }
    }

    /// Undecodable node data: soft failure for nodes that can fail softly
    fn invalid_config(
        &self,
        node: &GraphNode,
        message: &str,
        context: &mut Context,
    ) -> Result<NodeReport, FlowError> {
        let detail = format!("invalid node data: {}", message);
        match node.kind {
            NodeKind::Process => {
                context.set_error("99", "Error en ejecución", detail.clone());
                Ok(soft_failure(Step::Routed { errored: true }, detail))
            }
            NodeKind::Splitter => {
                context.set_error("SPLITTER_ERROR", "Error en splitter", detail.clone());
                Ok(soft_failure(Step::Routed { errored: true }, detail))
            }
            NodeKind::Subprocess => {
                context.set_error("SUB_ERROR", "Error en subproceso", detail.clone());
                Ok(soft_failure(Step::Subprocess { errored: true }, detail))
            }
            _ => Err(FlowError::InvalidNode {
                node: node.spec.id.clone(),
                message: message.to_string(),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn audit_node(
        &self,
        request: &ExecutionRequest,
        invocation: &InvocationContext,
        flow_name: &str,
        node: &GraphNode,
        parameters: Value,
        applied: &Map,
        context: &Context,
        error: Option<&str>,
        started: Instant,
    ) {
        let mut entry = LogEntry::new(
            &invocation.trace_id,
            &request.process_id,
            node.kind.as_str(),
            node.spec.label(),
        )
        .with_process_name(flow_name)
        .with_channel(&request.channel)
        .with_parameters(parameters)
        .with_assignments(Value::Object(applied.clone()))
        .with_duration_ms(started.elapsed().as_millis() as u64);

        if node.kind == NodeKind::Process {
            entry = entry
                .with_full_output(context.get(keys::FULL_OUTPUT_RAW).cloned().unwrap_or(Value::Null))
                .with_result(context.get(keys::FULL_OUTPUT).cloned().unwrap_or(Value::Null));
        } else {
            entry = entry.with_result(Value::Object(applied.clone()));
        }
        if let Some(detail) = error {
            entry = entry.failed(detail);
        }
        self.services.audit.record(entry);
    }
}

fn soft_failure(step: Step, detail: String) -> NodeReport {
    NodeReport {
        step,
        applied: Map::new(),
        error: Some(detail),
    }
}

/// Add unvisited successors whose edge passes `follow`; returns how many edges matched
fn enqueue<F>(
    graph: &FlowGraph,
    from: NodeIndex,
    visited: &HashSet<NodeIndex>,
    pending: &mut BTreeSet<NodeIndex>,
    follow: F,
) -> usize
where
    F: Fn(&EdgeSpec, &GraphNode) -> bool,
{
    let mut taken = 0;
    for (target, edge) in graph.outgoing(from) {
        if !follow(edge, graph.node(target)) {
            continue;
        }
        taken += 1;
        if !visited.contains(&target) {
            pending.insert(target);
        }
    }
    taken
}
