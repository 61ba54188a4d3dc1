use super::schema::{discover_fields, extract_values};
use crate::executor::EngineServices;
use crate::resolver::OnFailure;
use motorcore::{keys, BackendError, Context, FieldDef, Map, NodeError, NodeSpec, ProcessConfig, Value};
use tokio_util::sync::CancellationToken;

pub(crate) struct ProcessCall<'a> {
    pub node: &'a NodeSpec,
    pub config: &'a ProcessConfig,
    pub process_id: &'a str,
    pub services: &'a EngineServices,
    pub cancellation: &'a CancellationToken,
}

/// Call the node's backend and fold the response into the context.
///
/// The raw response lands in `FullOutput` (also when the backend reports a
/// failure but still answered); the parsed form in `fullOutput` and
/// `fullOutput_<id>`; declared output fields are copied to the top level.
pub(crate) async fn execute(call: ProcessCall<'_>, context: &mut Context) -> Result<Map, NodeError> {
    let ProcessCall {
        node,
        config,
        process_id,
        services,
        cancellation,
    } = call;

    if config.server_id.trim().is_empty() {
        return Err(NodeError::Configuration("servidorId is not set".to_string()));
    }
    let server = services
        .servers
        .load_server(&config.server_id)
        .await
        .map_err(|source| NodeError::Server {
            server: config.server_id.clone(),
            source,
        })?;

    let mut applied = services
        .resolver()
        .resolve_groups(&config.assignments, context, OnFailure::Propagate)?;
    context.extend(&applied);

    let backend = services.backends.get(&server.server_type)?;
    tracing::debug!(
        "Process {} calling {} backend at {} ({})",
        node.id,
        server.server_type,
        server.host,
        config.object
    );

    let outcome = tokio::select! {
        outcome = backend.execute(node, context, &server) => outcome,
        _ = cancellation.cancelled() => Err(BackendError::Cancelled),
    };

    let raw = match &outcome {
        Ok(text) => Some(text.clone()),
        Err(err) => err.raw_output().map(str::to_string),
    };
    let parsed = match raw {
        Some(text) => store_full_output(context, &node.id, text),
        None => Value::Null,
    };

    let raw_text = outcome?;

    let fields = if config.parse_full_output {
        discover_and_persist(&raw_text, node, config, process_id, services).await
    } else {
        config.output_params.clone()
    };

    let extracted = extract_values(&parsed, &fields, config.parent_tag.as_deref());
    context.extend(&extracted);
    applied.extend(extracted);

    Ok(applied)
}

fn store_full_output(context: &mut Context, node_id: &str, raw: String) -> Value {
    let parsed = serde_json::from_str::<Value>(&raw)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
        .unwrap_or_else(|| Value::Object(Map::new()));

    context.insert(keys::FULL_OUTPUT_RAW, raw);
    context.insert(format!("{}{}", keys::FULL_OUTPUT_PREFIX, node_id), parsed.clone());
    context.insert(keys::FULL_OUTPUT, parsed.clone());
    parsed
}

/// Discover the response schema and write it back onto the stored node.
/// Falls back to the declared fields when nothing can be discovered.
async fn discover_and_persist(
    raw: &str,
    node: &NodeSpec,
    config: &ProcessConfig,
    process_id: &str,
    services: &EngineServices,
) -> Vec<FieldDef> {
    let fields = match discover_fields(
        raw,
        config.response_type.as_deref(),
        config.parent_tag.as_deref(),
    ) {
        Ok(fields) if !fields.is_empty() => fields,
        Ok(_) => return config.output_params.clone(),
        Err(err) => {
            tracing::warn!("Could not discover output schema for node {}: {}", node.id, err);
            return config.output_params.clone();
        }
    };

    let mut updated = node.clone();
    match serde_json::to_value(&fields) {
        Ok(schema) => {
            updated.data.insert("parametrosSalida".to_string(), schema);
            updated.data.insert("parsearFullOutput".to_string(), Value::Bool(false));
            if let Err(err) = services.flows.update_node(process_id, &updated).await {
                tracing::warn!("Could not persist output schema for node {}: {}", node.id, err);
            } else {
                tracing::info!(
                    "Persisted {} discovered output field(s) for node {}",
                    fields.len(),
                    node.id
                );
            }
        }
        Err(err) => tracing::warn!("Could not encode output schema: {}", err),
    }

    fields
}
