use crate::expression::ExpressionEvaluator;
use chrono::Utc;
use motorcore::{coerce, keys, ConditionConfig, Context, FlowError, Map, NodeSpec, Value};

/// Identity values exposed to conditions under the reserved `__` keys
pub(crate) struct ConditionIdentity<'a> {
    pub user: &'a str,
    pub role: &'a str,
    pub process_name: &'a str,
    pub flow_id: &'a str,
}

pub(crate) struct ConditionOutcome {
    pub met: bool,
    pub applied: Map,
    pub error: Option<String>,
}

/// Evaluate the node's expression and record the verdict in the context.
///
/// Evaluation failures are recorded as node errors and count as `false`;
/// only a missing expression aborts the flow.
pub(crate) fn execute(
    node: &NodeSpec,
    config: &ConditionConfig,
    context: &mut Context,
    evaluator: &dyn ExpressionEvaluator,
    identity: &ConditionIdentity<'_>,
) -> Result<ConditionOutcome, FlowError> {
    let expression = config
        .expression
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| FlowError::InvalidNode {
            node: node.id.clone(),
            message: "condition node has no expression".to_string(),
        })?;

    let mut bindings = context.clone();
    bindings.insert(keys::DATE, Utc::now().to_rfc3339());
    bindings.insert(keys::USER, identity.user);
    bindings.insert(keys::ROLE, identity.role);
    bindings.insert(
        keys::PROCESS_NAME,
        config.label.clone().unwrap_or_else(|| identity.process_name.to_string()),
    );
    bindings.insert(keys::FLOW_ID, identity.flow_id);

    for param in &config.input_params {
        if let Some(value) = bindings.get(&param.name) {
            let converted = coerce(value, &param.kind);
            bindings.insert(param.name.clone(), converted);
        }
    }

    let met = match evaluator.evaluate(expression, &bindings) {
        Ok(met) => met,
        Err(err) => {
            tracing::warn!("Condition {} failed to evaluate: {}", node.id, err);
            context.set_error("99", "Error al evaluar condición", err.to_string());
            return Ok(ConditionOutcome {
                met: false,
                applied: Map::new(),
                error: Some(err.to_string()),
            });
        }
    };

    tracing::debug!("Condition {} `{}` => {}", node.id, expression, met);
    context.insert(keys::CONDITION_MET, met);
    context.insert(keys::CONDITION_RESULT, met);
    context.insert(format!("{}{}", keys::CONDITION_RESULT_PREFIX, node.id), met);

    let mut verdict = Map::new();
    verdict.insert(keys::CONDITION_MET.to_string(), Value::Bool(met));
    context.insert(keys::FULL_OUTPUT, Value::Object(verdict.clone()));

    let mut applied = Map::new();
    applied.insert(keys::CONDITION_MET.to_string(), Value::Bool(met));
    for param in &config.output_params {
        if let Some(value) = verdict.get(&param.name) {
            context.insert(param.name.clone(), value.clone());
            applied.insert(param.name.clone(), value.clone());
        }
    }

    if !met {
        context.set_error("66", "La condición no se cumple", "cumple=false");
        for param in &config.error_params {
            if let Some(value) = context.get(&param.name) {
                applied.insert(param.name.clone(), value.clone());
            }
        }
    }

    Ok(ConditionOutcome {
        met,
        applied,
        error: None,
    })
}
