use crate::resolver::{OnFailure, ValueResolver};
use motorcore::{Context, ErrorOutputConfig, Map, OutputConfig};

/// Build the success response. Missing fields are left out; failing
/// function or table lookups yield null.
pub(crate) fn execute(config: &OutputConfig, context: &Context, resolver: &ValueResolver<'_>) -> Map {
    match resolver.resolve_groups(&config.assignments, context, OnFailure::StoreNull) {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!("Output assignments failed: {}", err);
            Map::new()
        }
    }
}

/// Build the error response from the declared context fields; fields
/// missing from the context are left out
pub(crate) fn execute_error(config: &ErrorOutputConfig, context: &Context) -> Map {
    config
        .input_params
        .iter()
        .filter(|param| !param.name.trim().is_empty())
        .filter_map(|param| {
            let value = context.get(&param.name)?;
            Some((param.name.clone(), value.clone()))
        })
        .collect()
}
