use crate::resolver::ValueResolver;
use motorcore::{Context, EntryConfig, EntryField, FlowError, Map};

/// Build the initial context from the caller's input.
///
/// Fields run in ascending `orden` (unordered fields last, declaration order
/// kept for ties), so an assignment may read fields resolved before it.
pub(crate) fn execute(
    config: &EntryConfig,
    input: &Map,
    resolver: &ValueResolver<'_>,
) -> Result<(Context, Map), FlowError> {
    let mut fields: Vec<&EntryField> = config.fields.iter().collect();
    fields.sort_by_key(|field| field.order.unwrap_or(i64::MAX));

    let mut scope = Context::from_map(input.clone());
    let mut context = Context::new();
    let mut applied = Map::new();

    for field in fields {
        let value = match &field.assignment {
            Some(assignment) => {
                resolver
                    .resolve(assignment, &scope)
                    .map_err(|source| FlowError::EntryField {
                        field: field.name.clone(),
                        source,
                    })?
            }
            None => input
                .get(&field.name)
                .cloned()
                .ok_or_else(|| FlowError::MissingRequiredField(field.name.clone()))?,
        };

        tracing::debug!("Entry field {} = {}", field.name, value);
        scope.insert(field.name.clone(), value.clone());
        context.insert(field.name.clone(), value.clone());
        applied.insert(field.name.clone(), value);
    }

    Ok((context, applied))
}
