use motorcore::{ResolveError, StoreError, TableData, TableStore, Value, ValueExt};

/// Fetch one cell of a lookup table.
///
/// Keyed tables are indexed directly. Row tables are scanned for the first
/// row whose key column (the first declared field, or `id`) renders equal
/// to `key`; rows lacking `field` are skipped.
pub fn resolve_table(
    store: &dyn TableStore,
    table: &str,
    key: &str,
    field: &str,
) -> Result<Value, ResolveError> {
    if table.trim().is_empty() {
        return Err(ResolveError::InvalidAssignment("table name must not be empty".to_string()));
    }
    if key.trim().is_empty() {
        return Err(ResolveError::InvalidAssignment(format!(
            "lookup key for table '{}' must not be empty",
            table
        )));
    }
    if field.trim().is_empty() {
        return Err(ResolveError::InvalidAssignment(format!(
            "field name for table '{}' must not be empty",
            table
        )));
    }

    let record = store.load_table(table).map_err(|err| match err {
        StoreError::NotFound { .. } => ResolveError::TableNotFound(table.to_string()),
        other => ResolveError::TableUnreadable {
            table: table.to_string(),
            message: other.to_string(),
        },
    })?;

    let data = record
        .rows()
        .map_err(|err| ResolveError::TableUnreadable {
            table: table.to_string(),
            message: err.to_string(),
        })?
        .ok_or_else(|| ResolveError::TableEmpty(table.to_string()))?;

    let found = match &data {
        TableData::Keyed(rows) => rows
            .get(key)
            .and_then(Value::as_object)
            .and_then(|row| row.get(field))
            .cloned(),
        TableData::Rows(rows) => {
            let key_field = record.key_field();
            rows.iter()
                .filter_map(Value::as_object)
                .filter(|row| {
                    row.get(&key_field)
                        .map(|candidate| candidate.to_plain_string() == key)
                        .unwrap_or(false)
                })
                .find_map(|row| row.get(field).cloned())
        }
    };

    found.ok_or_else(|| ResolveError::KeyNotFound {
        table: table.to_string(),
        key: key.to_string(),
        field: field.to_string(),
    })
}
