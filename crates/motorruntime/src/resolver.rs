use crate::functions::{CallScope, FunctionRegistry};
use crate::tables::resolve_table;
use motorcore::assignment::flatten;
use motorcore::{
    Assignment, AssignmentGroups, AssignmentKind, Context, Map, ResolveError, TableStore, Value,
    ValueExt,
};

/// What to do when a non-field assignment fails while resolving a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Abort and return the error
    Propagate,
    /// Store null under the destination and carry on
    StoreNull,
    /// Leave the destination unset and carry on
    Skip,
}

/// Turns assignments into concrete values against a context
#[derive(Clone, Copy)]
pub struct ValueResolver<'a> {
    functions: &'a FunctionRegistry,
    tables: &'a dyn TableStore,
}

impl<'a> ValueResolver<'a> {
    pub fn new(functions: &'a FunctionRegistry, tables: &'a dyn TableStore) -> Self {
        Self { functions, tables }
    }

    pub fn functions(&self) -> &'a FunctionRegistry {
        self.functions
    }

    pub fn tables(&self) -> &'a dyn TableStore {
        self.tables
    }

    /// Resolve a single assignment
    pub fn resolve(&self, assignment: &Assignment, context: &Context) -> Result<Value, ResolveError> {
        match &assignment.kind {
            AssignmentKind::Literal => Ok(assignment.value.clone()),
            AssignmentKind::Field => {
                let name = assignment.value_text();
                context
                    .get(&name)
                    .cloned()
                    .ok_or(ResolveError::FieldNotFound(name))
            }
            AssignmentKind::Function => {
                let scope = CallScope {
                    context,
                    tables: self.tables,
                };
                self.functions.invoke(&assignment.value_text(), &scope)
            }
            AssignmentKind::Table => self.resolve_table(assignment, context),
            AssignmentKind::Unsupported(kind) => {
                Err(ResolveError::UnsupportedAssignmentType(kind.clone()))
            }
        }
    }

    fn resolve_table(&self, assignment: &Assignment, context: &Context) -> Result<Value, ResolveError> {
        if assignment.table.trim().is_empty() || assignment.field.trim().is_empty() {
            return Err(ResolveError::InvalidAssignment(
                "table assignments need both tabla and campo".to_string(),
            ));
        }

        let declared_key = if assignment.key.trim().is_empty() {
            assignment.value_text()
        } else {
            assignment.key.clone()
        };

        let key = if assignment.key_is_variable {
            context
                .get(&declared_key)
                .map(ValueExt::to_plain_string)
                .ok_or(ResolveError::FieldNotFound(declared_key))?
        } else {
            declared_key
        };

        resolve_table(self.tables, &assignment.table, &key, &assignment.field)
    }

    /// Resolve every assignment of a grouped map into `destination -> value`.
    ///
    /// Assignments without a destination are ignored and missing context
    /// fields are skipped; other failures follow `on_failure`. All
    /// assignments see the same context snapshot.
    pub fn resolve_groups(
        &self,
        groups: &AssignmentGroups,
        context: &Context,
        on_failure: OnFailure,
    ) -> Result<Map, ResolveError> {
        let mut resolved = Map::new();
        for assignment in flatten(groups) {
            if assignment.destination.trim().is_empty() {
                continue;
            }
            match self.resolve(assignment, context) {
                Ok(value) => {
                    resolved.insert(assignment.destination.clone(), value);
                }
                Err(ResolveError::FieldNotFound(field)) => {
                    tracing::warn!(
                        "Skipping assignment to '{}': field '{}' not in context",
                        assignment.destination,
                        field
                    );
                }
                Err(err) => match on_failure {
                    OnFailure::Propagate => return Err(err),
                    OnFailure::StoreNull => {
                        tracing::warn!("Assignment to '{}' failed: {}", assignment.destination, err);
                        resolved.insert(assignment.destination.clone(), Value::Null);
                    }
                    OnFailure::Skip => {
                        tracing::warn!("Skipping assignment to '{}': {}", assignment.destination, err);
                    }
                },
            }
        }
        Ok(resolved)
    }
}
