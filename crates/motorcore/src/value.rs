use serde::{Deserialize, Serialize};

/// Dynamic value flowing through a flow execution (JSON shaped)
pub type Value = serde_json::Value;

/// String-keyed map of dynamic values
pub type Map = serde_json::Map<String, Value>;

/// Reserved context keys shared by node executors and callers
pub mod keys {
    pub const ERROR_CODE: &str = "codigoError";
    pub const ERROR_MESSAGE: &str = "mensajeError";
    pub const ERROR_DETAIL: &str = "detalleError";

    pub const FULL_OUTPUT_RAW: &str = "FullOutput";
    pub const FULL_OUTPUT: &str = "fullOutput";
    pub const FULL_OUTPUT_PREFIX: &str = "fullOutput_";

    pub const CONDITION_MET: &str = "cumple";
    pub const CONDITION_RESULT: &str = "resultado";
    pub const CONDITION_RESULT_PREFIX: &str = "resultado_";

    pub const DATE: &str = "__fecha";
    pub const USER: &str = "__usuario";
    pub const ROLE: &str = "__rol";
    pub const PROCESS_NAME: &str = "__nombreProceso";
    pub const FLOW_ID: &str = "__idFlujo";
}

/// Helpers over [`Value`] used throughout the engine
pub trait ValueExt {
    /// Render the value the way it is shown to users and backends:
    /// strings verbatim, scalars via their display form, null as empty.
    fn to_plain_string(&self) -> String;

    /// True for null, empty strings and whitespace-only strings
    fn is_blank(&self) -> bool;

    /// Schema type name used for discovered fields
    fn kind_name(&self) -> &'static str;

    /// Numeric view, accepting numeric strings
    fn as_lenient_f64(&self) -> Option<f64>;
}

impl ValueExt for Value {
    fn to_plain_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Value::Null | Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Number(n) if n.is_i64() || n.is_u64() => "int",
            Value::Number(_) => "float",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn as_lenient_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Convert a value to the declared parameter type (`int`, `float`, `boolean`).
///
/// Values that cannot be converted, and unknown type names, are returned unchanged.
pub fn coerce(value: &Value, declared: &str) -> Value {
    match declared.to_ascii_lowercase().as_str() {
        "int" | "integer" | "entero" => match value {
            Value::Number(n) if n.is_i64() => value.clone(),
            Value::Number(n) => n
                .as_f64()
                .map(|f| Value::from(f.trunc() as i64))
                .unwrap_or_else(|| value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            _ => value.clone(),
        },
        "float" | "double" | "decimal" | "number" => match value.as_lenient_f64() {
            Some(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            None => value.clone(),
        },
        "bool" | "boolean" => match value {
            Value::Bool(_) => value.clone(),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => value.clone(),
            },
            Value::Number(n) => Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Mutable key/value store threaded through one flow execution.
///
/// A single context is owned by the traversal and lent to each node in turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: Map,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Merge every entry of `other`, overwriting existing keys
    pub fn extend(&mut self, other: &Map) {
        for (key, value) in other {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &Map {
        &self.values
    }

    pub fn into_map(self) -> Map {
        self.values
    }

    /// Plain string view of a key, empty when absent
    pub fn get_string(&self, key: &str) -> String {
        self.values
            .get(key)
            .map(ValueExt::to_plain_string)
            .unwrap_or_default()
    }

    /// Record a node-level failure in the reserved error fields
    pub fn set_error(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.insert(keys::ERROR_CODE, code.into());
        self.insert(keys::ERROR_MESSAGE, message.into());
        self.insert(keys::ERROR_DETAIL, detail.into());
    }

    /// The three reserved error fields, with absent ones rendered empty
    pub fn error_fields(&self) -> Map {
        let mut fields = Map::new();
        for key in [keys::ERROR_CODE, keys::ERROR_MESSAGE, keys::ERROR_DETAIL] {
            fields.insert(
                key.to_string(),
                self.values.get(key).cloned().unwrap_or(Value::String(String::new())),
            );
        }
        fields
    }
}

impl From<Map> for Context {
    fn from(values: Map) -> Self {
        Self { values }
    }
}
