use crate::{Value, ValueExt};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// How an assignment produces its value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssignmentKind {
    /// `literal` / `valor`: the value itself
    Literal,
    /// `campo`: copy of a context field
    Field,
    /// `funcion` / `sistema`: system function call
    Function,
    /// `tabla`: lookup-table cell
    Table,
    Unsupported(String),
}

impl From<String> for AssignmentKind {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "literal" | "valor" => AssignmentKind::Literal,
            "campo" => AssignmentKind::Field,
            "funcion" | "sistema" => AssignmentKind::Function,
            "tabla" => AssignmentKind::Table,
            _ => AssignmentKind::Unsupported(raw),
        }
    }
}

impl From<AssignmentKind> for String {
    fn from(kind: AssignmentKind) -> Self {
        match kind {
            AssignmentKind::Literal => "literal".to_string(),
            AssignmentKind::Field => "campo".to_string(),
            AssignmentKind::Function => "funcion".to_string(),
            AssignmentKind::Table => "tabla".to_string(),
            AssignmentKind::Unsupported(raw) => raw,
        }
    }
}

/// Declarative rule producing one value from the context, a function or a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(rename = "tipo")]
    pub kind: AssignmentKind,

    #[serde(rename = "valor", default)]
    pub value: Value,

    #[serde(rename = "destino", default, deserialize_with = "null_default")]
    pub destination: String,

    #[serde(rename = "tabla", default, deserialize_with = "null_default")]
    pub table: String,

    #[serde(rename = "clave", default, deserialize_with = "null_default")]
    pub key: String,

    #[serde(rename = "campo", default, deserialize_with = "null_default")]
    pub field: String,

    #[serde(rename = "esClaveVariable", default, deserialize_with = "null_default")]
    pub key_is_variable: bool,
}

impl Assignment {
    pub fn new(kind: AssignmentKind, value: impl Into<Value>) -> Self {
        Self {
            kind,
            value: value.into(),
            destination: String::new(),
            table: String::new(),
            key: String::new(),
            field: String::new(),
            key_is_variable: false,
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(AssignmentKind::Literal, value)
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self::new(AssignmentKind::Field, name.into())
    }

    pub fn function(call: impl Into<String>) -> Self {
        Self::new(AssignmentKind::Function, call.into())
    }

    pub fn table(
        table: impl Into<String>,
        key: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            field: field.into(),
            ..Self::new(AssignmentKind::Table, Value::Null)
        }
    }

    pub fn to(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn variable_key(mut self) -> Self {
        self.key_is_variable = true;
        self
    }

    /// `valor` rendered as text (field names, function calls)
    pub fn value_text(&self) -> String {
        self.value.to_plain_string()
    }
}

/// Assignments grouped by the node they originate from
pub type AssignmentGroups = BTreeMap<String, Vec<Assignment>>;

/// All assignments of a grouped map in deterministic order
pub fn flatten(groups: &AssignmentGroups) -> impl Iterator<Item = &Assignment> {
    groups.values().flatten()
}

/// Deserialize `null` as the type's default
pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
