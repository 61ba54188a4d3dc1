use crate::assignment::{null_default, Assignment, AssignmentGroups};
use crate::{NodeSpec, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Node type tags understood by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Entry,
    Process,
    Condition,
    Splitter,
    Subprocess,
    Output,
    ErrorOutput,
    Unknown(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Entry => "entrada",
            NodeKind::Process => "proceso",
            NodeKind::Condition => "condicion",
            NodeKind::Splitter => "splitter",
            NodeKind::Subprocess => "subproceso",
            NodeKind::Output => "salida",
            NodeKind::ErrorOutput => "salidaError",
            NodeKind::Unknown(raw) => raw,
        }
    }

    /// `salida` and `salidaError` end a traversal
    pub fn is_output(&self) -> bool {
        matches!(self, NodeKind::Output | NodeKind::ErrorOutput)
    }
}

impl From<&str> for NodeKind {
    fn from(raw: &str) -> Self {
        match raw {
            "entrada" => NodeKind::Entry,
            "proceso" => NodeKind::Process,
            "condicion" => NodeKind::Condition,
            "splitter" => NodeKind::Splitter,
            "subproceso" => NodeKind::Subprocess,
            "salida" => NodeKind::Output,
            "salidaError" => NodeKind::ErrorOutput,
            other => NodeKind::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed configuration of a node, decoded once from its `data` document
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Entry(EntryConfig),
    Process(ProcessConfig),
    Condition(ConditionConfig),
    Splitter(SplitterConfig),
    Subprocess(SubprocessConfig),
    Output(OutputConfig),
    ErrorOutput(ErrorOutputConfig),
    Unknown,
}

impl NodeConfig {
    pub fn decode(node: &NodeSpec) -> Result<Self, serde_json::Error> {
        Ok(match node.kind() {
            NodeKind::Entry => NodeConfig::Entry(decode_data(node)?),
            NodeKind::Process => NodeConfig::Process(decode_data(node)?),
            NodeKind::Condition => NodeConfig::Condition(decode_data(node)?),
            NodeKind::Splitter => NodeConfig::Splitter(decode_data(node)?),
            NodeKind::Subprocess => NodeConfig::Subprocess(decode_data(node)?),
            NodeKind::Output => NodeConfig::Output(decode_data(node)?),
            NodeKind::ErrorOutput => NodeConfig::ErrorOutput(decode_data(node)?),
            NodeKind::Unknown(_) => NodeConfig::Unknown,
        })
    }
}

/// Decode a node's `data` document into a typed configuration
pub fn decode_data<T: DeserializeOwned>(node: &NodeSpec) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(node.data.clone()))
}

/// Declared parameter (input or output) of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "nombre")]
    pub name: String,

    #[serde(rename = "tipo", default, deserialize_with = "null_default")]
    pub kind: String,

    #[serde(
        rename = "subcampos",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub subfields: Vec<FieldDef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            subfields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    #[serde(rename = "campos", default, deserialize_with = "null_default")]
    pub fields: Vec<EntryField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryField {
    #[serde(rename = "nombre")]
    pub name: String,

    #[serde(rename = "tipo", default, deserialize_with = "null_default")]
    pub kind: String,

    #[serde(rename = "asignacion", default)]
    pub assignment: Option<Assignment>,

    #[serde(rename = "orden", default, deserialize_with = "lenient_i64")]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(rename = "servidorId", default, deserialize_with = "lenient_string")]
    pub server_id: String,

    #[serde(rename = "tipoObjeto", default, deserialize_with = "null_default")]
    pub object_type: String,

    #[serde(rename = "objeto", default, deserialize_with = "null_default")]
    pub object: String,

    #[serde(rename = "metodoHttp", default)]
    pub http_method: Option<String>,

    #[serde(rename = "parametrosEntrada", default, deserialize_with = "null_default")]
    pub input_params: Vec<FieldDef>,

    #[serde(rename = "parametrosSalida", default, deserialize_with = "null_default")]
    pub output_params: Vec<FieldDef>,

    #[serde(rename = "asignaciones", default, deserialize_with = "null_default")]
    pub assignments: AssignmentGroups,

    #[serde(rename = "parsearFullOutput", default, deserialize_with = "null_default")]
    pub parse_full_output: bool,

    #[serde(rename = "tipoRespuesta", default)]
    pub response_type: Option<String>,

    #[serde(rename = "tagPadre", default)]
    pub parent_tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(rename = "condicion", default)]
    pub expression: Option<String>,

    #[serde(rename = "parametrosEntrada", default, deserialize_with = "null_default")]
    pub input_params: Vec<FieldDef>,

    #[serde(rename = "parametrosSalida", default, deserialize_with = "null_default")]
    pub output_params: Vec<FieldDef>,

    #[serde(rename = "parametrosError", default, deserialize_with = "null_default")]
    pub error_params: Vec<FieldDef>,
}

/// Fixed-width segment of a positional string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "nombre", default, deserialize_with = "null_default")]
    pub name: String,

    #[serde(rename = "longitud", default, deserialize_with = "lenient_usize")]
    pub length: Option<usize>,

    #[serde(rename = "inicio", default, deserialize_with = "lenient_usize")]
    pub start: Option<usize>,

    #[serde(rename = "repeticiones", default, deserialize_with = "lenient_usize")]
    pub repetitions: Option<usize>,

    #[serde(rename = "tipo_estructura", default)]
    pub structure: Option<String>,

    #[serde(default)]
    pub encoding: Option<String>,

    #[serde(rename = "relleno", default)]
    pub padding: Option<String>,
}

impl Segment {
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length: Some(length),
            ..Self::default()
        }
    }

    pub fn padded(mut self, padding: impl Into<String>) -> Self {
        self.padding = Some(padding.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    #[serde(rename = "subcampos", default, deserialize_with = "null_default")]
    pub subfields: Vec<Segment>,

    #[serde(rename = "nombreArray", default)]
    pub array_name: Option<String>,

    #[serde(rename = "nombreObjeto", default)]
    pub object_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitterConfig {
    #[serde(rename = "modoOperacion", default)]
    pub mode: Option<String>,

    #[serde(rename = "tipoAnalisis", default)]
    pub analysis: Option<String>,

    #[serde(rename = "modoParseo", default)]
    pub parse_mode: Option<String>,

    #[serde(rename = "campoEntrada", default)]
    pub input_field: Option<String>,

    #[serde(rename = "campoSalida", default)]
    pub output_field: Option<String>,

    #[serde(rename = "segmentosFijos", default, deserialize_with = "null_default")]
    pub segments: Vec<Segment>,

    #[serde(rename = "camposSalida", default, deserialize_with = "null_default")]
    pub output_fields: Vec<Segment>,

    #[serde(rename = "parametrosSalida", default, deserialize_with = "null_default")]
    pub output_params: Vec<Segment>,

    #[serde(rename = "longitudBloque", default, deserialize_with = "lenient_usize")]
    pub block_length: Option<usize>,

    #[serde(rename = "longitudRegistro", default, deserialize_with = "lenient_usize")]
    pub record_length: Option<usize>,

    #[serde(rename = "campoMultiple", default)]
    pub block: Option<BlockConfig>,

    #[serde(rename = "delimitadorPrincipal", default)]
    pub delimiter: Option<String>,

    #[serde(rename = "camposUnir", default, deserialize_with = "null_default")]
    pub join_fields: Vec<String>,

    #[serde(rename = "asignaciones", default, deserialize_with = "null_default")]
    pub assignments: AssignmentGroups,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubprocessConfig {
    #[serde(rename = "procesoId", default, deserialize_with = "lenient_string")]
    pub process_id: String,

    #[serde(rename = "asignaciones", default, deserialize_with = "null_default")]
    pub assignments: AssignmentGroups,

    #[serde(rename = "timeoutMs", default, deserialize_with = "lenient_u64")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "asignaciones", default, deserialize_with = "null_default")]
    pub assignments: AssignmentGroups,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorOutputConfig {
    #[serde(rename = "parametrosEntrada", default, deserialize_with = "null_default")]
    pub input_params: Vec<FieldDef>,
}

/// Accepts numbers or numeric strings for counts and lengths
fn lenient_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    Ok(lenient_f64(deserializer)?.filter(|n| *n >= 0.0).map(|n| n as usize))
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(lenient_f64(deserializer)?.filter(|n| *n >= 0.0).map(|n| n as u64))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(lenient_f64(deserializer)?.map(|n| n as i64))
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Ids may be stored as numbers or strings
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}
