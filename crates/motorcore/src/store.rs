use crate::assignment::null_default;
use crate::{FlowDefinition, Map, NodeSpec, StoreError, Value};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stored process: identity plus the flow graph as opaque JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: String,

    #[serde(rename = "nombre", default)]
    pub name: String,

    #[serde(rename = "flujo")]
    pub flow: String,
}

impl FlowRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, flow: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            flow: flow.into(),
        }
    }

    pub fn from_definition(definition: &FlowDefinition) -> Result<Self, StoreError> {
        Ok(Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            flow: serde_json::to_string(definition)?,
        })
    }
}

/// Connection settings of a remote backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "codigo", default, deserialize_with = "null_default")]
    pub code: String,

    #[serde(rename = "nombre", default, deserialize_with = "null_default")]
    pub name: String,

    /// Backend type tag (`rest`, `soap`, `postgresql`, ...)
    #[serde(rename = "tipo")]
    pub server_type: String,

    pub host: String,

    #[serde(rename = "puerto", default)]
    pub port: Option<u16>,

    #[serde(rename = "usuario", default, deserialize_with = "null_default")]
    pub user: String,

    #[serde(rename = "clave", default, deserialize_with = "null_default")]
    pub password: String,

    #[serde(default, deserialize_with = "null_default")]
    pub extras: Map,
}

impl ServerConfig {
    pub fn new(
        id: impl Into<String>,
        server_type: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            server_type: server_type.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Extra setting rendered as text
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extras.get(key).and_then(Value::as_str)
    }
}

/// Stored lookup table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    #[serde(rename = "nombre")]
    pub name: String,

    /// Field declarations; the first field's `nombre` is the row key
    #[serde(rename = "campos", default)]
    pub fields: Value,

    #[serde(rename = "datos", default)]
    pub data: Value,
}

impl TableRecord {
    pub fn new(name: impl Into<String>, fields: Value, data: Value) -> Self {
        Self {
            name: name.into(),
            fields,
            data,
        }
    }

    /// Name of the key column of row-shaped tables
    pub fn key_field(&self) -> String {
        self.fields
            .as_array()
            .and_then(|fields| fields.first())
            .and_then(|first| first.get("nombre"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or("id")
            .to_string()
    }

    /// Decode the table body; `None` when it holds no rows
    pub fn rows(&self) -> Result<Option<TableData>, StoreError> {
        let data = match &self.data {
            // Bodies persisted as JSON text
            Value::String(text) if text.trim().is_empty() => return Ok(None),
            Value::String(text) => serde_json::from_str(text)?,
            other => other.clone(),
        };
        match data {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Array(rows) if rows.is_empty() => Ok(None),
            Value::Object(map) => Ok(Some(TableData::Keyed(map))),
            Value::Array(rows) => Ok(Some(TableData::Rows(rows))),
            other => Err(StoreError::Invalid(format!(
                "table '{}' data must be an object or array, got {}",
                self.name, other
            ))),
        }
    }
}

/// The two shapes a table body may take
#[derive(Debug, Clone, PartialEq)]
pub enum TableData {
    /// key -> row object
    Keyed(Map),
    /// rows carrying their key in the key column
    Rows(Vec<Value>),
}

/// Persistence of flow definitions
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn load_flow(&self, process_id: &str) -> Result<FlowRecord, StoreError>;

    /// Replace one node of a stored flow
    async fn update_node(&self, process_id: &str, node: &NodeSpec) -> Result<(), StoreError>;
}

/// Lookup of backend connection settings
#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn load_server(&self, server_id: &str) -> Result<ServerConfig, StoreError>;
}

/// Lookup tables are read-mostly and served synchronously so they can be
/// consulted from inside expression evaluation.
pub trait TableStore: Send + Sync {
    fn load_table(&self, name: &str) -> Result<TableRecord, StoreError>;
}

/// In-memory implementation of every store, used by tests and the CLI
#[derive(Default)]
pub struct MemoryStore {
    flows: RwLock<HashMap<String, FlowRecord>>,
    servers: RwLock<HashMap<String, ServerConfig>>,
    tables: RwLock<HashMap<String, TableRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_flow(&self, record: FlowRecord) {
        self.flows.write().insert(record.id.clone(), record);
    }

    pub fn insert_definition(&self, definition: &FlowDefinition) -> Result<(), StoreError> {
        self.insert_flow(FlowRecord::from_definition(definition)?);
        Ok(())
    }

    pub fn insert_server(&self, server: ServerConfig) {
        self.servers.write().insert(server.id.clone(), server);
    }

    pub fn insert_table(&self, table: TableRecord) {
        self.tables.write().insert(table.name.clone(), table);
    }

    pub fn flow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.flows.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current stored definition of a flow
    pub fn definition(&self, process_id: &str) -> Result<FlowDefinition, StoreError> {
        let flows = self.flows.read();
        let record = flows.get(process_id).ok_or_else(|| StoreError::NotFound {
            kind: "flow",
            id: process_id.to_string(),
        })?;
        Ok(serde_json::from_str(&record.flow)?)
    }
}

#[async_trait]
impl FlowStore for MemoryStore {
    async fn load_flow(&self, process_id: &str) -> Result<FlowRecord, StoreError> {
        self.flows
            .read()
            .get(process_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "flow",
                id: process_id.to_string(),
            })
    }

    async fn update_node(&self, process_id: &str, node: &NodeSpec) -> Result<(), StoreError> {
        let mut flows = self.flows.write();
        let record = flows.get_mut(process_id).ok_or_else(|| StoreError::NotFound {
            kind: "flow",
            id: process_id.to_string(),
        })?;

        let mut definition: FlowDefinition = serde_json::from_str(&record.flow)?;
        let slot = definition
            .find_node_mut(&node.id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "node",
                id: node.id.clone(),
            })?;
        *slot = node.clone();
        record.flow = serde_json::to_string(&definition)?;
        Ok(())
    }
}

#[async_trait]
impl ServerStore for MemoryStore {
    async fn load_server(&self, server_id: &str) -> Result<ServerConfig, StoreError> {
        self.servers
            .read()
            .get(server_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "server",
                id: server_id.to_string(),
            })
    }
}

impl TableStore for MemoryStore {
    fn load_table(&self, name: &str) -> Result<TableRecord, StoreError> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "table",
                id: name.to_string(),
            })
    }
}
