#![allow(dead_code)]

use async_trait::async_trait;
use motorcore::{
    BackendError, BackendExecutor, Context, FlowDefinition, MemoryStore, NodeSpec, ServerConfig,
    Value,
};
use motorruntime::{MotorRuntime, RuntimeConfig};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SERVER_ID: &str = "srv";

/// Backend answering by the node's `objeto`; unknown objects fail with status 500
#[derive(Default)]
pub struct MockBackend {
    responses: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    seen: Mutex<Vec<(String, Context)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, object: &str, body: Value) -> Self {
        self.responses.insert(object.to_string(), body.to_string());
        self
    }

    pub fn respond_raw(mut self, object: &str, body: &str) -> Self {
        self.responses.insert(object.to_string(), body.to_string());
        self
    }

    pub fn delay(mut self, object: &str, delay: Duration) -> Self {
        self.delays.insert(object.to_string(), delay);
        self
    }

    /// Objects called so far with the context each call saw
    pub fn calls(&self) -> Vec<(String, Context)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendExecutor for MockBackend {
    fn server_type(&self) -> &str {
        "mock"
    }

    async fn execute(
        &self,
        node: &NodeSpec,
        context: &Context,
        _server: &ServerConfig,
    ) -> Result<String, BackendError> {
        let object = node
            .data
            .get("objeto")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.seen.lock().unwrap().push((object.clone(), context.clone()));

        if let Some(delay) = self.delays.get(&object) {
            tokio::time::sleep(*delay).await;
        }
        match self.responses.get(&object) {
            Some(body) => Ok(body.clone()),
            None => Err(BackendError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        }
    }
}

pub fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_server(ServerConfig::new(SERVER_ID, "mock", "http://mock.local"));
    store
}

pub fn runtime(store: Arc<MemoryStore>, backend: Arc<MockBackend>) -> MotorRuntime {
    runtime_with(store, backend, RuntimeConfig::default())
}

pub fn runtime_with(
    store: Arc<MemoryStore>,
    backend: Arc<MockBackend>,
    config: RuntimeConfig,
) -> MotorRuntime {
    MotorRuntime::builder()
        .with_store(store)
        .with_backend(backend)
        .with_config(config)
        .build()
}

pub fn input(value: Value) -> motorcore::Map {
    match value {
        Value::Object(map) => map,
        _ => motorcore::Map::new(),
    }
}

/// Entry node whose fields are copied straight from the input
pub fn entry(fields: &[&str]) -> NodeSpec {
    let campos: Vec<Value> = fields.iter().map(|name| json!({"nombre": name})).collect();
    NodeSpec::new("in", "entrada").with_data("campos", campos)
}

pub fn process(id: &str, object: &str, outputs: &[&str]) -> NodeSpec {
    let salida: Vec<Value> = outputs
        .iter()
        .map(|name| json!({"nombre": name, "tipo": "string"}))
        .collect();
    NodeSpec::new(id, "proceso")
        .with_data("servidorId", SERVER_ID)
        .with_data("objeto", object)
        .with_data("parametrosSalida", salida)
}

pub fn condition(id: &str, expression: &str) -> NodeSpec {
    NodeSpec::new(id, "condicion").with_data("condicion", expression)
}

pub fn subprocess(id: &str, target: &str, pass: &[&str]) -> NodeSpec {
    let assignments: Vec<Value> = pass
        .iter()
        .map(|name| json!({"tipo": "campo", "valor": name, "destino": name}))
        .collect();
    NodeSpec::new(id, "subproceso")
        .with_data("procesoId", target)
        .with_data("asignaciones", json!({ id: assignments }))
}

/// Output node mapping `destino <- campo` pairs
pub fn output(id: &str, fields: &[(&str, &str)]) -> NodeSpec {
    let assignments: Vec<Value> = fields
        .iter()
        .map(|(dest, field)| json!({"tipo": "campo", "valor": field, "destino": dest}))
        .collect();
    NodeSpec::new(id, "salida").with_data("asignaciones", json!({ id: assignments }))
}

pub fn literal_output(id: &str, dest: &str, value: Value) -> NodeSpec {
    NodeSpec::new(id, "salida").with_data(
        "asignaciones",
        json!({ id: [{"tipo": "literal", "valor": value, "destino": dest}] }),
    )
}

pub fn error_output(id: &str) -> NodeSpec {
    NodeSpec::new(id, "salidaError").with_data(
        "parametrosEntrada",
        json!([
            {"nombre": "codigoError", "tipo": "string"},
            {"nombre": "mensajeError", "tipo": "string"},
            {"nombre": "detalleError", "tipo": "string"}
        ]),
    )
}

pub fn flow(id: &str, nodes: Vec<NodeSpec>) -> FlowDefinition {
    let mut definition = FlowDefinition::new(id, format!("Flujo {}", id));
    for node in nodes {
        definition.add_node(node);
    }
    definition
}
