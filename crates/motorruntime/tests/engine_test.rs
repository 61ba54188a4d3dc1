mod common;

use common::*;
use motorcore::{
    FlowError, LogStatus, NodeSpec, Value, STATUS_ERROR, STATUS_INCOMPLETE, STATUS_OK,
};
use motorruntime::{FlowGraph, RuntimeConfig};
use serde_json::json;
use std::sync::Arc;

fn customer_flow() -> motorcore::FlowDefinition {
    let mut def = flow(
        "clientes",
        vec![
            NodeSpec::new("in", "entrada").with_data(
                "campos",
                json!([{"nombre": "id", "asignacion": {"tipo": "campo", "valor": "cliente_id"}}]),
            ),
            process("call", "clientes", &["nombre"]),
            output("out", &[("cliente", "nombre")]),
        ],
    );
    def.connect("in", "call");
    def.connect("call", "out");
    def
}

#[tokio::test]
async fn runs_entry_process_and_output() {
    let store = store();
    store.insert_definition(&customer_flow()).unwrap();
    let backend = Arc::new(MockBackend::new().respond("clientes", json!({"nombre": "Ana"})));
    let rt = runtime(store, backend.clone());

    let result = rt
        .execute_flow("clientes", input(json!({"cliente_id": "42"})), "api", "manual")
        .await
        .unwrap();

    assert_eq!(result.status, STATUS_OK);
    assert_eq!(result.process_id, "clientes");
    assert_eq!(result.trigger, "manual");
    assert_eq!(result.get("cliente"), Some(&json!("Ana")));

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.get("id"), Some(&json!("42")));
}

#[tokio::test]
async fn unknown_flow_is_an_error() {
    let rt = runtime(store(), Arc::new(MockBackend::new()));

    let err = rt
        .execute_flow("nada", input(json!({})), "api", "manual")
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NotFound(ref id) if id == "nada"));
}

#[tokio::test]
async fn flow_without_entry_is_rejected() {
    let store = store();
    store
        .insert_definition(&flow("sin_entrada", vec![output("out", &[])]))
        .unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let err = rt
        .execute_flow("sin_entrada", input(json!({})), "api", "manual")
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NoEntryNode));
}

#[tokio::test]
async fn missing_entry_field_is_rejected() {
    let store = store();
    let mut def = flow("p", vec![entry(&["id"]), output("out", &[])]);
    def.connect("in", "out");
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let err = rt
        .execute_flow("p", input(json!({"otro": 1})), "api", "manual")
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::MissingRequiredField(ref f) if f == "id"));
}

#[tokio::test]
async fn entry_fields_resolve_in_order() {
    let store = store();
    let mut def = flow(
        "p",
        vec![
            NodeSpec::new("in", "entrada").with_data(
                "campos",
                json!([
                    {"nombre": "saludo", "orden": 2,
                     "asignacion": {"tipo": "funcion", "valor": "TextoEnMayusculas(nombre)"}},
                    {"nombre": "nombre", "orden": 1,
                     "asignacion": {"tipo": "campo", "valor": "cliente"}}
                ]),
            ),
            output("out", &[("saludo", "saludo")]),
        ],
    );
    def.connect("in", "out");
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt
        .execute_flow("p", input(json!({"cliente": "ana"})), "api", "manual")
        .await
        .unwrap();
    assert_eq!(result.get("saludo"), Some(&json!("ANA")));
}

#[tokio::test]
async fn flow_without_reachable_output_is_incomplete() {
    let store = store();
    let mut def = flow(
        "p",
        vec![entry(&[]), process("call", "clientes", &[]), output("out", &[])],
    );
    def.connect("in", "call");
    store.insert_definition(&def).unwrap();
    let backend = Arc::new(MockBackend::new().respond("clientes", json!({})));
    let rt = runtime(store, backend);

    let result = rt.execute_flow("p", input(json!({})), "api", "manual").await.unwrap();
    assert_eq!(result.status, STATUS_INCOMPLETE);
    assert_eq!(result.message, "incomplete flow: no output node was reached");
    assert!(result.data.is_none());
}

#[tokio::test]
async fn empty_output_still_completes() {
    let store = store();
    let mut def = flow("p", vec![entry(&[]), output("out", &[])]);
    def.connect("in", "out");
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt.execute_flow("p", input(json!({})), "api", "manual").await.unwrap();
    assert!(result.is_ok());
    assert_eq!(result.data, Some(motorcore::Map::new()));
}

fn approval_flow() -> motorcore::FlowDefinition {
    let mut def = flow(
        "aprobacion",
        vec![
            entry(&["monto"]),
            condition("check", "monto > 100 Y monto < 1000"),
            literal_output("si", "decision", json!("aprobado")),
            literal_output("no", "decision", json!("rechazado")),
        ],
    );
    def.connect("in", "check");
    def.connect_branch("check", "si", true);
    def.connect_branch("check", "no", false);
    def
}

#[tokio::test]
async fn condition_routes_by_branch_handle() {
    let store = store();
    store.insert_definition(&approval_flow()).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let approved = rt
        .execute_flow("aprobacion", input(json!({"monto": 150})), "api", "manual")
        .await
        .unwrap();
    assert_eq!(approved.get("decision"), Some(&json!("aprobado")));

    let rejected = rt
        .execute_flow("aprobacion", input(json!({"monto": 50})), "api", "manual")
        .await
        .unwrap();
    assert_eq!(rejected.get("decision"), Some(&json!("rechazado")));
}

#[tokio::test]
async fn false_condition_records_its_error_fields() {
    let store = store();
    let mut def = flow(
        "p",
        vec![entry(&["monto"]), condition("check", "monto > 100"), error_output("err")],
    );
    def.connect("in", "check");
    def.connect_branch("check", "err", false);
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt
        .execute_flow("p", input(json!({"monto": 5})), "api", "manual")
        .await
        .unwrap();
    assert_eq!(result.status, STATUS_OK);
    assert_eq!(result.get("codigoError"), Some(&json!("66")));
    assert_eq!(result.get("detalleError"), Some(&json!("cumple=false")));
}

#[tokio::test]
async fn error_output_skips_fields_missing_from_context() {
    let store = store();
    let mut def = flow(
        "p",
        vec![
            entry(&["motivo"]),
            NodeSpec::new("err", "salidaError").with_data(
                "parametrosEntrada",
                json!([{"nombre": "motivo"}, {"nombre": "codigoError"}, {"nombre": "noExiste"}]),
            ),
        ],
    );
    def.connect("in", "err");
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt
        .execute_flow("p", input(json!({"motivo": "saldo"})), "api", "manual")
        .await
        .unwrap();
    assert_eq!(result.status, STATUS_OK);
    assert_eq!(result.data, Some(input(json!({"motivo": "saldo"}))));
}

#[tokio::test]
async fn broken_condition_takes_the_false_branch() {
    let store = store();
    let mut def = flow(
        "p",
        vec![entry(&[]), condition("check", "no_existe > 1"), error_output("err")],
    );
    def.connect("in", "check");
    def.connect_branch("check", "err", false);
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt.execute_flow("p", input(json!({})), "api", "manual").await.unwrap();
    assert_eq!(result.get("codigoError"), Some(&json!("99")));
    assert_eq!(result.get("mensajeError"), Some(&json!("Error al evaluar condición")));
}

#[tokio::test]
async fn failed_process_follows_error_edge() {
    let store = store();
    let mut def = flow(
        "p",
        vec![
            entry(&[]),
            process("call", "no_registrado", &["nombre"]),
            output("out", &[("nombre", "nombre")]),
            error_output("err"),
        ],
    );
    def.connect("in", "call");
    def.connect("call", "out");
    def.connect_on_error("call", "err");
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt.execute_flow("p", input(json!({})), "api", "manual").await.unwrap();
    assert_eq!(result.status, STATUS_OK);
    assert_eq!(result.get("codigoError"), Some(&json!("99")));
    assert_eq!(result.get("mensajeError"), Some(&json!("Error en ejecución")));
    assert!(result.get("nombre").is_none());
}

#[tokio::test]
async fn unrouted_failure_ends_with_error_status() {
    let store = store();
    let mut def = flow(
        "p",
        vec![entry(&[]), process("call", "no_registrado", &[]), output("out", &[])],
    );
    def.connect("in", "call");
    def.connect("call", "out");
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt.execute_flow("p", input(json!({})), "api", "manual").await.unwrap();
    assert_eq!(result.status, STATUS_ERROR);
    assert_eq!(result.error_code().as_deref(), Some("99"));
    assert!(result.message.contains("Error en ejecución"));
}

#[tokio::test]
async fn unknown_server_type_is_a_node_failure() {
    let store = store();
    store.insert_server(motorcore::ServerConfig::new("ftp", "ftp", "ftp://host"));
    let mut def = flow(
        "p",
        vec![
            entry(&[]),
            process("call", "x", &[]).with_data("servidorId", "ftp"),
            error_output("err"),
        ],
    );
    def.connect("in", "call");
    def.connect_on_error("call", "err");
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt.execute_flow("p", input(json!({})), "api", "manual").await.unwrap();
    let detail = result.get("detalleError").and_then(Value::as_str).unwrap();
    assert!(detail.contains("Unsupported server type"), "{}", detail);
}

#[tokio::test]
async fn unknown_node_types_pass_through() {
    let store = store();
    let mut def = flow(
        "p",
        vec![
            entry(&[]),
            NodeSpec::new("note", "comentario"),
            literal_output("out", "ok", json!(true)),
        ],
    );
    def.connect("in", "note");
    def.connect("note", "out");
    store.insert_definition(&def).unwrap();
    let rt = runtime(store, Arc::new(MockBackend::new()));

    let result = rt.execute_flow("p", input(json!({})), "api", "manual").await.unwrap();
    assert_eq!(result.get("ok"), Some(&json!(true)));
}

#[tokio::test]
async fn first_output_wins_unless_draining() {
    let mut def = flow(
        "p",
        vec![
            entry(&[]),
            literal_output("uno", "v", json!(1)),
            literal_output("dos", "v", json!(2)),
        ],
    );
    def.connect("in", "uno");
    def.connect("in", "dos");

    let store_a = store();
    store_a.insert_definition(&def).unwrap();
    let first = runtime(store_a, Arc::new(MockBackend::new()))
        .execute_flow("p", input(json!({})), "api", "manual")
        .await
        .unwrap();
    assert_eq!(first.get("v"), Some(&json!(1)));

    let store_b = store();
    store_b.insert_definition(&def).unwrap();
    let config = RuntimeConfig {
        drain_after_output: true,
        ..RuntimeConfig::default()
    };
    let last = runtime_with(store_b, Arc::new(MockBackend::new()), config)
        .execute_flow("p", input(json!({})), "api", "manual")
        .await
        .unwrap();
    assert_eq!(last.get("v"), Some(&json!(2)));
}

#[tokio::test]
async fn discovered_schema_is_used_and_persisted() {
    let store = store();
    let mut def = flow(
        "p",
        vec![
            entry(&[]),
            process("call", "clientes", &[]).with_data("parsearFullOutput", true),
            output("out", &[("edad", "edad")]),
        ],
    );
    def.connect("in", "call");
    def.connect("call", "out");
    store.insert_definition(&def).unwrap();
    let backend = Arc::new(MockBackend::new().respond("clientes", json!({"nombre": "Ana", "edad": 30})));
    let rt = runtime(store.clone(), backend);

    let result = rt.execute_flow("p", input(json!({})), "api", "manual").await.unwrap();
    assert_eq!(result.get("edad"), Some(&json!(30)));

    let stored = store.definition("p").unwrap();
    let node = stored.find_node("call").unwrap();
    assert_eq!(node.data.get("parsearFullOutput"), Some(&json!(false)));
    let fields = node.data.get("parametrosSalida").and_then(Value::as_array).unwrap();
    let mut names: Vec<&str> = fields.iter().filter_map(|f| f["nombre"].as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["edad", "nombre"]);
    let edad = fields.iter().find(|f| f["nombre"] == json!("edad")).unwrap();
    assert_eq!(edad["tipo"], json!("int"));
}

#[tokio::test]
async fn audit_records_every_node_and_the_run() {
    let store = store();
    store.insert_definition(&customer_flow()).unwrap();
    let backend = Arc::new(MockBackend::new().respond("clientes", json!({"nombre": "Ana"})));
    let rt = runtime(store, backend);
    let mut audit = rt.subscribe_audit();

    rt.execute_flow("clientes", input(json!({"cliente_id": "7"})), "web", "manual")
        .await
        .unwrap();

    let mut entries = Vec::new();
    while let Ok(entry) = audit.try_recv() {
        entries.push(entry);
    }
    let types: Vec<&str> = entries.iter().map(|e| e.object_type.as_str()).collect();
    assert_eq!(types, vec!["entrada", "proceso", "salida", "flujo"]);
    assert!(entries.iter().all(|e| e.trace_id == entries[0].trace_id));
    assert_eq!(entries[1].full_output, json!("{\"nombre\":\"Ana\"}"));
    assert_eq!(entries[3].status, LogStatus::Ok);
    assert_eq!(entries[3].channel, "web");
}

#[test]
fn graph_build_reports_structural_issues() {
    let mut def = flow(
        "p",
        vec![
            entry(&[]),
            NodeSpec::new("in2", "entrada"),
            NodeSpec::new("x", "comentario"),
            output("out", &[]),
        ],
    );
    def.connect("in", "out");
    def.connect("in", "fantasma");

    let graph = FlowGraph::build(def);
    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.edge_count(), 1);
    assert!(graph.entry().is_some());

    let issues = graph.issues().join("\n");
    assert!(issues.contains("extra entry node 'in2'"));
    assert!(issues.contains("unknown type 'comentario'"));
    assert!(issues.contains("fantasma"));
}
