use motorcore::{
    coerce, AssignmentKind, Context, EdgeKind, FlowDefinition, FlowError, FlowStore,
    MemoryStore, NodeConfig, NodeKind, TableData, TableRecord, Value, ValueExt,
};
use serde_json::json;

const EDITOR_FLOW: &str = r#"{
    "nodes": [
        {"id": "in", "type": "entrada", "data": {
            "campos": [
                {"nombre": "id", "tipo": "string", "orden": 2,
                 "asignacion": {"tipo": "campo", "valor": "cliente_id"}},
                {"nombre": "canal", "orden": "1"}
            ]
        }},
        {"id": "check", "type": "condicion", "data": {"condicion": "monto > 10"}},
        {"id": "call", "type": "proceso", "data": {
            "servidorId": 7,
            "objeto": "clientes",
            "parametrosSalida": null,
            "asignaciones": {"in": [{"destino": "x", "tipo": "sistema", "valor": "UUID"}]}
        }},
        {"id": "note", "type": "comentario", "data": {}},
        {"id": "out", "type": "salida", "data": {}}
    ],
    "edges": [
        {"id": "a", "source": "in", "target": "check", "type": null},
        {"id": "b", "source": "check", "target": "call", "sourceHandle": "true"},
        {"id": "c", "source": "call", "target": "out", "type": "error"},
        {"id": "d", "source": "call", "target": "out", "type": "smoothstep"}
    ]
}"#;

#[test]
fn parses_editor_documents() {
    let flow = FlowDefinition::parse(EDITOR_FLOW).expect("flow parses");

    assert_eq!(flow.nodes.len(), 5);
    assert_eq!(flow.nodes[0].kind(), NodeKind::Entry);
    assert_eq!(flow.nodes[3].kind(), NodeKind::Unknown("comentario".to_string()));
    assert!(flow.nodes[4].kind().is_output());

    assert_eq!(flow.edges[0].kind, EdgeKind::Normal);
    assert_eq!(flow.edges[1].source_handle.as_deref(), Some("true"));
    assert_eq!(flow.edges[2].kind, EdgeKind::Error);
    assert_eq!(flow.edges[3].kind, EdgeKind::Normal, "unknown edge types are normal edges");
}

#[test]
fn malformed_text_is_rejected() {
    let err = FlowDefinition::parse("{\"nodes\": [").unwrap_err();
    assert!(matches!(err, FlowError::Malformed(_)));
}

#[test]
fn decodes_typed_node_configs() {
    let flow = FlowDefinition::parse(EDITOR_FLOW).expect("flow parses");

    match NodeConfig::decode(&flow.nodes[0]).expect("entry decodes") {
        NodeConfig::Entry(entry) => {
            assert_eq!(entry.fields.len(), 2);
            assert_eq!(entry.fields[0].order, Some(2));
            assert_eq!(entry.fields[1].order, Some(1), "numeric strings are accepted");
            let assignment = entry.fields[0].assignment.as_ref().expect("assignment");
            assert_eq!(assignment.kind, AssignmentKind::Field);
            assert_eq!(assignment.value_text(), "cliente_id");
        }
        other => panic!("unexpected config {:?}", other),
    }

    match NodeConfig::decode(&flow.nodes[2]).expect("process decodes") {
        NodeConfig::Process(process) => {
            assert_eq!(process.server_id, "7");
            assert!(process.output_params.is_empty());
            let grouped = &process.assignments["in"];
            assert_eq!(grouped[0].kind, AssignmentKind::Function, "sistema aliases funcion");
            assert_eq!(grouped[0].destination, "x");
        }
        other => panic!("unexpected config {:?}", other),
    }

    assert_eq!(
        NodeConfig::decode(&flow.nodes[3]).expect("unknown decodes"),
        NodeConfig::Unknown
    );
}

#[test]
fn unknown_assignment_types_survive_decoding() {
    let assignment: motorcore::Assignment =
        serde_json::from_value(json!({"tipo": "formula", "valor": "1+1"})).unwrap();
    assert_eq!(
        assignment.kind,
        AssignmentKind::Unsupported("formula".to_string())
    );
}

#[test]
fn plain_strings_and_kinds() {
    assert_eq!(json!("abc").to_plain_string(), "abc");
    assert_eq!(json!(42).to_plain_string(), "42");
    assert_eq!(json!(true).to_plain_string(), "true");
    assert_eq!(Value::Null.to_plain_string(), "");

    assert_eq!(json!(1).kind_name(), "int");
    assert_eq!(json!(1.5).kind_name(), "float");
    assert_eq!(json!([1]).kind_name(), "array");
    assert_eq!(json!({"a": 1}).kind_name(), "object");
}

#[test]
fn lenient_numbers_accept_numeric_strings() {
    assert_eq!(json!(" 2.5 ").as_lenient_f64(), Some(2.5));
    assert_eq!(json!(3).as_lenient_f64(), Some(3.0));
    assert_eq!(json!("tres").as_lenient_f64(), None);
    assert_eq!(coerce(&json!(4), "float"), json!(4.0));
}

#[test]
fn coercion_follows_declared_types() {
    assert_eq!(coerce(&json!("15"), "int"), json!(15));
    assert_eq!(coerce(&json!("2.5"), "float"), json!(2.5));
    assert_eq!(coerce(&json!("true"), "boolean"), json!(true));
    assert_eq!(coerce(&json!("abc"), "int"), json!("abc"), "unconvertible values stay as they are");
}

#[test]
fn context_error_fields() {
    let mut ctx = Context::new();
    ctx.set_error("99", "Error en ejecución", "boom");

    let fields = ctx.error_fields();
    assert_eq!(fields["codigoError"], json!("99"));
    assert_eq!(fields["detalleError"], json!("boom"));
    assert_eq!(ctx.get_string("missing"), "");
}

#[test]
fn table_bodies_decode_to_their_shape() {
    let keyed = TableRecord::new("Estados", json!([]), json!({"01": {"nombre": "Activo"}}));
    assert!(matches!(keyed.rows().unwrap(), Some(TableData::Keyed(_))));

    let rows = TableRecord::new(
        "Monedas",
        json!([{"nombre": "codigo"}, {"nombre": "simbolo"}]),
        json!("[{\"codigo\": \"USD\", \"simbolo\": \"$\"}]"),
    );
    assert_eq!(rows.key_field(), "codigo");
    assert!(matches!(rows.rows().unwrap(), Some(TableData::Rows(r)) if r.len() == 1));

    let empty = TableRecord::new("Vacia", Value::Null, json!([]));
    assert_eq!(empty.key_field(), "id");
    assert!(empty.rows().unwrap().is_none());
}

#[tokio::test]
async fn memory_store_replaces_nodes() {
    let store = MemoryStore::new();
    let mut flow = FlowDefinition::parse(EDITOR_FLOW).unwrap();
    flow.id = "p1".to_string();
    store.insert_definition(&flow).unwrap();

    let mut node = flow.find_node("call").cloned().unwrap();
    node.data.insert("parsearFullOutput".to_string(), json!(false));
    store.update_node("p1", &node).await.expect("node updated");

    let stored = store.definition("p1").unwrap();
    assert_eq!(stored.find_node("call").unwrap().data["parsearFullOutput"], json!(false));

    let missing = store.update_node("nope", &node).await;
    assert!(missing.is_err());
}
