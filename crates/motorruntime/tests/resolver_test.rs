use motorcore::{Assignment, Context, MemoryStore, ResolveError, TableRecord, Value};
use motorruntime::expression::normalize;
use motorruntime::{
    resolve_table, CallScope, ExpressionEvaluator, FunctionRegistry, OnFailure, RhaiEvaluator,
    ValueResolver,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn tables() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_table(TableRecord::new(
        "Estados",
        json!([{"nombre": "codigo"}, {"nombre": "descripcion"}]),
        json!({"1": {"descripcion": "Activo"}, "2": {"descripcion": "Inactivo"}}),
    ));
    store.insert_table(TableRecord::new(
        "Monedas",
        json!([{"nombre": "codigo"}, {"nombre": "simbolo"}]),
        json!([
            {"codigo": "USD", "simbolo": "$"},
            {"codigo": 978},
            {"codigo": 978, "simbolo": "€"}
        ]),
    ));
    store.insert_table(TableRecord::new("Vacia", json!([]), json!("[]")));
    store
}

fn context(values: Value) -> Context {
    match values {
        Value::Object(map) => Context::from_map(map),
        _ => Context::new(),
    }
}

#[test]
fn literal_and_field_assignments() {
    let functions = FunctionRegistry::standard();
    let store = tables();
    let resolver = ValueResolver::new(&functions, &store);
    let ctx = context(json!({"nombre": "Ana", "edad": 31}));

    assert_eq!(resolver.resolve(&Assignment::literal(42), &ctx).unwrap(), json!(42));
    assert_eq!(resolver.resolve(&Assignment::field("nombre"), &ctx).unwrap(), json!("Ana"));

    let err = resolver.resolve(&Assignment::field("apellido"), &ctx).unwrap_err();
    assert_eq!(err, ResolveError::FieldNotFound("apellido".to_string()));
}

#[test]
fn function_assignments_parse_their_arguments() {
    let functions = FunctionRegistry::standard();
    let store = tables();
    let resolver = ValueResolver::new(&functions, &store);
    let ctx = context(json!({"nombre": "Ana Maria"}));

    let len = resolver.resolve(&Assignment::function("Longitud(nombre)"), &ctx).unwrap();
    assert_eq!(len, json!(9));

    let sub = resolver
        .resolve(&Assignment::function("SubTexto('Hola mundo', 0, 4)"), &ctx)
        .unwrap();
    assert_eq!(sub, json!("Hola"));

    let out_of_range = resolver
        .resolve(&Assignment::function("SubTexto(nombre, 5, 10)"), &ctx)
        .unwrap();
    assert_eq!(out_of_range, json!(""));

    let upper = resolver
        .resolve(&Assignment::function("TextoEnMayusculas(nombre)"), &ctx)
        .unwrap();
    assert_eq!(upper, json!("ANA MARIA"));

    let uuid = resolver.resolve(&Assignment::function("UUID"), &ctx).unwrap();
    assert_eq!(uuid.as_str().map(str::len), Some(36));

    let day = resolver.resolve(&Assignment::function("DiaSemana()"), &ctx).unwrap();
    let day = day.as_u64().unwrap();
    assert!((1..=7).contains(&day));
}

#[test]
fn unknown_functions_and_bad_arity_fail() {
    let functions = FunctionRegistry::standard();
    let store = tables();
    let resolver = ValueResolver::new(&functions, &store);
    let ctx = Context::new();

    let err = resolver.resolve(&Assignment::function("NoExiste()"), &ctx).unwrap_err();
    assert_eq!(err, ResolveError::UnknownSystemFunction("NoExiste".to_string()));

    let err = resolver
        .resolve(&Assignment::function("Longitud('a', 'b')"), &ctx)
        .unwrap_err();
    assert!(matches!(err, ResolveError::InvalidArguments { ref function, .. } if function == "Longitud"));
}

#[test]
fn identity_functions_read_reserved_keys() {
    let functions = FunctionRegistry::standard();
    let store = tables();
    let scope_ctx = context(json!({"__usuario": "jperez", "__idFlujo": "p1"}));
    let scope = CallScope {
        context: &scope_ctx,
        tables: &store,
    };

    assert_eq!(functions.invoke("UsuarioActual", &scope).unwrap(), json!("jperez"));
    assert_eq!(functions.invoke("IDFlujo()", &scope).unwrap(), json!("p1"));
    assert_eq!(functions.invoke("RolActual", &scope).unwrap(), json!(""));
}

#[test]
fn keyed_table_lookup() {
    let store = tables();

    assert_eq!(resolve_table(&store, "Estados", "1", "descripcion").unwrap(), json!("Activo"));

    let err = resolve_table(&store, "Estados", "9", "descripcion").unwrap_err();
    assert_eq!(
        err,
        ResolveError::KeyNotFound {
            table: "Estados".to_string(),
            key: "9".to_string(),
            field: "descripcion".to_string(),
        }
    );
}

#[test]
fn row_table_scan_compares_rendered_keys() {
    let store = tables();

    assert_eq!(resolve_table(&store, "Monedas", "USD", "simbolo").unwrap(), json!("$"));
    // the first 978 row has no simbolo and is skipped
    assert_eq!(resolve_table(&store, "Monedas", "978", "simbolo").unwrap(), json!("€"));
}

#[test]
fn table_failures() {
    let store = tables();

    assert_eq!(
        resolve_table(&store, "Paises", "AR", "nombre").unwrap_err(),
        ResolveError::TableNotFound("Paises".to_string())
    );
    assert_eq!(
        resolve_table(&store, "Vacia", "x", "y").unwrap_err(),
        ResolveError::TableEmpty("Vacia".to_string())
    );
    assert!(matches!(
        resolve_table(&store, "Estados", "", "descripcion").unwrap_err(),
        ResolveError::InvalidAssignment(_)
    ));
}

#[test]
fn table_assignment_with_variable_key() {
    let functions = FunctionRegistry::standard();
    let store = tables();
    let resolver = ValueResolver::new(&functions, &store);
    let ctx = context(json!({"estado": 2}));

    let fixed = Assignment::table("Estados", "1", "descripcion");
    assert_eq!(resolver.resolve(&fixed, &ctx).unwrap(), json!("Activo"));

    let variable = Assignment::table("Estados", "estado", "descripcion").variable_key();
    assert_eq!(resolver.resolve(&variable, &ctx).unwrap(), json!("Inactivo"));

    let missing_field = Assignment::table("Estados", "1", "");
    assert!(matches!(
        resolver.resolve(&missing_field, &ctx).unwrap_err(),
        ResolveError::InvalidAssignment(_)
    ));
}

#[test]
fn table_value_function_reads_dotted_keys_from_context() {
    let functions = FunctionRegistry::standard();
    let store = tables();
    let ctx = context(json!({"codigo": "2"}));
    let scope = CallScope {
        context: &ctx,
        tables: &store,
    };

    let value = functions
        .invoke("TablaValor('Estados', 'entrada.codigo', 'descripcion')", &scope)
        .unwrap();
    assert_eq!(value, json!("Inactivo"));
}

#[test]
fn group_resolution_policies() {
    let functions = FunctionRegistry::standard();
    let store = tables();
    let resolver = ValueResolver::new(&functions, &store);
    let ctx = context(json!({"nombre": "Ana"}));

    let mut groups = BTreeMap::new();
    groups.insert(
        "in".to_string(),
        vec![
            Assignment::field("nombre").to("cliente"),
            Assignment::field("apellido").to("familia"),
            Assignment::function("NoExiste").to("roto"),
            Assignment::literal("sin destino"),
        ],
    );

    let err = resolver
        .resolve_groups(&groups, &ctx, OnFailure::Propagate)
        .unwrap_err();
    assert_eq!(err, ResolveError::UnknownSystemFunction("NoExiste".to_string()));

    let nulls = resolver.resolve_groups(&groups, &ctx, OnFailure::StoreNull).unwrap();
    assert_eq!(nulls.get("cliente"), Some(&json!("Ana")));
    assert_eq!(nulls.get("roto"), Some(&Value::Null));
    assert!(!nulls.contains_key("familia"), "missing fields are skipped");
    assert_eq!(nulls.len(), 2);

    let skipped = resolver.resolve_groups(&groups, &ctx, OnFailure::Skip).unwrap();
    assert_eq!(skipped.len(), 1);
}

fn evaluator() -> RhaiEvaluator {
    let store: Arc<dyn motorcore::TableStore> = Arc::new(tables());
    RhaiEvaluator::new(Arc::new(FunctionRegistry::standard()), store)
}

#[test]
fn normalizes_localized_operators() {
    assert_eq!(normalize("a > 1 Y b < 2"), "a > 1 && b < 2");
    assert_eq!(normalize("a o b"), "a || b");
    assert_eq!(normalize("x == 'Y o no'"), "x == \"Y o no\"");
    assert_eq!(normalize("ordenado AND yes"), "ordenado && yes");
}

#[test]
fn evaluates_boolean_expressions() {
    let eval = evaluator();
    let ctx = context(json!({"monto": 150, "tipo": "VIP", "nombre": "Ana"}));

    assert!(eval.evaluate("monto > 100 Y tipo == 'VIP'", &ctx).unwrap());
    assert!(!eval.evaluate("monto > 200 O tipo == 'REG'", &ctx).unwrap());
    assert!(eval.evaluate("empiezaCon(nombre, 'An')", &ctx).unwrap());
    assert!(eval.evaluate("Longitud(nombre) == 3", &ctx).unwrap());
    assert!(eval
        .evaluate("TablaValor('Estados', '1', 'descripcion') == 'Activo'", &ctx)
        .unwrap());
}

#[test]
fn non_boolean_and_broken_expressions_fail() {
    let eval = evaluator();
    let ctx = context(json!({"monto": 150}));

    assert!(matches!(
        eval.evaluate("monto + 1", &ctx).unwrap_err(),
        ResolveError::ExpressionTypeError(_)
    ));
    assert!(matches!(
        eval.evaluate("monto >", &ctx).unwrap_err(),
        ResolveError::Expression(_)
    ));
    assert!(matches!(
        eval.evaluate("desconocido > 1", &ctx).unwrap_err(),
        ResolveError::Expression(_)
    ));
}
