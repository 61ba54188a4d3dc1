use crate::tables::resolve_table;
use chrono::{Datelike, Local};
use motorcore::{keys, Context, ResolveError, TableStore, Value, ValueExt};
use std::collections::BTreeMap;

/// What a system function can see while it runs
pub struct CallScope<'a> {
    pub context: &'a Context,
    pub tables: &'a dyn TableStore,
}

type Handler = fn(&CallScope<'_>, &[Value]) -> Result<Value, ResolveError>;

/// A named, fixed-arity function available to assignments and conditions
#[derive(Clone)]
pub struct SystemFunction {
    pub name: &'static str,
    pub arity: usize,
    pub description: &'static str,
    handler: Handler,
}

impl SystemFunction {
    pub fn new(name: &'static str, arity: usize, description: &'static str, handler: Handler) -> Self {
        Self {
            name,
            arity,
            description,
            handler,
        }
    }

    pub fn call(&self, scope: &CallScope<'_>, args: &[Value]) -> Result<Value, ResolveError> {
        if args.len() != self.arity {
            return Err(invalid(
                self.name,
                format!("expected {} argument(s), got {}", self.arity, args.len()),
            ));
        }
        (self.handler)(scope, args)
    }
}

impl std::fmt::Debug for SystemFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Catalog of system functions, built once and shared read-only
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<&'static str, SystemFunction>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// Registry with the built-in catalog
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for function in standard_catalog() {
            registry.register(function);
        }
        registry
    }

    pub fn register(&mut self, function: SystemFunction) {
        tracing::debug!("Registering system function: {}", function.name);
        self.functions.insert(function.name, function);
    }

    pub fn get(&self, name: &str) -> Option<&SystemFunction> {
        self.functions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SystemFunction> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Call a function by name with already evaluated arguments
    pub fn call(
        &self,
        name: &str,
        args: &[Value],
        scope: &CallScope<'_>,
    ) -> Result<Value, ResolveError> {
        let function = self
            .get(name)
            .ok_or_else(|| ResolveError::UnknownSystemFunction(name.to_string()))?;
        function.call(scope, args)
    }

    /// Evaluate a textual call such as `Ahora`, `Hoy()` or `SubTexto(nombre, 0, 3)`.
    ///
    /// Arguments may be quoted strings, numbers, booleans or context field names.
    pub fn invoke(&self, call: &str, scope: &CallScope<'_>) -> Result<Value, ResolveError> {
        let call = call.trim();
        let (name, arg_text) = match (call.find('('), call.ends_with(')')) {
            (Some(open), true) => (call[..open].trim(), &call[open + 1..call.len() - 1]),
            _ => (call, ""),
        };

        if self.get(name).is_none() {
            return Err(ResolveError::UnknownSystemFunction(name.to_string()));
        }

        let args = split_arguments(arg_text)
            .into_iter()
            .map(|raw| parse_argument(&raw, scope.context))
            .collect::<Result<Vec<_>, _>>()?;

        self.call(name, &args, scope)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn split_arguments(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, ',') => args.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }
    if !current.trim().is_empty() || !args.is_empty() {
        args.push(current);
    }
    args.into_iter().map(|a| a.trim().to_string()).collect()
}

fn parse_argument(raw: &str, context: &Context) -> Result<Value, ResolveError> {
    let quoted = |q: char| raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q);
    if quoted('\'') || quoted('"') {
        return Ok(Value::String(raw[1..raw.len() - 1].to_string()));
    }
    match raw {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Value::from(int));
    }
    if let Ok(float) = raw.parse::<f64>() {
        return Ok(Value::from(float));
    }
    context
        .get(raw)
        .cloned()
        .ok_or_else(|| ResolveError::FieldNotFound(raw.to_string()))
}

fn invalid(function: &str, message: impl Into<String>) -> ResolveError {
    ResolveError::InvalidArguments {
        function: function.to_string(),
        message: message.into(),
    }
}

fn standard_catalog() -> Vec<SystemFunction> {
    vec![
        SystemFunction::new("Ahora", 0, "Current local date and time (DD/MM/YYYY HH:MM:SS)", |_, _| {
            Ok(Value::String(Local::now().format("%d/%m/%Y %H:%M:%S").to_string()))
        }),
        SystemFunction::new("Hoy", 0, "Current local date (DD/MM/YYYY)", |_, _| {
            Ok(Value::String(Local::now().format("%d/%m/%Y").to_string()))
        }),
        SystemFunction::new("DiaSemana", 0, "Day of the week, Monday=1 .. Sunday=7", |_, _| {
            Ok(Value::from(Local::now().weekday().number_from_monday()))
        }),
        SystemFunction::new("MesActual", 0, "Current month number", |_, _| {
            Ok(Value::from(Local::now().month()))
        }),
        SystemFunction::new("AnoActual", 0, "Current year", |_, _| {
            Ok(Value::from(Local::now().year()))
        }),
        SystemFunction::new("UsuarioActual", 0, "User running the flow", |scope, _| {
            Ok(context_string(scope, keys::USER))
        }),
        SystemFunction::new("RolActual", 0, "Role of the user running the flow", |scope, _| {
            Ok(context_string(scope, keys::ROLE))
        }),
        SystemFunction::new("NombreProceso", 0, "Name of the running process", |scope, _| {
            Ok(context_string(scope, keys::PROCESS_NAME))
        }),
        SystemFunction::new("IDFlujo", 0, "Id of the running flow", |scope, _| {
            Ok(context_string(scope, keys::FLOW_ID))
        }),
        SystemFunction::new("UUID", 0, "Random UUID v4", |_, _| {
            Ok(Value::String(uuid::Uuid::new_v4().to_string()))
        }),
        SystemFunction::new("Random", 0, "Random number in [0, 1)", |_, _| {
            Ok(Value::from(rand::random::<f64>()))
        }),
        SystemFunction::new("SubTexto", 3, "Substring by character position and length", |_, args| {
            let text: Vec<char> = args[0].to_plain_string().chars().collect();
            let start = args[1]
                .as_lenient_f64()
                .ok_or_else(|| invalid("SubTexto", "start must be a number"))?;
            let length = args[2]
                .as_lenient_f64()
                .ok_or_else(|| invalid("SubTexto", "length must be a number"))?;
            if start < 0.0 || length < 0.0 || start + length > text.len() as f64 {
                return Ok(Value::String(String::new()));
            }
            let (start, length) = (start as usize, length as usize);
            Ok(Value::String(text[start..start + length].iter().collect()))
        }),
        SystemFunction::new("Longitud", 1, "Number of characters of a text", |_, args| {
            Ok(Value::from(args[0].to_plain_string().chars().count()))
        }),
        SystemFunction::new("TextoEnMayusculas", 1, "Text in upper case", |_, args| {
            Ok(Value::String(args[0].to_plain_string().to_uppercase()))
        }),
        SystemFunction::new("incluye", 2, "Whether the first text contains the second", |_, args| {
            Ok(Value::Bool(text_pair(args).map(|(a, b)| a.contains(b)).unwrap_or(false)))
        }),
        SystemFunction::new("empiezaCon", 2, "Whether the first text starts with the second", |_, args| {
            Ok(Value::Bool(text_pair(args).map(|(a, b)| a.starts_with(b)).unwrap_or(false)))
        }),
        SystemFunction::new("terminaCon", 2, "Whether the first text ends with the second", |_, args| {
            Ok(Value::Bool(text_pair(args).map(|(a, b)| a.ends_with(b)).unwrap_or(false)))
        }),
        SystemFunction::new("TablaValor", 3, "Lookup-table cell: TablaValor(tabla, clave, campo)", |scope, args| {
            let text = |i: usize, what: &str| {
                args[i]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("TablaValor", format!("{} must be a string", what)))
            };
            let table = text(0, "table")?;
            let key = key_from_context(scope.context, &text(1, "key")?);
            let field = text(2, "field")?;
            resolve_table(scope.tables, &table, &key, &field)
        }),
    ]
}

fn context_string(scope: &CallScope<'_>, key: &str) -> Value {
    Value::String(scope.context.get_string(key))
}

fn text_pair(args: &[Value]) -> Option<(&str, &str)> {
    Some((args[0].as_str()?, args[1].as_str()?))
}

/// Dotted keys (`entrada.codigo`) name context variables: the full key is
/// tried first, then its last segment. Anything else is a literal key.
fn key_from_context(context: &Context, key: &str) -> String {
    if !key.contains('.') {
        return key.to_string();
    }
    let last = key.rsplit('.').next().unwrap_or(key);
    context
        .get(key)
        .or_else(|| context.get(last))
        .map(ValueExt::to_plain_string)
        .unwrap_or_else(|| key.to_string())
}
