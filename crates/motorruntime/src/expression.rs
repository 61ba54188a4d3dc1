use crate::functions::{CallScope, FunctionRegistry};
use motorcore::{Context, ResolveError, TableStore, Value};
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope};
use std::sync::Arc;

/// Evaluates boolean condition expressions against a set of bindings
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, bindings: &Context) -> Result<bool, ResolveError>;
}

/// Expression evaluator backed by an embedded Rhai engine.
///
/// Every system function of the registry is callable by name from the
/// expression, and every context key that is a valid identifier is bound
/// as a variable.
pub struct RhaiEvaluator {
    functions: Arc<FunctionRegistry>,
    tables: Arc<dyn TableStore>,
}

impl RhaiEvaluator {
    pub fn new(functions: Arc<FunctionRegistry>, tables: Arc<dyn TableStore>) -> Self {
        Self { functions, tables }
    }

    fn build_engine(&self, bindings: &Context) -> Engine {
        let mut engine = Engine::new();
        let bridge = Bridge {
            functions: self.functions.clone(),
            tables: self.tables.clone(),
            context: Arc::new(bindings.clone()),
        };

        for function in self.functions.iter() {
            let name = function.name;
            let b = bridge.clone();
            match function.arity {
                0 => {
                    engine.register_fn(name, move || b.call(name, Vec::new()));
                }
                1 => {
                    engine.register_fn(name, move |a: Dynamic| b.call(name, vec![a]));
                }
                2 => {
                    engine.register_fn(name, move |a: Dynamic, c: Dynamic| b.call(name, vec![a, c]));
                }
                3 => {
                    engine.register_fn(name, move |a: Dynamic, c: Dynamic, d: Dynamic| {
                        b.call(name, vec![a, c, d])
                    });
                }
                arity => {
                    tracing::warn!("System function {} has unsupported arity {}", name, arity);
                }
            }
        }
        engine
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Context) -> Result<bool, ResolveError> {
        let script = normalize(expression);
        let engine = self.build_engine(bindings);

        let mut scope = Scope::new();
        for (name, value) in bindings.iter() {
            if !is_identifier(name) {
                continue;
            }
            let dynamic = to_dynamic(value).map_err(|e| ResolveError::Expression(e.to_string()))?;
            scope.push_dynamic(name.clone(), dynamic);
        }

        let result: Dynamic = engine
            .eval_expression_with_scope(&mut scope, &script)
            .map_err(|e| ResolveError::Expression(format!("{} in `{}`", e, expression)))?;

        result
            .as_bool()
            .map_err(|actual| ResolveError::ExpressionTypeError(actual.to_string()))
    }
}

#[derive(Clone)]
struct Bridge {
    functions: Arc<FunctionRegistry>,
    tables: Arc<dyn TableStore>,
    context: Arc<Context>,
}

impl Bridge {
    fn call(&self, name: &str, args: Vec<Dynamic>) -> Result<Dynamic, Box<EvalAltResult>> {
        let values = args
            .iter()
            .map(|arg| from_dynamic::<Value>(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let scope = CallScope {
            context: &self.context,
            tables: self.tables.as_ref(),
        };
        let result = self
            .functions
            .call(name, &values, &scope)
            .map_err(|e| Box::new(EvalAltResult::ErrorRuntime(e.to_string().into(), Position::NONE)))?;
        to_dynamic(result)
    }
}

/// Rewrite the localized operators `Y`/`AND` and `O`/`OR` (any case) into
/// `&&`/`||`, and single-quoted string literals into double-quoted ones.
/// Text inside string literals is left untouched.
pub fn normalize(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len() + 8);
    let mut chars = expression.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                out.push('"');
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    if c == '"' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
            '"' => {
                out.push('"');
                let mut escaped = false;
                for c in chars.by_ref() {
                    out.push(c);
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        break;
                    }
                }
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let lowered = word.to_lowercase();
                let replacement = match lowered.as_str() {
                    "y" | "and" => "&&",
                    "o" | "or" => "||",
                    _ => word.as_str(),
                };
                out.push_str(replacement);
            }
            other => out.push(other),
        }
    }
    out
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().any(|c| c.is_ascii_alphabetic())
}
