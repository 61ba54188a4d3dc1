use crate::http;
use async_trait::async_trait;
use motorcore::{keys, BackendError, BackendExecutor, Context, NodeSpec, ServerConfig, Value, ValueExt};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_NAMESPACE: &str = "http://tempuri.org/";
const RESERVED_EXTRAS: [&str; 4] = ["auth", "soapAction", "namespace", "timeout"];

/// SOAP 1.1 executor: posts an envelope whose body element is the node's
/// `objeto` operation, one child element per scalar context field.
#[derive(Debug, Default, Clone)]
pub struct SoapBackend;

impl SoapBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendExecutor for SoapBackend {
    fn server_type(&self) -> &str {
        "soap"
    }

    async fn execute(
        &self,
        node: &NodeSpec,
        context: &Context,
        server: &ServerConfig,
    ) -> Result<String, BackendError> {
        let operation = http::object(node)?;
        let namespace = server
            .extra_str("namespace")
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or(DEFAULT_NAMESPACE);
        let action = soap_action(server.extra_str("soapAction"), &operation);
        let envelope = build_envelope(&operation, namespace, context);

        let client = http::client(http::timeout_for(server, DEFAULT_TIMEOUT))?;
        let mut request = client
            .post(&server.host)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}\"", action))
            .body(envelope);

        if let Some(Value::Object(auth)) = server.extras.get("auth") {
            if let (Some(user), Some(password)) = (
                auth.get("usuario").and_then(Value::as_str),
                auth.get("clave").and_then(Value::as_str),
            ) {
                request = request.basic_auth(user, Some(password));
            }
        }
        for (key, value) in &server.extras {
            if RESERVED_EXTRAS.contains(&key.as_str()) || value.is_object() || value.is_array() {
                continue;
            }
            let value = value.to_plain_string();
            if !value.trim().is_empty() {
                request = request.header(key.as_str(), value.trim());
            }
        }

        tracing::debug!("SOAP {} -> {} ({})", operation, server.host, action);
        let response = request.send().await.map_err(http::request_error)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Request(format!("failed to read response: {}", e)))?;

        if let Some((code, message)) = parse_fault(&body) {
            tracing::warn!("SOAP fault from {}: {} {}", server.host, code, message);
            return Err(BackendError::Fault { code, message, body });
        }
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// `SOAPAction` value: base joined to the operation with a single `/`
pub fn soap_action(base: Option<&str>, operation: &str) -> String {
    match base.map(str::trim).filter(|b| !b.is_empty()) {
        Some(base) if base.ends_with('/') => format!("{}{}", base, operation),
        Some(base) => format!("{}/{}", base, operation),
        None => operation.to_string(),
    }
}

/// Build the request envelope from the scalar fields of the context.
/// Response and engine-internal fields are left out.
pub fn build_envelope(operation: &str, namespace: &str, context: &Context) -> String {
    let mut body = format!("<{} xmlns=\"{}\">", operation, escape(namespace));
    for (name, value) in context.iter() {
        if name == keys::FULL_OUTPUT_RAW
            || name.starts_with(keys::FULL_OUTPUT)
            || name.starts_with('_')
            || value.is_object()
            || value.is_array()
        {
            continue;
        }
        body.push_str(&format!("<{0}>{1}</{0}>", name, escape(&value.to_plain_string())));
    }
    body.push_str(&format!("</{}>", operation));

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
            "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">",
            "<soap:Body>{}</soap:Body>",
            "</soap:Envelope>"
        ),
        body
    )
}

/// `faultcode` and `faultstring` of a SOAP fault response
pub fn parse_fault(body: &str) -> Option<(String, String)> {
    if !body.contains("Fault") && !body.contains("faultcode") {
        return None;
    }
    let code = element_text(body, "faultcode")?;
    let message = element_text(body, "faultstring").unwrap_or_default();
    Some((code, message))
}

/// Text of the first element with the given local name, any prefix
fn element_text(xml: &str, local_name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(offset) = xml[search..].find('<') {
        let open = search + offset;
        let close = open + xml[open..].find('>')?;
        let tag = &xml[open + 1..close];
        search = close + 1;

        if tag.starts_with('/') || tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        let name = tag.split_whitespace().next().unwrap_or("");
        let local = name.rsplit(':').next().unwrap_or(name);
        if local != local_name {
            continue;
        }

        let end = xml[search..].find("</")? + search;
        return Some(unescape(xml[search..end].trim()));
    }
    None
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_soap_action() {
        assert_eq!(soap_action(Some("http://tempuri.org"), "Sumar"), "http://tempuri.org/Sumar");
        assert_eq!(soap_action(Some("http://tempuri.org/"), "Sumar"), "http://tempuri.org/Sumar");
        assert_eq!(soap_action(None, "Sumar"), "Sumar");
    }

    #[test]
    fn envelope_holds_scalar_fields_only() {
        let mut context = Context::new();
        context.insert("a", 1);
        context.insert("nombre", "A&B");
        context.insert("FullOutput", "<x/>");
        context.insert("fullOutput_n1", json!({"x": 1}));
        context.insert("_interno", "x");
        context.insert("lista", json!([1, 2]));

        let envelope = build_envelope("Sumar", DEFAULT_NAMESPACE, &context);
        assert!(envelope.contains("<Sumar xmlns=\"http://tempuri.org/\"><a>1</a><nombre>A&amp;B</nombre></Sumar>"));
        assert!(!envelope.contains("FullOutput"));
        assert!(!envelope.contains("_interno"));
        assert!(!envelope.contains("lista"));
    }

    #[test]
    fn detects_faults() {
        let fault = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
            <soap:Body><soap:Fault>
                <faultcode>soap:Server</faultcode>
                <faultstring>Division by zero</faultstring>
            </soap:Fault></soap:Body></soap:Envelope>"#;
        assert_eq!(
            parse_fault(fault),
            Some(("soap:Server".to_string(), "Division by zero".to_string()))
        );
        assert_eq!(parse_fault("<SumarResult>3</SumarResult>"), None);
    }
}
