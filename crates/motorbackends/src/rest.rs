use crate::http;
use async_trait::async_trait;
use motorcore::{BackendError, BackendExecutor, Context, NodeSpec, ServerConfig, Value, ValueExt};
use reqwest::Method;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server extras that configure the call instead of becoming headers
const RESERVED_EXTRAS: [&str; 2] = ["timeout", "auth"];

/// REST executor: calls `<host>/<objeto>` with the node's `metodoHttp`
#[derive(Debug, Default, Clone)]
pub struct RestBackend;

impl RestBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendExecutor for RestBackend {
    fn server_type(&self) -> &str {
        "rest"
    }

    async fn execute(
        &self,
        node: &NodeSpec,
        context: &Context,
        server: &ServerConfig,
    ) -> Result<String, BackendError> {
        let endpoint = http::object(node)?;
        let url = format!(
            "{}/{}",
            server.host.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        let method_name = node
            .data
            .get("metodoHttp")
            .map(ValueExt::to_plain_string)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "GET".to_string())
            .to_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| BackendError::Configuration(format!("Unsupported method: {}", method_name)))?;

        let client = http::client(http::timeout_for(server, DEFAULT_TIMEOUT))?;
        let mut request = client.request(method.clone(), &url);
        if method != Method::GET {
            request = request.json(context.as_map());
        }

        for (key, value) in &server.extras {
            if RESERVED_EXTRAS.contains(&key.as_str()) {
                continue;
            }
            let value = match value {
                Value::Object(_) | Value::Array(_) => continue,
                other => other.to_plain_string(),
            };
            if value.trim().is_empty() {
                continue;
            }
            request = match key.to_lowercase().as_str() {
                "apikey" => request.header("X-API-Key", value.trim()),
                _ => request.header(key.as_str(), value.trim()),
            };
        }

        tracing::debug!("REST {} {}", method, url);
        let response = request.send().await.map_err(http::request_error)?;
        tracing::debug!("REST {} {} -> {}", method, url, response.status());

        http::read_response(response).await
    }
}
