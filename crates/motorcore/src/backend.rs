use crate::{BackendError, Context, NodeSpec, ServerConfig};
use async_trait::async_trait;

/// Executes a process node's call against one kind of remote server.
///
/// Implementations receive the node (for `objeto`, `metodoHttp`, ...), the
/// current context and the resolved server settings, and return the raw
/// response text.
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    /// Server type tag this executor handles (e.g. "rest", "soap")
    fn server_type(&self) -> &str;

    async fn execute(
        &self,
        node: &NodeSpec,
        context: &Context,
        server: &ServerConfig,
    ) -> Result<String, BackendError>;
}
