//! Bundled backend executors
//!
//! REST and SOAP executors for process nodes. Database backends are not
//! bundled; register an executor for `postgresql` servers separately.

mod http;
mod rest;
mod soap;

pub use http::parse_duration;
pub use rest::RestBackend;
pub use soap::{build_envelope, parse_fault, soap_action, SoapBackend};
use motorruntime::BackendRegistry;

use std::sync::Arc;

/// Register all bundled executors with a registry
pub fn register_all(registry: &mut BackendRegistry) {
    registry.register(Arc::new(RestBackend::new()));
    registry.register(Arc::new(SoapBackend::new()));
}
