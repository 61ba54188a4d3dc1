//! Request plumbing shared by the HTTP-based executors

use motorcore::{BackendError, NodeSpec, ServerConfig, Value, ValueExt};
use std::time::Duration;

/// Parse durations such as `500ms`, `15s`, `2m` or `1m30s`.
/// A bare number is taken as seconds.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(secs) = text.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let amount: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "ms" => amount / 1000.0,
            "s" => amount,
            "m" => amount * 60.0,
            "h" => amount * 3600.0,
            _ => return None,
        };
        total = total.checked_add(Duration::try_from_secs_f64(seconds).ok()?)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}

/// Per-call timeout from `extras.timeout`, else `default`
pub fn timeout_for(server: &ServerConfig, default: Duration) -> Duration {
    match server.extras.get("timeout") {
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(default),
        Some(Value::String(text)) => parse_duration(text).unwrap_or_else(|| {
            tracing::warn!("Server {}: invalid timeout '{}'", server.id, text);
            default
        }),
        _ => default,
    }
}

pub fn client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Configuration(format!("HTTP client: {}", e)))
}

/// The node's `objeto`, required by every HTTP-based call
pub fn object(node: &NodeSpec) -> Result<String, BackendError> {
    node.data
        .get("objeto")
        .map(ValueExt::to_plain_string)
        .filter(|o| !o.trim().is_empty())
        .ok_or_else(|| {
            BackendError::Configuration(format!("node '{}' has no objeto", node.id))
        })
}

/// Read the body; non-success statuses become errors carrying it
pub async fn read_response(response: reqwest::Response) -> Result<String, BackendError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BackendError::Request(format!("failed to read response: {}", e)))?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

pub fn request_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Request(format!("request timed out: {}", err))
    } else {
        BackendError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("15s"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("10x"), None);
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        assert_eq!(parse_duration("1e400"), None);
        assert_eq!(parse_duration("-5"), None);
        assert_eq!(parse_duration("NaN"), None);
        assert_eq!(parse_duration("99999999999999999999999h"), None);
    }

    #[test]
    fn unusable_timeouts_fall_back_to_the_default() {
        let default = Duration::from_secs(10);
        let huge = ServerConfig::new("s1", "rest", "http://localhost").with_extra("timeout", 1e300);
        assert_eq!(timeout_for(&huge, default), default);

        let text = ServerConfig::new("s1", "rest", "http://localhost").with_extra("timeout", "1e400");
        assert_eq!(timeout_for(&text, default), default);

        let ok = ServerConfig::new("s1", "rest", "http://localhost").with_extra("timeout", 2);
        assert_eq!(timeout_for(&ok, default), Duration::from_secs(2));
    }
}
