use crate::{keys, Map, Value};
use serde::{Deserialize, Serialize};

pub const STATUS_OK: i32 = 0;
pub const STATUS_INCOMPLETE: i32 = 98;
pub const STATUS_ERROR: i32 = 99;

/// Outcome of one flow execution as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(rename = "estado")]
    pub status: i32,

    #[serde(rename = "mensaje")]
    pub message: String,

    pub data: Option<Map>,

    #[serde(rename = "procesoId")]
    pub process_id: String,

    pub trigger: String,
}

impl ExecutionResult {
    pub fn completed(process_id: impl Into<String>, trigger: impl Into<String>, data: Map) -> Self {
        Self {
            status: STATUS_OK,
            message: "OK".to_string(),
            data: Some(data),
            process_id: process_id.into(),
            trigger: trigger.into(),
        }
    }

    pub fn incomplete(process_id: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            status: STATUS_INCOMPLETE,
            message: "incomplete flow: no output node was reached".to_string(),
            data: None,
            process_id: process_id.into(),
            trigger: trigger.into(),
        }
    }

    pub fn failed(
        process_id: impl Into<String>,
        trigger: impl Into<String>,
        message: impl Into<String>,
        error_fields: Map,
    ) -> Self {
        Self {
            status: STATUS_ERROR,
            message: message.into(),
            data: Some(error_fields),
            process_id: process_id.into(),
            trigger: trigger.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(key))
    }

    /// Non-empty `codigoError` carried in the response data
    pub fn error_code(&self) -> Option<String> {
        self.get(keys::ERROR_CODE)
            .map(crate::ValueExt::to_plain_string)
            .filter(|code| !code.trim().is_empty())
    }
}
