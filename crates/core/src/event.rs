//! Tool lifecycle events emitted to per-turn listeners.

use serde::{Deserialize, Serialize};

/// Where a tool call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Started,
    Finished,
    Error,
}

/// A tool call notification.
///
/// `Started` carries no result; `Finished` and `Error` carry the text that
/// was fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEvent {
    pub name: String,
    pub arguments: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    pub status: ToolStatus,
}

impl ToolEvent {
    pub fn started(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            result: None,
            status: ToolStatus::Started,
        }
    }

    pub fn finished(name: impl Into<String>, arguments: serde_json::Value, result: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            result: Some(result.into()),
            status: ToolStatus::Finished,
        }
    }

    pub fn failed(name: impl Into<String>, arguments: serde_json::Value, result: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
            result: Some(result.into()),
            status: ToolStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let event = ToolEvent::failed("message", serde_json::json!({}), "Error: closed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["result"], "Error: closed");
    }

    #[test]
    fn started_has_no_result() {
        let event = ToolEvent::started("message", serde_json::json!({"content": "hi"}));
        assert_eq!(event.status, ToolStatus::Started);
        assert!(event.result.is_none());
        assert!(!serde_json::to_string(&event).unwrap().contains("result"));
    }
}
