//! Upstream wire types: the translated chat request we submit, the
//! incremental events the upstream streams back, and the auxiliary
//! `{success, data}` envelopes of its auth and model endpoints.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request body (what we send TO the upstream)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,
    pub attached_context: Vec<serde_json::Value>,
    pub model_id: String,
    pub additional_tools: Vec<ToolSpec>,
    pub backend_plugins: Vec<serde_json::Value>,
    pub use_memory: bool,
    pub use_knowledge: bool,
    pub ephemeral: bool,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Event stream (what the upstream sends BACK, one record per data frame)
// ---------------------------------------------------------------------------

/// One classified upstream event. Produced from a single decoded frame,
/// consumed once, never shared across attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    TextDelta {
        content: String,
    },
    ToolInvocation {
        id: String,
        name: String,
        arguments: String,
    },
    Unrecognized,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawEvent {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        content: String,
    },
    #[serde(rename = "toolUse")]
    ToolUse {
        #[serde(default, rename = "toolId")]
        tool_id: String,
        #[serde(default)]
        name: String,
        // The upstream sends this as either a pre-encoded string or a
        // bare JSON object; both forms carry the tool arguments.
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

/// Classify one decoded frame payload.
///
/// The upstream is permitted to emit keep-alive noise, so a payload that
/// is not valid JSON is `Unrecognized`, not an error. Text events with
/// empty content and tool events with no name are likewise discarded.
#[must_use]
pub fn classify(payload: &str) -> UpstreamEvent {
    match serde_json::from_str::<RawEvent>(payload) {
        Ok(RawEvent::Text { content }) if !content.is_empty() => {
            UpstreamEvent::TextDelta { content }
        }
        Ok(RawEvent::ToolUse {
            tool_id,
            name,
            input,
        }) if !name.is_empty() => UpstreamEvent::ToolInvocation {
            id: tool_id,
            name,
            arguments: arguments_to_string(input),
        },
        _ => UpstreamEvent::Unrecognized,
    }
}

fn arguments_to_string(input: serde_json::Value) -> String {
    match input {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Auxiliary endpoint envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub success: bool,
    pub data: Option<RefreshData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
pub struct ModelsEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<UpstreamModel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamModel {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub pricing: Option<ModelPricing>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    #[serde(default)]
    pub is_free: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_text() {
        let event = classify(r#"{"type":"text","content":"Hi"}"#);
        assert_eq!(
            event,
            UpstreamEvent::TextDelta {
                content: "Hi".to_string()
            }
        );
    }

    #[test]
    fn test_classify_tool_use() {
        let event =
            classify(r#"{"type":"toolUse","toolId":"t1","name":"search","input":"{\"q\":1}"}"#);
        assert_eq!(
            event,
            UpstreamEvent::ToolInvocation {
                id: "t1".to_string(),
                name: "search".to_string(),
                arguments: "{\"q\":1}".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_text_content_discarded() {
        assert_eq!(
            classify(r#"{"type":"text","content":""}"#),
            UpstreamEvent::Unrecognized
        );
        assert_eq!(classify(r#"{"type":"text"}"#), UpstreamEvent::Unrecognized);
    }

    #[test]
    fn test_tool_use_with_object_input() {
        let event = classify(r#"{"type":"toolUse","toolId":"t1","name":"search","input":{"q":1}}"#);
        assert_eq!(
            event,
            UpstreamEvent::ToolInvocation {
                id: "t1".to_string(),
                name: "search".to_string(),
                arguments: "{\"q\":1}".to_string(),
            }
        );
    }

    #[test]
    fn test_tool_use_without_input() {
        let event = classify(r#"{"type":"toolUse","toolId":"t1","name":"noop"}"#);
        assert_eq!(
            event,
            UpstreamEvent::ToolInvocation {
                id: "t1".to_string(),
                name: "noop".to_string(),
                arguments: String::new(),
            }
        );
    }

    #[test]
    fn test_nameless_tool_use_discarded() {
        assert_eq!(
            classify(r#"{"type":"toolUse","toolId":"t1","input":"{}"}"#),
            UpstreamEvent::Unrecognized
        );
    }

    #[test]
    fn test_noise_is_unrecognized_not_an_error() {
        assert_eq!(classify("not json"), UpstreamEvent::Unrecognized);
        assert_eq!(classify(""), UpstreamEvent::Unrecognized);
        assert_eq!(
            classify(r#"{"type":"heartbeat"}"#),
            UpstreamEvent::Unrecognized
        );
        assert_eq!(classify(r#"{"no":"type"}"#), UpstreamEvent::Unrecognized);
    }
}
