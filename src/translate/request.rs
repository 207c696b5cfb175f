//! Translate client chat-completion requests into the upstream format.
//!
//! The upstream accepts a single flattened prompt rather than a message
//! list, plus its own tool-spec shape. Pure functions: no I/O.

use super::openai_types::{ChatCompletionRequest, ChatContent, ChatMessage, ChatTool, ContentPart};
use super::upstream_types::{ChatRequest, ToolSpec};

/// Build the upstream request body from a client request.
///
/// `model_id` is the upstream's internal identifier for the requested
/// model, already resolved by the catalog. Image parts are dropped: the
/// upload side-channel is out of scope for the relay core.
#[must_use]
pub fn to_upstream_request(
    req: &ChatCompletionRequest,
    model_id: &str,
    timezone: &str,
) -> ChatRequest {
    ChatRequest {
        prompt: messages_to_prompt(&req.messages),
        attached_context: Vec::new(),
        model_id: model_id.to_string(),
        additional_tools: req
            .tools
            .as_deref()
            .map(translate_tools)
            .unwrap_or_default(),
        backend_plugins: Vec::new(),
        use_memory: false,
        use_knowledge: false,
        ephemeral: false,
        timezone: timezone.to_string(),
    }
}

/// Flatten the message list into one `role: content` prompt, preserving
/// arrival order. Assistant tool calls and tool-result messages are
/// echoed inline so the upstream sees the full exchange.
#[must_use]
pub fn messages_to_prompt(messages: &[ChatMessage]) -> String {
    let mut formatted = Vec::new();

    for message in messages {
        if message.role.is_empty() {
            continue;
        }

        match &message.content {
            Some(ChatContent::Text(text)) if message.tool_call_id.is_none() => {
                formatted.push(format!("{}: {}", message.role, text));
            }
            Some(ChatContent::Parts(parts)) => {
                for part in parts {
                    if let ContentPart::Text { text } = part {
                        formatted.push(format!("{}: {}", message.role, text));
                    }
                }
            }
            _ => {}
        }

        if let Some(ref tool_calls) = message.tool_calls {
            let encoded = serde_json::to_string(tool_calls).unwrap_or_default();
            formatted.push(format!("{}: {}", message.role, encoded));
        }

        if let Some(ref tool_call_id) = message.tool_call_id {
            let content = match &message.content {
                Some(ChatContent::Text(text)) => text.clone(),
                _ => String::new(),
            };
            formatted.push(format!(
                "{}: tool_call_id: {} {}",
                message.role, tool_call_id, content
            ));
        }
    }

    formatted.join("\n\n")
}

fn translate_tools(tools: &[ChatTool]) -> Vec<ToolSpec> {
    tools
        .iter()
        .filter(|t| t.tool_type == "function")
        .map(|t| ToolSpec {
            name: t.function.name.clone(),
            description: t.function.description.clone().unwrap_or_default(),
            parameters: t
                .function
                .parameters
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::openai_types::ChatFunction;
    use std::collections::HashMap;

    fn text_message(role: &str, text: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: Some(ChatContent::Text(text.to_string())),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    #[test]
    fn test_prompt_flattening_order() {
        let messages = vec![
            text_message("system", "Be brief."),
            text_message("user", "Hello"),
            text_message("assistant", "Hi!"),
        ];

        let prompt = messages_to_prompt(&messages);
        assert_eq!(prompt, "system: Be brief.\n\nuser: Hello\n\nassistant: Hi!");
    }

    #[test]
    fn test_multipart_content_keeps_text_drops_images() {
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: Some(ChatContent::Parts(vec![
                ContentPart::Text {
                    text: "look at this".to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: serde_json::json!({"url": "data:image/png;base64,xx"}),
                },
            ])),
            tool_call_id: None,
            tool_calls: None,
        }];

        let prompt = messages_to_prompt(&messages);
        assert_eq!(prompt, "user: look at this");
    }

    #[test]
    fn test_tool_result_message() {
        let messages = vec![ChatMessage {
            role: "tool".to_string(),
            content: Some(ChatContent::Text("42".to_string())),
            tool_call_id: Some("call_1".to_string()),
            tool_calls: None,
        }];

        let prompt = messages_to_prompt(&messages);
        assert_eq!(prompt, "tool: tool_call_id: call_1 42");
    }

    #[test]
    fn test_tool_translation() {
        let req = ChatCompletionRequest {
            messages: vec![text_message("user", "weather?")],
            model: "gpt-4o".to_string(),
            stream: false,
            tools: Some(vec![ChatTool {
                tool_type: "function".to_string(),
                function: ChatFunction {
                    name: "get_weather".to_string(),
                    description: Some("Current weather".to_string()),
                    parameters: Some(serde_json::json!({"type": "object"})),
                },
            }]),
            extra: HashMap::new(),
        };

        let upstream = to_upstream_request(&req, "model-123", "UTC");
        assert_eq!(upstream.model_id, "model-123");
        assert_eq!(upstream.additional_tools.len(), 1);
        assert_eq!(upstream.additional_tools[0].name, "get_weather");
        assert_eq!(upstream.timezone, "UTC");
        assert!(!upstream.use_memory);
    }

    #[test]
    fn test_tool_without_description_or_schema() {
        let tools = vec![ChatTool {
            tool_type: "function".to_string(),
            function: ChatFunction {
                name: "noop".to_string(),
                description: None,
                parameters: None,
            },
        }];

        let specs = translate_tools(&tools);
        assert_eq!(specs[0].description, "");
        assert_eq!(specs[0].parameters, serde_json::json!({}));
    }
}
