//! Build client-facing response frames from classified upstream events.
//!
//! [`ChunkBuilder`] produces streaming chunks that all share one response
//! id and creation timestamp; a builder lives for exactly one attempt, so
//! a retried attempt gets a fresh identity. [`Aggregate`] is the buffered
//! counterpart for non-streaming requests.

use super::openai_types::{
    ChatCompletionChunk, ChatCompletionResponse, Choice, ChunkChoice, ChunkDelta, DeltaToolCall,
    ResponseMessage, ToolCall, ToolCallFunction, Usage,
};
use super::upstream_types::UpstreamEvent;

const CHUNK_OBJECT: &str = "chat.completion.chunk";

#[derive(Debug)]
pub struct ChunkBuilder {
    id: String,
    created: i64,
    model: String,
    tool_index: u32,
}

impl ChunkBuilder {
    #[must_use]
    pub fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            tool_index: 0,
        }
    }

    /// The role-opening chunk, emitted once before any content.
    #[must_use]
    pub fn role_chunk(&self) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                role: Some("assistant".to_string()),
                ..ChunkDelta::default()
            },
            None,
        )
    }

    #[must_use]
    pub fn content_chunk(&self, content: &str) -> ChatCompletionChunk {
        self.chunk(
            ChunkDelta {
                content: Some(content.to_string()),
                ..ChunkDelta::default()
            },
            None,
        )
    }

    /// One standalone tool-call chunk. Each carries a monotonically
    /// increasing index so multiple invocations stay distinguishable.
    pub fn tool_chunk(&mut self, id: &str, name: &str, arguments: &str) -> ChatCompletionChunk {
        let index = self.tool_index;
        self.tool_index += 1;

        self.chunk(
            ChunkDelta {
                tool_calls: Some(vec![DeltaToolCall {
                    index,
                    id: id.to_string(),
                    call_type: "function".to_string(),
                    function: ToolCallFunction {
                        name: name.to_string(),
                        arguments: arguments.to_string(),
                    },
                }]),
                ..ChunkDelta::default()
            },
            None,
        )
    }

    /// The terminal chunk: empty delta, finish reason "stop".
    #[must_use]
    pub fn finish_chunk(&self) -> ChatCompletionChunk {
        self.chunk(ChunkDelta::default(), Some("stop".to_string()))
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: CHUNK_OBJECT.to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}

/// Accumulator for the non-streaming path. Text concatenates in arrival
/// order; tool calls keep arrival order.
#[derive(Debug, Default)]
pub struct Aggregate {
    text: String,
    tool_calls: Vec<ToolCall>,
}

impl Aggregate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &UpstreamEvent) {
        match event {
            UpstreamEvent::TextDelta { content } => self.text.push_str(content),
            UpstreamEvent::ToolInvocation {
                id,
                name,
                arguments,
            } => self.tool_calls.push(ToolCall {
                id: id.clone(),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name: name.clone(),
                    arguments: arguments.clone(),
                },
            }),
            UpstreamEvent::Unrecognized => {}
        }
    }

    /// True when no classified event has been absorbed. An empty
    /// aggregation must take the empty-response retry path, never be
    /// returned as a valid zero-content answer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty()
    }

    #[must_use]
    pub fn into_response(self, model: &str) -> ChatCompletionResponse {
        let content = if self.text.is_empty() {
            None
        } else {
            Some(self.text)
        };
        let tool_calls = if self.tool_calls.is_empty() {
            None
        } else {
            Some(self.tool_calls)
        };

        ChatCompletionResponse {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_string(),
                    content,
                    tool_calls,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage::default(),
        }
    }
}
