//! The relay core: submit the translated request upstream, consume its
//! event stream, and re-frame it for the client, with bounded retry and
//! one-shot credential refresh.
//!
//! Attempts are strictly sequential; every retry abandons the previous
//! attempt's connection, line buffer, and response identity before a new
//! one starts. The refresh gate is the only state that spans attempts.

use crate::auth::{apply_upstream_headers, CredentialCache};
use crate::config::{RelayConfig, UpstreamConfig};
use crate::error::{RelayError, Result};
use crate::logging::SharedLogger;
use crate::retry::{run_with_retry, AttemptOutcome, RetryPolicy};
use crate::sse::{event_payload, LineBuffer};
use crate::translate::openai_types::{ChatCompletionResponse, ErrorEnvelope};
use crate::translate::response::{Aggregate, ChunkBuilder};
use crate::translate::upstream_types::{classify, ChatRequest, UpstreamEvent};

use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Stream end marker, sent as the final data frame of a successful stream.
pub const DONE_MARKER: &str = "[DONE]";

/// One client-facing SSE frame: a bare data line, or a named event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

pub type SseStream =
    Pin<Box<dyn Stream<Item = std::result::Result<SseEvent, std::io::Error>> + Send>>;

/// Everything one logical client request carries into the relay.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub body: ChatRequest,
    /// Client-facing model name, echoed in every chunk.
    pub model: String,
    pub access_token: String,
    pub refresh_token: String,
    pub identifier: String,
}

// ---------------------------------------------------------------------------
// Credential refresh gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum GateState {
    Unchallenged,
    RefreshPending,
    Resolved,
}

/// At most one refresh-and-resubmit per logical client request, across
/// all retry attempts combined. A second auth challenge after the gate
/// has resolved is terminal.
#[derive(Debug)]
pub struct RefreshGate {
    state: Mutex<GateState>,
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Unchallenged),
        }
    }

    /// Claim the single refresh slot. True only on the first challenge.
    fn try_begin(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == GateState::Unchallenged {
            *state = GateState::RefreshPending;
            true
        } else {
            false
        }
    }

    fn resolve(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = GateState::Resolved;
    }
}

// ---------------------------------------------------------------------------
// Single-attempt upstream call (shared by both paths)
// ---------------------------------------------------------------------------

/// Issue the upstream request once and classify its status, handling the
/// 401 refresh-and-resubmit inline. Returns the open 200 response, or
/// the error for the retry predicate to judge. Consumes no retry budget
/// of its own for the auth path.
#[allow(clippy::too_many_arguments)]
async fn open_upstream(
    url: &str,
    body: &ChatRequest,
    upstream: &UpstreamConfig,
    token: &Mutex<String>,
    identifier: &str,
    refresh_token: &str,
    gate: &RefreshGate,
    client: &reqwest::Client,
    credentials: &CredentialCache,
    logger: &SharedLogger,
) -> Result<reqwest::Response> {
    loop {
        let access_token = token.lock().unwrap_or_else(|e| e.into_inner()).clone();

        let response = apply_upstream_headers(client.post(url), upstream, &access_token, identifier)
            .json(body)
            .send()
            .await
            .map_err(|e| RelayError::network(format!("Upstream request failed: {e}")))?;

        let status = response.status().as_u16();
        logger.debug("relay", format!("Upstream response status: {status}"));

        if status == 401 {
            if gate.try_begin() {
                logger.warn("relay", "Access token expired, refreshing");
                match credentials.access_token(refresh_token, true).await {
                    Ok(fresh) => {
                        *token.lock().unwrap_or_else(|e| e.into_inner()) = fresh;
                        gate.resolve();
                        // Resubmit the same request once with the new credential
                        continue;
                    }
                    Err(e) => {
                        gate.resolve();
                        return Err(e);
                    }
                }
            }
            return Err(RelayError::auth("Authentication failed after token refresh"));
        }

        if status != 200 {
            let body_text = response.text().await.unwrap_or_default();
            logger.error(
                "relay",
                format!("Upstream error: {status} - {}", truncate(&body_text, 300)),
            );
            return Err(RelayError::UpstreamStatus {
                status,
                body: body_text,
            });
        }

        return Ok(response);
    }
}

// ---------------------------------------------------------------------------
// Non-streaming path
// ---------------------------------------------------------------------------

/// Relay one non-streaming request: aggregate the whole upstream stream
/// and return a single completion object, retrying transient failures.
pub async fn relay_non_streaming(
    req: &RelayRequest,
    config: &RelayConfig,
    client: &reqwest::Client,
    credentials: &CredentialCache,
    logger: &SharedLogger,
) -> Result<ChatCompletionResponse> {
    let policy = RetryPolicy::from_settings(&config.retry);
    let url = format!("{}/api/v1/chat", config.base_url());
    let gate = RefreshGate::new();
    let token = Mutex::new(req.access_token.clone());

    let aggregate = run_with_retry(policy, logger, "relay", |attempt| {
        attempt_aggregate(
            attempt,
            &url,
            req,
            &config.upstream,
            &token,
            &gate,
            client,
            credentials,
            logger,
        )
    })
    .await?;

    logger.info(
        "relay",
        format!("Completed non-streaming request for model {}", req.model),
    );

    Ok(aggregate.into_response(&req.model))
}

#[allow(clippy::too_many_arguments)]
async fn attempt_aggregate(
    attempt: u32,
    url: &str,
    req: &RelayRequest,
    upstream: &UpstreamConfig,
    token: &Mutex<String>,
    gate: &RefreshGate,
    client: &reqwest::Client,
    credentials: &CredentialCache,
    logger: &SharedLogger,
) -> AttemptOutcome<Aggregate> {
    logger.info(
        "relay",
        format!("Attempt {attempt} for model {}", req.model),
    );

    let response = match open_upstream(
        url,
        &req.body,
        upstream,
        token,
        &req.identifier,
        &req.refresh_token,
        gate,
        client,
        credentials,
        logger,
    )
    .await
    {
        Ok(r) => r,
        Err(e) => return AttemptOutcome::from_error(e),
    };

    // Fresh per attempt: no partial data leaks across retries
    let mut buffer = LineBuffer::new();
    let mut aggregate = Aggregate::new();
    let mut byte_stream = response.bytes_stream();

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                return AttemptOutcome::Retry(RelayError::stream(format!(
                    "Error reading upstream stream: {e}"
                )))
            }
        };

        for line in buffer.push(&chunk) {
            if let Some(payload) = event_payload(&line) {
                aggregate.push(&classify(payload));
            }
        }
    }

    if aggregate.is_empty() {
        logger.warn("relay", "Upstream stream produced no content");
        return AttemptOutcome::Retry(RelayError::EmptyResponse);
    }

    AttemptOutcome::Success(aggregate)
}

// ---------------------------------------------------------------------------
// Streaming path
// ---------------------------------------------------------------------------

/// Relay one streaming request as a client-facing SSE stream.
///
/// Chunks are emitted as the upstream produces them. A retried attempt
/// starts over with a fresh response identity; on budget exhaustion the
/// stream ends with a single `error` event and nothing after it.
pub fn relay_streaming(
    req: RelayRequest,
    config: RelayConfig,
    client: reqwest::Client,
    credentials: Arc<CredentialCache>,
    logger: SharedLogger,
) -> SseStream {
    Box::pin(async_stream::stream! {
        let policy = RetryPolicy::from_settings(&config.retry);
        let mut backoff = policy.backoff();
        let url = format!("{}/api/v1/chat", config.base_url());
        let gate = RefreshGate::new();
        let token = Mutex::new(req.access_token.clone());

        for attempt in 1..=policy.max_attempts {
            logger.info(
                "stream",
                format!(
                    "Stream attempt {attempt}/{} for model {}",
                    policy.max_attempts, req.model
                ),
            );

            let response = match open_upstream(
                &url,
                &req.body,
                &config.upstream,
                &token,
                &req.identifier,
                &req.refresh_token,
                &gate,
                &client,
                &credentials,
                &logger,
            )
            .await
            {
                Ok(r) => r,
                Err(e) => {
                    if e.is_retryable() && attempt < policy.max_attempts {
                        logger.warn("stream", format!("Attempt {attempt} failed: {e}"));
                        backoff.wait().await;
                        continue;
                    }
                    logger.error("stream", format!("Giving up: {e}"));
                    yield Ok(error_event(&e));
                    return;
                }
            };

            // Connection confirmed open: fresh identity for this attempt,
            // role chunk before any content is read.
            let mut builder = ChunkBuilder::new(&req.model);
            if let Some(event) = data_event(&builder.role_chunk()) {
                yield Ok(event);
            }

            let mut buffer = LineBuffer::new();
            let mut has_content = false;
            let mut attempt_err: Option<RelayError> = None;
            let mut byte_stream = response.bytes_stream();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        attempt_err = Some(RelayError::stream(format!(
                            "Error reading upstream stream: {e}"
                        )));
                        break;
                    }
                };

                for line in buffer.push(&chunk) {
                    let Some(payload) = event_payload(&line) else {
                        continue;
                    };
                    match classify(payload) {
                        UpstreamEvent::TextDelta { content } => {
                            if let Some(event) = data_event(&builder.content_chunk(&content)) {
                                yield Ok(event);
                            }
                            has_content = true;
                        }
                        UpstreamEvent::ToolInvocation { id, name, arguments } => {
                            if let Some(event) =
                                data_event(&builder.tool_chunk(&id, &name, &arguments))
                            {
                                yield Ok(event);
                            }
                            has_content = true;
                        }
                        UpstreamEvent::Unrecognized => {}
                    }
                }
            }

            if attempt_err.is_none() && !has_content {
                attempt_err = Some(RelayError::EmptyResponse);
            }

            match attempt_err {
                None => {
                    if let Some(event) = data_event(&builder.finish_chunk()) {
                        yield Ok(event);
                    }
                    yield Ok(SseEvent {
                        event: None,
                        data: DONE_MARKER.to_string(),
                    });
                    logger.info("stream", "Stream completed");
                    return;
                }
                Some(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    logger.warn("stream", format!("Attempt {attempt} failed: {e}"));
                    backoff.wait().await;
                }
                Some(e) => {
                    logger.error("stream", format!("Giving up: {e}"));
                    yield Ok(error_event(&e));
                    return;
                }
            }
        }
    })
}

fn data_event<T: serde::Serialize>(chunk: &T) -> Option<SseEvent> {
    serde_json::to_string(chunk).ok().map(|data| SseEvent {
        event: None,
        data,
    })
}

fn error_event(err: &RelayError) -> SseEvent {
    let envelope = ErrorEnvelope::new(err.error_type(), err.to_string());
    SseEvent {
        event: Some("error".to_string()),
        data: serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string()),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
