use crate::auth::{request_identifier, CredentialCache, UserInfo};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::logging::SharedLogger;
use crate::models::ModelCatalog;
use crate::relay::{self, RelayRequest};
use crate::translate::openai_types::{
    ChatCompletionRequest, ErrorEnvelope, ModelEntry, ModelsResponse,
};
use crate::translate::request::to_upstream_request;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub client: reqwest::Client,
    pub credentials: Arc<CredentialCache>,
    pub catalog: Arc<ModelCatalog>,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {e}"));
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                format!("Invalid request body: {e}"),
            );
        }
    };

    state.logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={}",
            req.model,
            req.stream,
            req.messages.len()
        ),
    );

    let user = match authenticate(&headers) {
        Ok(u) => u,
        Err(e) => {
            state.logger.warn("server", format!("Auth rejected: {e}"));
            return error_response(StatusCode::UNAUTHORIZED, e.error_type(), e.to_string());
        }
    };

    let access_token = match state.credentials.access_token(&user.rt, false).await {
        Ok(t) => t,
        Err(e) => {
            state
                .logger
                .error("server", format!("Token exchange failed: {e}"));
            return error_response(StatusCode::UNAUTHORIZED, e.error_type(), e.to_string());
        }
    };

    let model = match state.catalog.resolve(&access_token, &req.model).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                format!("Model '{}' not found", req.model),
            );
        }
        Err(e) => {
            state
                .logger
                .error("server", format!("Model lookup failed: {e}"));
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.error_type(),
                e.to_string(),
            );
        }
    };

    let upstream_body = to_upstream_request(&req, &model.id, &state.config.upstream.timezone);
    let relay_req = RelayRequest {
        body: upstream_body,
        model: req.model.clone(),
        access_token,
        refresh_token: user.rt.clone(),
        identifier: request_identifier(),
    };

    if req.stream {
        handle_streaming(state, relay_req)
    } else {
        handle_non_streaming(state, &relay_req).await
    }
}

async fn handle_non_streaming(state: Arc<AppState>, req: &RelayRequest) -> Response {
    match relay::relay_non_streaming(
        req,
        &state.config,
        &state.client,
        &state.credentials,
        &state.logger,
    )
    .await
    {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => {
            state.logger.error("server", format!("Relay error: {e}"));
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.error_type(),
                e.to_string(),
            )
        }
    }
}

fn handle_streaming(state: Arc<AppState>, req: RelayRequest) -> Response {
    let sse_stream = relay::relay_streaming(
        req,
        state.config.clone(),
        state.client.clone(),
        Arc::clone(&state.credentials),
        state.logger.clone(),
    );

    let event_stream = sse_stream.map(|result| -> std::result::Result<Event, Infallible> {
        match result {
            Ok(sse_event) => {
                let mut event = Event::default().data(sse_event.data);
                if let Some(name) = sse_event.event {
                    event = event.event(name);
                }
                Ok(event)
            }
            Err(_) => Ok(Event::default().event("error").data("{}")),
        }
    });

    Sse::new(event_stream)
        .keep_alive(axum::response::sse::KeepAlive::default())
        .into_response()
}

async fn handle_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let user = match authenticate(&headers) {
        Ok(u) => u,
        Err(e) => {
            return error_response(StatusCode::UNAUTHORIZED, e.error_type(), e.to_string());
        }
    };

    let access_token = match state.credentials.access_token(&user.rt, false).await {
        Ok(t) => t,
        Err(e) => {
            return error_response(StatusCode::UNAUTHORIZED, e.error_type(), e.to_string());
        }
    };

    match state.catalog.all(&access_token).await {
        Ok(models) => {
            let created = chrono::Utc::now().timestamp();
            let data = models
                .into_iter()
                .map(|m| ModelEntry {
                    id: m.name,
                    object: "model".to_string(),
                    created,
                    owned_by: m.provider,
                })
                .collect();
            Json(ModelsResponse {
                object: "list".to_string(),
                data,
            })
            .into_response()
        }
        Err(e) => {
            state
                .logger
                .error("server", format!("Model listing failed: {e}"));
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.error_type(),
                e.to_string(),
            )
        }
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

fn authenticate(headers: &HeaderMap) -> crate::error::Result<UserInfo> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| RelayError::auth("Missing bearer token"))?;

    UserInfo::from_bearer(bearer)
}

fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    (status, Json(ErrorEnvelope::new(error_type, message))).into_response()
}
