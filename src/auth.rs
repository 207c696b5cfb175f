//! Client identity extraction and the upstream credential provider.
//!
//! Clients authenticate with a bearer token that is either a
//! base64-encoded JSON object or a JWT whose payload carries the same
//! fields: the upstream refresh token (`rt`), the user id, and the
//! client UUID. The refresh token is exchanged for a short-lived access
//! token via the upstream refresh endpoint; [`CredentialCache`] keeps
//! one access token per refresh token and re-exchanges early.

use crate::config::{RelayConfig, UpstreamConfig};
use crate::error::{RelayError, Result};
use crate::translate::upstream_types::RefreshResponse;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Seconds an access token is considered expired ahead of its real expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct UserInfo {
    pub rt: String,
    pub user_id: String,
    pub client_uuid: String,
}

#[derive(Debug, Deserialize)]
struct RawUserInfo {
    rt: Option<String>,
    user_id: Option<String>,
    client_uuid: Option<String>,
}

impl UserInfo {
    /// Parse a client bearer token, accepting either encoding.
    pub fn from_bearer(token: &str) -> Result<Self> {
        let raw = parse_api_key(token)
            .or_else(|| parse_jwt_payload(token))
            .ok_or_else(|| RelayError::auth("Invalid authorization token format"))?;

        match (raw.rt, raw.user_id, raw.client_uuid) {
            (Some(rt), Some(user_id), Some(client_uuid)) => Ok(Self {
                rt,
                user_id,
                client_uuid,
            }),
            _ => Err(RelayError::auth(
                "Invalid authorization token - missing required fields",
            )),
        }
    }
}

fn parse_api_key(token: &str) -> Option<RawUserInfo> {
    let decoded = STANDARD.decode(token).ok()?;
    serde_json::from_slice(&decoded).ok()
}

fn parse_jwt_payload(token: &str) -> Option<RawUserInfo> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    // JWTs drop the base64 padding; restore it before decoding
    let mut payload = parts[1].to_string();
    let rem = payload.len() % 4;
    if rem != 0 {
        payload.push_str(&"=".repeat(4 - rem));
    }

    let decoded = URL_SAFE.decode(payload).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// An opaque per-request client identifier for the upstream. The real
/// obfuscation scheme lives outside this core; the upstream only needs
/// the value to be present and unique per request.
#[must_use]
pub fn request_identifier() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Attach the header set every upstream call carries.
pub fn apply_upstream_headers(
    builder: reqwest::RequestBuilder,
    upstream: &UpstreamConfig,
    access_token: &str,
    identifier: &str,
) -> reqwest::RequestBuilder {
    builder
        .header("Authorization", format!("Bearer {access_token}"))
        .header("Content-Type", "application/json")
        .header("User-Agent", &upstream.user_agent)
        .header(&upstream.identifier_header, identifier)
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Refresh-token -> access-token exchange with an in-process cache.
/// Safe for concurrent independent calls from different client requests.
pub struct CredentialCache {
    base_url: String,
    user_agent: String,
    client: reqwest::Client,
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl CredentialCache {
    #[must_use]
    pub fn new(config: &RelayConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            user_agent: config.upstream.user_agent.clone(),
            client,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Return a valid access token for `rt`, exchanging when the cache
    /// is cold, stale, or `force` is set (the 401 recovery path).
    pub async fn access_token(&self, rt: &str, force: bool) -> Result<String> {
        if !force {
            let tokens = self.tokens.lock().await;
            if let Some(cached) = tokens.get(rt) {
                if chrono::Utc::now().timestamp() < cached.expires_at {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        self.refresh(rt).await
    }

    async fn refresh(&self, rt: &str) -> Result<String> {
        let url = format!("{}/api/v1/auth/refresh", self.base_url);
        tracing::debug!("Refreshing upstream access token");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("User-Agent", &self.user_agent)
            .json(&serde_json::json!({ "refreshToken": rt }))
            .send()
            .await
            .map_err(|e| RelayError::auth(format!("Token refresh request failed: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::auth(format!(
                "Token refresh returned status {status}: {body}"
            )));
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RelayError::auth(format!("Failed to parse refresh response: {e}")))?;

        let data = match parsed {
            RefreshResponse {
                success: true,
                data: Some(data),
            } => data,
            _ => return Err(RelayError::auth("Token refresh was not successful")),
        };

        let expires_at = chrono::Utc::now().timestamp() + data.expires_in - EXPIRY_MARGIN_SECS;
        self.tokens.lock().await.insert(
            rt.to_string(),
            CachedToken {
                access_token: data.access_token.clone(),
                expires_at,
            },
        );

        Ok(data.access_token)
    }
}
