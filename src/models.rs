//! Upstream model catalog.
//!
//! The upstream addresses models by internal id while clients use the
//! display name, so the catalog maps one to the other. Fetched once and
//! cached in-process; every handler shares the same catalog.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::translate::upstream_types::ModelsEnvelope;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub is_free: bool,
}

pub struct ModelCatalog {
    base_url: String,
    user_agent: String,
    client: reqwest::Client,
    cache: RwLock<HashMap<String, ModelInfo>>,
}

impl ModelCatalog {
    #[must_use]
    pub fn new(config: &RelayConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            user_agent: config.upstream.user_agent.clone(),
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a client-facing model name to its upstream record.
    pub async fn resolve(&self, access_token: &str, name: &str) -> Result<Option<ModelInfo>> {
        {
            let cache = self.cache.read().await;
            if !cache.is_empty() {
                return Ok(cache.get(name).cloned());
            }
        }

        let models = self.fetch(access_token).await?;
        Ok(models.into_iter().find(|m| m.name == name))
    }

    /// All known models, fetching on a cold cache.
    pub async fn all(&self, access_token: &str) -> Result<Vec<ModelInfo>> {
        {
            let cache = self.cache.read().await;
            if !cache.is_empty() {
                return Ok(cache.values().cloned().collect());
            }
        }

        self.fetch(access_token).await
    }

    async fn fetch(&self, access_token: &str) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/v1/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {access_token}"))
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| RelayError::network(format!("Failed to fetch models: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::UpstreamStatus { status, body });
        }

        let envelope: ModelsEnvelope = response
            .json()
            .await
            .map_err(|e| RelayError::network(format!("Failed to parse models response: {e}")))?;

        if !envelope.success {
            return Err(RelayError::other("Model listing was not successful"));
        }

        let models: Vec<ModelInfo> = envelope
            .data
            .into_iter()
            .map(|m| ModelInfo {
                is_free: m.pricing.map(|p| p.is_free).unwrap_or(false),
                id: m.id,
                name: m.name,
                provider: m.provider,
            })
            .collect();

        let mut cache = self.cache.write().await;
        cache.clear();
        for model in &models {
            cache.insert(model.name.clone(), model.clone());
        }

        Ok(models)
    }
}
