//! Remote model provider
//!
//! Fetches a model manifest from a model host, caches it for a TTL and hands
//! out HTTP-backed detector and enlarger implementations.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use crisp_core::EngineError;
use crisp_processing::{Enlarger, ModelProvider, ObjectDetector};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::catalog::ModelId;
use crate::remote_upscale::RemoteEnlarger;
use crate::remote_vision::RemoteVisionDetector;

const DEFAULT_MANIFEST_PATH: &str = "/models/manifest.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteModelConfig {
    pub base_url: String,
    pub manifest_path: String,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
}

impl RemoteModelConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }

    /// Read `CRISP_MODEL_*` variables; `None` when no model host is configured
    pub fn from_env() -> Result<Option<Self>> {
        let base_url = match env::var("CRISP_MODEL_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => return Ok(None),
        };
        let mut config = Self::new(base_url.trim());
        if let Ok(path) = env::var("CRISP_MODEL_MANIFEST_PATH") {
            config.manifest_path = path;
        }
        config.request_timeout = Duration::from_secs(parse_env(
            "CRISP_MODEL_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?);
        config.cache_ttl = Duration::from_secs(parse_env(
            "CRISP_MODEL_CACHE_TTL_SECS",
            DEFAULT_CACHE_TTL_SECS,
        )?);
        Ok(Some(config))
    }

    /// Absolute URL for a manifest path or endpoint
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn parse_env(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number of seconds, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub endpoint: String,
    #[serde(default)]
    pub scale: Option<u32>,
}

/// Models served by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    #[serde(default)]
    pub detector: Option<ManifestEntry>,
    #[serde(default)]
    pub enlargers: Vec<ManifestEntry>,
}

impl ModelManifest {
    /// Ids of every model the manifest references
    pub fn model_ids(&self) -> Vec<&str> {
        self.detector
            .iter()
            .chain(self.enlargers.iter())
            .map(|e| e.id.as_str())
            .collect()
    }

    pub fn enlarger_for(&self, scale: u32) -> Option<&ManifestEntry> {
        self.enlargers.iter().find(|e| e.scale == Some(scale))
    }
}

struct CachedManifest {
    manifest: Arc<ModelManifest>,
    fetched_at: Instant,
}

/// `ModelProvider` backed by a remote model host
#[derive(Clone)]
pub struct RemoteModelProvider {
    http_client: reqwest::Client,
    config: Arc<RemoteModelConfig>,
    cache: Arc<RwLock<Option<CachedManifest>>>,
}

impl RemoteModelProvider {
    pub fn new(config: RemoteModelConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client for model host")?;
        Ok(Self {
            http_client,
            config: Arc::new(config),
            cache: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &RemoteModelConfig {
        &self.config
    }

    /// Cached manifest, refetched once the TTL has passed
    pub async fn manifest(&self) -> Result<Arc<ModelManifest>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.config.cache_ttl {
                    return Ok(cached.manifest.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.config.cache_ttl {
                return Ok(cached.manifest.clone());
            }
        }

        let manifest = Arc::new(self.fetch_manifest().await?);
        *cache = Some(CachedManifest {
            manifest: manifest.clone(),
            fetched_at: Instant::now(),
        });
        Ok(manifest)
    }

    /// Drop the cached manifest
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn fetch_manifest(&self) -> Result<ModelManifest> {
        let url = self.config.resolve(&self.config.manifest_path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch model manifest from {}", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Model manifest request failed: {}", status));
        }

        let mut manifest: ModelManifest = response
            .json()
            .await
            .context("Failed to parse model manifest")?;

        if let Some(entry) = &manifest.detector {
            if let Err(e) = ModelId::parse(&entry.id) {
                tracing::warn!(id = %entry.id, error = %e, "Ignoring detector with malformed id");
                manifest.detector = None;
            }
        }
        manifest.enlargers.retain(|entry| match ModelId::parse(&entry.id) {
            Ok(_) if entry.scale.is_some() => true,
            Ok(_) => {
                tracing::warn!(id = %entry.id, "Ignoring enlarger without a scale");
                false
            }
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "Ignoring enlarger with malformed id");
                false
            }
        });

        tracing::info!(
            detector = manifest.detector.is_some(),
            enlargers = manifest.enlargers.len(),
            "Model manifest fetched"
        );
        Ok(manifest)
    }
}

fn unavailable(e: anyhow::Error) -> EngineError {
    EngineError::ModelUnavailable(format!("{:#}", e))
}

#[async_trait]
impl ModelProvider for RemoteModelProvider {
    async fn load_detector(&self) -> Result<Arc<dyn ObjectDetector>, EngineError> {
        let manifest = self.manifest().await.map_err(unavailable)?;
        let entry = manifest.detector.as_ref().ok_or_else(|| {
            EngineError::ModelUnavailable("model host serves no detector".to_string())
        })?;
        Ok(Arc::new(RemoteVisionDetector::new(
            self.http_client.clone(),
            self.config.resolve(&entry.endpoint),
            entry.id.clone(),
        )))
    }

    async fn load_enlarger(&self, scale: u32) -> Result<Arc<dyn Enlarger>, EngineError> {
        let manifest = self.manifest().await.map_err(unavailable)?;
        let entry = manifest.enlarger_for(scale).ok_or_else(|| {
            EngineError::ModelUnavailable(format!("model host serves no x{} enlarger", scale))
        })?;
        Ok(Arc::new(RemoteEnlarger::new(
            self.http_client.clone(),
            self.config.resolve(&entry.endpoint),
            entry.id.clone(),
            scale,
        )))
    }
}
