//! Crypto Fear & Greed index with an explicit, caller-owned cache

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use tracing::{debug, instrument, warn};

use crate::common::errors::{DcaError, Result};

/// Reading used when no value has ever been fetched
pub const NEUTRAL_VALUE: u8 = 50;

/// One Fear & Greed reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FearGreedReading {
    /// 0 (extreme fear) to 100 (extreme greed)
    pub value: u8,
    pub label: String,
    pub fetched_at: DateTime<Utc>,
}

impl FearGreedReading {
    pub fn new(value: u8, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            label: fear_greed_label(value).to_string(),
            fetched_at,
        }
    }

    pub fn neutral(now: DateTime<Utc>) -> Self {
        Self::new(NEUTRAL_VALUE, now)
    }
}

/// Human label for an index value
pub fn fear_greed_label(value: u8) -> &'static str {
    match value {
        0..=24 => "Extreme Fear",
        25..=44 => "Fear",
        45..=54 => "Neutral",
        55..=74 => "Greed",
        _ => "Extreme Greed",
    }
}

/// A cached reading is fresh while it is younger than `ttl`
pub fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    fetched_at <= now && now - fetched_at < ttl
}

/// Last known reading, owned by whoever runs cycles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FearGreedCache {
    pub reading: Option<FearGreedReading>,
}

impl FearGreedCache {
    /// Return a fresh cached reading or fetch a new one
    ///
    /// On fetch failure the stale cached reading is used, and with nothing
    /// cached the neutral reading. Only successful fetches are cached.
    pub async fn resolve<F, Fut>(&mut self, now: DateTime<Utc>, ttl: Duration, fetch: F) -> FearGreedReading
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FearGreedReading>>,
    {
        if let Some(reading) = &self.reading {
            if is_fresh(reading.fetched_at, now, ttl) {
                debug!("Using cached Fear & Greed reading {}", reading.value);
                return reading.clone();
            }
        }

        match fetch().await {
            Ok(reading) => {
                self.reading = Some(reading.clone());
                reading
            }
            Err(e) => match &self.reading {
                Some(stale) => {
                    warn!("Fear & Greed fetch failed ({}), using stale value {}", e, stale.value);
                    stale.clone()
                }
                None => {
                    warn!("Fear & Greed fetch failed ({}), using neutral value", e);
                    FearGreedReading::neutral(now)
                }
            },
        }
    }

    /// Load a persisted cache; a missing or unreadable file yields an empty cache
    pub async fn load(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable sentiment cache {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FngResponse {
    data: Vec<FngEntry>,
}

#[derive(Debug, Deserialize)]
struct FngEntry {
    value: String,
    #[serde(default)]
    timestamp: Option<String>,
}

/// HTTP client for the alternative.me index
#[derive(Debug, Clone)]
pub struct FearGreedClient {
    client: Client,
    url: String,
}

impl FearGreedClient {
    pub fn new(url: &str, timeout: std::time::Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DcaError::Internal(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Fetch the latest reading
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<FearGreedReading> {
        let response = self.client.get(&self.url).query(&[("limit", "1")]).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DcaError::InvalidResponse(format!(
                "Fear & Greed API returned status {}: {}",
                status, body
            )));
        }

        let parsed: FngResponse = response.json().await?;
        let entry = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| DcaError::InvalidResponse("Fear & Greed response has no data".into()))?;
        let value: u8 = entry
            .value
            .parse()
            .map_err(|e| DcaError::InvalidResponse(format!("Invalid index value: {}", e)))?;
        let fetched_at = entry
            .timestamp
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(FearGreedReading::new(value.min(100), fetched_at))
    }
}
