//! Place directory client
//!
//! The places subsystem owns the resort's place/restaurant directory; this
//! service only needs id, name and coordinates to label check-ins. Lookups
//! go through the cache layer, and a directory outage is never fatal:
//! failed lookups degrade to `None` and check-ins fall back to the
//! client-supplied place name.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheLayer};
use crate::config::PlacesConfig;

/// A place as served by the places subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// Place lookup interface
#[async_trait]
pub trait PlaceDirectory: Send + Sync {
    /// Look up a place by id
    ///
    /// `Ok(None)` covers both "no such place" and "directory unavailable";
    /// callers fall back to client-supplied data either way.
    async fn get_place(&self, id: i64) -> Result<Option<Place>>;
}

/// Directory used when no places base URL is configured
pub struct NullPlaceDirectory;

#[async_trait]
impl PlaceDirectory for NullPlaceDirectory {
    async fn get_place(&self, _id: i64) -> Result<Option<Place>> {
        Ok(None)
    }
}

/// How long a resolved place stays cached
const PLACE_CACHE_TTL: Duration = Duration::from_secs(600);

/// HTTP client for the places subsystem, with cached responses
pub struct HttpPlaceDirectory {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<Cache>,
}

impl HttpPlaceDirectory {
    /// Create a directory client from configuration
    ///
    /// Returns an error only when the HTTP client itself cannot be built;
    /// the remote being down is handled per-lookup.
    pub fn new(base_url: &str, config: &PlacesConfig, cache: Arc<Cache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client for place directory")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    fn cache_key(id: i64) -> String {
        format!("place:{}", id)
    }

    async fn fetch(&self, id: i64) -> Result<Option<Place>> {
        let url = format!("{}/api/v1/places/{}", self.base_url, id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Place directory request failed: {}", url))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Place directory returned {} for {}", response.status(), url);
        }

        let place = response
            .json::<Place>()
            .await
            .context("Failed to parse place directory response")?;
        Ok(Some(place))
    }
}

#[async_trait]
impl PlaceDirectory for HttpPlaceDirectory {
    async fn get_place(&self, id: i64) -> Result<Option<Place>> {
        let key = Self::cache_key(id);

        if let Some(place) = self.cache.get::<Place>(&key).await.unwrap_or(None) {
            return Ok(Some(place));
        }

        match self.fetch(id).await {
            Ok(Some(place)) => {
                if let Err(e) = self.cache.set(&key, &place, PLACE_CACHE_TTL).await {
                    tracing::debug!("Failed to cache place {}: {}", id, e);
                }
                Ok(Some(place))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                // Directory outages degrade to "unknown place".
                tracing::warn!("Place lookup {} failed: {}", id, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn null_directory_finds_nothing() {
        let directory = NullPlaceDirectory;
        assert!(directory.get_place(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn http_directory_tolerates_unreachable_remote() {
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let config = PlacesConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            timeout_seconds: 1,
        };
        let directory = HttpPlaceDirectory::new("http://127.0.0.1:1", &config, cache).unwrap();

        // Nothing is listening on port 1; the lookup degrades to None.
        assert!(directory.get_place(42).await.unwrap().is_none());
    }

    #[test]
    fn cache_keys_are_per_place() {
        assert_eq!(HttpPlaceDirectory::cache_key(7), "place:7");
        assert_ne!(HttpPlaceDirectory::cache_key(7), HttpPlaceDirectory::cache_key(8));
    }
}
