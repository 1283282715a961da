//! Source Locator: finds retrievable content for identifiers no catalog maps.
//!
//! Strategies, first success wins:
//! 1. `resource:` marker, packaged registry only, no fallthrough
//! 2. packaged registry lookup of the bare identifier
//! 3. reachability probe of an absolute `http`, `https` or `file` URL
//! 4. reachability probe of the identifier resolved against the base URI
//! 5. file under the base directory, then under the working directory
//!
//! A configured [`ResourceManager`] post-processes whatever was found.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::http_client::AsyncHttpClient;
use crate::resources::{RESOURCE_SCHEME, ResourceManager, ResourceRegistry};
use crate::uri;

/// Lookup seam over the Source Locator
#[async_trait]
pub trait Locate: Send + Sync {
    /// Find content for `identifier`, `Ok(None)` on a miss
    async fn locate(&self, identifier: &str, base: Option<&Url>) -> Result<Option<Url>>;
}

/// Bounds of the remote reachability memo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeCacheConfig {
    pub max_entries: u64,
    pub ttl_seconds: u64,
}

impl Default for ProbeCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl_seconds: 3600,
        }
    }
}

pub struct SourceLocator {
    base_dir: PathBuf,
    registry: Arc<ResourceRegistry>,
    http_client: AsyncHttpClient,
    probe_cache: Cache<String, bool>,
    resource_manager: Option<Arc<dyn ResourceManager>>,
}

impl SourceLocator {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        registry: Arc<ResourceRegistry>,
        http_client: AsyncHttpClient,
        cache_config: &ProbeCacheConfig,
    ) -> Self {
        let probe_cache = Cache::builder()
            .max_capacity(cache_config.max_entries)
            .time_to_live(Duration::from_secs(cache_config.ttl_seconds))
            .build();

        Self {
            base_dir: base_dir.into(),
            registry,
            http_client,
            probe_cache,
            resource_manager: None,
        }
    }

    pub fn with_resource_manager(mut self, manager: Arc<dyn ResourceManager>) -> Self {
        self.resource_manager = Some(manager);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Run the five strategies without resource-manager post-processing
    async fn find(&self, identifier: &str, base: Option<&Url>) -> Result<Option<Url>> {
        if let Some(name) = reserved_resource_name(identifier) {
            let found = self.packaged(name)?;
            debug!(identifier, found = found.is_some(), "reserved resource lookup");
            return Ok(found);
        }

        if let Some(url) = self.packaged(identifier)? {
            debug!(identifier, %url, "packaged resource");
            return Ok(Some(url));
        }

        let escaped = uri::escape_windows_drive_letter(Some(identifier)).unwrap_or_default();
        let absolute = uri::absolute_uri(&escaped);
        if let Some(url) = &absolute
            && self.probe(url).await
        {
            debug!(identifier, %url, "direct URL probe succeeded");
            return Ok(Some(url.clone()));
        }

        if absolute.is_none()
            && let Some(base) = base
            && let Ok(url) = uri::join(base, identifier)
            && self.probe(&url).await
        {
            debug!(identifier, %base, %url, "base-relative probe succeeded");
            return Ok(Some(url));
        }

        if let Some(url) = self.filesystem(identifier).await? {
            debug!(identifier, %url, "filesystem fallback");
            return Ok(Some(url));
        }

        debug!(identifier, "source locator miss");
        Ok(None)
    }

    fn packaged(&self, name: &str) -> Result<Option<Url>> {
        if self.registry.contains(name) {
            Ok(Some(ResourceRegistry::resource_url(name)?))
        } else {
            Ok(None)
        }
    }

    /// Open-then-drop reachability check. Only remote outcomes are memoised.
    async fn probe(&self, url: &Url) -> bool {
        match url.scheme() {
            "file" => match url.to_file_path() {
                Ok(path) => is_readable_file(&path).await,
                Err(_) => false,
            },
            "http" | "https" => {
                let key = url.to_string();
                self.probe_cache
                    .get_with(key, async { self.http_client.probe(url.as_str()).await })
                    .await
            }
            RESOURCE_SCHEME => ResourceRegistry::resource_name(url)
                .is_some_and(|name| self.registry.contains(name)),
            _ => false,
        }
    }

    async fn filesystem(&self, identifier: &str) -> Result<Option<Url>> {
        let relative = Path::new(identifier);
        let mut candidates = vec![self.base_dir.join(relative)];
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(relative));
        }

        for candidate in candidates {
            if is_readable_file(&candidate).await {
                return Ok(Some(uri::file_url(&candidate)?));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Locate for SourceLocator {
    async fn locate(&self, identifier: &str, base: Option<&Url>) -> Result<Option<Url>> {
        let Some(found) = self.find(identifier, base).await? else {
            return Ok(None);
        };

        match &self.resource_manager {
            Some(manager) => {
                let processed = manager.get_resource(&found).await?;
                if processed.is_none() {
                    debug!(identifier, %found, "resource manager rejected location");
                }
                Ok(processed)
            }
            None => Ok(Some(found)),
        }
    }
}

/// Resource name behind the `resource:` marker
fn reserved_resource_name(identifier: &str) -> Option<&str> {
    let prefix = identifier.get(..RESOURCE_SCHEME.len() + 1)?;
    if prefix.eq_ignore_ascii_case("resource:") {
        Some(&identifier[RESOURCE_SCHEME.len() + 1..])
    } else {
        None
    }
}

async fn is_readable_file(path: &Path) -> bool {
    match tokio::fs::File::open(path).await {
        Ok(file) => file.metadata().await.map(|m| m.is_file()).unwrap_or(false),
        Err(_) => false,
    }
}
