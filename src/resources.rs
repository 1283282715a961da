//! Packaged resources and the search-path resource manager.
//!
//! The [`ResourceRegistry`] holds the resources shipped with the tool itself (compiled-in
//! defaults plus optional resource root directories). The [`ResourceManager`] trait lets the
//! surrounding build tool post-process every location the source locator finds.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::error::{ResolverError, Result};

/// Scheme used for packaged resources, both as the reserved marker and as the system ID
/// of a located packaged resource.
pub const RESOURCE_SCHEME: &str = "resource";

/// W3C schema for the `xml:` namespace attributes
pub const BUILTIN_XML_XSD: &[u8] = include_bytes!("../resources/xml.xsd");

/// Registry of packaged resources, the analogue of a plugin classpath.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    embedded: HashMap<String, Arc<Vec<u8>>>,
    roots: Vec<PathBuf>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the compiled-in defaults
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert("xml.xsd", BUILTIN_XML_XSD);
        registry
    }

    /// Add a directory searched after the embedded resources
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn insert(&mut self, name: impl AsRef<str>, data: impl Into<Vec<u8>>) {
        self.embedded
            .insert(normalize(name.as_ref()).to_string(), Arc::new(data.into()));
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check whether a resource exists, embedded or under one of the roots
    pub fn contains(&self, name: &str) -> bool {
        let name = normalize(name);
        if name.is_empty() {
            return false;
        }
        self.embedded.contains_key(name) || self.find_in_roots(name).is_some()
    }

    /// System ID reported for a packaged resource
    pub fn resource_url(name: &str) -> Result<Url> {
        let uri = format!("{}:{}", RESOURCE_SCHEME, normalize(name));
        Url::parse(&uri).map_err(|e| ResolverError::InvalidUri {
            uri,
            details: e.to_string(),
        })
    }

    /// Extract the resource name from a `resource:` URL
    pub fn resource_name(url: &Url) -> Option<&str> {
        (url.scheme() == RESOURCE_SCHEME).then(|| normalize(url.path()))
    }

    /// Read a resource, `Ok(None)` when it does not exist
    pub async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let name = normalize(name);
        if let Some(data) = self.embedded.get(name) {
            return Ok(Some(data.as_ref().clone()));
        }
        match self.find_in_roots(name) {
            Some(path) => Ok(Some(tokio::fs::read(path).await?)),
            None => Ok(None),
        }
    }

    fn find_in_roots(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        // Resource names never climb out of their root
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        self.roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.is_file())
    }
}

fn normalize(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// Build-tool hook that may substitute or veto a location found by the source locator.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Return the location to use for `location`, or `None` if the resource is unknown.
    async fn get_resource(&self, location: &Url) -> Result<Option<Url>>;
}

/// A single search-path entry of a [`SearchPathResourceManager`]
#[derive(Debug, Clone)]
pub enum ResourceLoader {
    /// Packaged resources (`resource:` locations)
    Packaged(Arc<ResourceRegistry>),
    /// Regular files, optionally restricted to a directory tree
    FileSystem { root: Option<PathBuf> },
    /// Remote locations, optionally restricted to a URL prefix
    Remote { prefix: Option<Url> },
}

impl ResourceLoader {
    async fn load(&self, location: &Url) -> Option<Url> {
        match self {
            ResourceLoader::Packaged(registry) => ResourceRegistry::resource_name(location)
                .filter(|name| registry.contains(name))
                .map(|_| location.clone()),
            ResourceLoader::FileSystem { root } => {
                if location.scheme() != "file" {
                    return None;
                }
                let path = location.to_file_path().ok()?;
                if let Some(root) = root
                    && !path.starts_with(root)
                {
                    return None;
                }
                let metadata = tokio::fs::metadata(&path).await.ok()?;
                metadata.is_file().then(|| location.clone())
            }
            ResourceLoader::Remote { prefix } => {
                if !matches!(location.scheme(), "http" | "https") {
                    return None;
                }
                match prefix {
                    Some(prefix) if !location.as_str().starts_with(prefix.as_str()) => None,
                    _ => Some(location.clone()),
                }
            }
        }
    }
}

/// Resource manager that asks its loaders in order; the first loader that knows the
/// location wins.
#[derive(Debug, Clone, Default)]
pub struct SearchPathResourceManager {
    loaders: Vec<ResourceLoader>,
}

impl SearchPathResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packaged resources, any regular file, any remote location
    pub fn standard(registry: Arc<ResourceRegistry>) -> Self {
        Self::new()
            .with_loader(ResourceLoader::Packaged(registry))
            .with_loader(ResourceLoader::FileSystem { root: None })
            .with_loader(ResourceLoader::Remote { prefix: None })
    }

    pub fn with_loader(mut self, loader: ResourceLoader) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn loaders(&self) -> &[ResourceLoader] {
        &self.loaders
    }
}

#[async_trait]
impl ResourceManager for SearchPathResourceManager {
    async fn get_resource(&self, location: &Url) -> Result<Option<Url>> {
        for loader in &self.loaders {
            if let Some(found) = loader.load(location).await {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}
