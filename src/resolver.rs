//! The resolver: catalog first, then policy, then the source locator.
//!
//! One [`Resolver`] serves three roles through [`EntityResolver`], [`UriResolver`] and
//! [`ResourceResolver`]. Clones share the loaded catalogs and the locator; each clone
//! carries its own [`UnitOptions`], so units with different policies never step on each
//! other.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::catalog::{CatalogLoader, CatalogLocation, CatalogStore};
use crate::error::{ResolverError, Result};
use crate::http_client::{AsyncHttpClient, HttpClientConfig};
use crate::locator::{Locate, ProbeCacheConfig, SourceLocator};
use crate::policy::ResolutionPolicy;
use crate::resources::{ResourceManager, ResourceRegistry};
use crate::source::{
    DocumentSource, ParseOptions, ResolutionRequest, ResolvedSource, ResourceInput, SourceOpener,
};
use crate::uri;

/// Entity resolution during parsing (DTDs, external entities)
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// `Ok(None)` means "let the parser apply its default handling"
    async fn resolve_entity(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Option<ResolvedSource>>;
}

/// Document resolution for stylesheet includes/imports and XInclude
#[async_trait]
pub trait UriResolver: Send + Sync {
    async fn resolve(&self, href: &str, base: Option<&str>) -> Result<Option<DocumentSource>>;
}

/// Imported schema documents during schema loading and validation
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn resolve_resource(&self, request: &ResolutionRequest) -> Result<Option<ResourceInput>>;
}

/// Settings of one validation or transformation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitOptions {
    pub policy: ResolutionPolicy,
    pub validating: bool,
    pub xinclude_aware: bool,
}

impl UnitOptions {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            namespace_aware: true,
            validating: self.validating,
            xinclude_aware: self.xinclude_aware,
        }
    }
}

struct Shared {
    catalogs: CatalogStore,
    locator: Arc<dyn Locate>,
    opener: SourceOpener,
}

/// Per-unit resolver view over shared, immutable catalog and locator state
#[derive(Clone)]
pub struct Resolver {
    shared: Arc<Shared>,
    options: UnitOptions,
}

impl Resolver {
    pub fn builder(base_dir: impl Into<PathBuf>) -> ResolverBuilder {
        ResolverBuilder::new(base_dir)
    }

    /// Assemble a resolver from already constructed parts
    pub fn from_parts(
        catalogs: CatalogStore,
        locator: Arc<dyn Locate>,
        opener: SourceOpener,
        options: UnitOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalogs,
                locator,
                opener,
            }),
            options,
        }
    }

    /// New view sharing this resolver's catalogs and locator. `self` is unchanged.
    pub fn with_options(&self, options: UnitOptions) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            options,
        }
    }

    pub fn options(&self) -> &UnitOptions {
        &self.options
    }

    pub fn catalogs(&self) -> &CatalogStore {
        &self.shared.catalogs
    }

    /// Schema lookup by public/system ID for a validation unit. Uncataloged system IDs
    /// reach the locator only when the unit's policy permits them.
    pub async fn resolve_schema(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Option<ResolvedSource>> {
        if let Some(target) = self.shared.catalogs.resolve_entity(public_id, system_id) {
            debug!(?public_id, ?system_id, %target, "schema resolved by catalog");
            return self.open_target(&target, public_id).await.map(Some);
        }

        let Some(system_id) = system_id else {
            return Ok(None);
        };
        if !self.options.policy.permits(system_id) {
            debug!(system_id, policy = %self.options.policy, "schema rejected by policy");
            return Ok(None);
        }

        match self.shared.locator.locate(system_id, None).await? {
            Some(url) => self.open_located(&url, public_id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn open_target(&self, target: &str, public_id: Option<&str>) -> Result<ResolvedSource> {
        let url = Url::parse(target).map_err(|e| ResolverError::InvalidUri {
            uri: target.to_string(),
            details: e.to_string(),
        })?;
        self.open_located(&url, public_id).await
    }

    async fn open_located(&self, url: &Url, public_id: Option<&str>) -> Result<ResolvedSource> {
        let source = self.shared.opener.open(url).await?;
        Ok(source.with_public_id(public_id.map(str::to_string)))
    }

    /// Identifier the policy judges for a resource request: relative system IDs are
    /// judged after resolution against the base.
    fn policy_subject(system_id: &str, base: Option<&Url>) -> String {
        match base {
            Some(base) if uri::absolute_uri(system_id).is_none() => uri::join(base, system_id)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| system_id.to_string()),
            _ => system_id.to_string(),
        }
    }
}

#[async_trait]
impl EntityResolver for Resolver {
    async fn resolve_entity(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Option<ResolvedSource>> {
        if let Some(target) = self.shared.catalogs.resolve_entity(public_id, system_id) {
            debug!(?public_id, ?system_id, %target, "entity resolved by catalog");
            return self.open_target(&target, public_id).await.map(Some);
        }

        let Some(system_id) = system_id else {
            return Ok(None);
        };
        match self.shared.locator.locate(system_id, None).await? {
            Some(url) => {
                debug!(system_id, %url, "entity resolved by locator");
                self.open_located(&url, public_id).await.map(Some)
            }
            None => {
                debug!(?public_id, system_id, "entity not found");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl UriResolver for Resolver {
    async fn resolve(&self, href: &str, base: Option<&str>) -> Result<Option<DocumentSource>> {
        let base = base.map(uri::parse_base_uri).transpose()?;

        let located = match self.shared.catalogs.resolve_uri(href, base.as_ref()) {
            Some(target) => {
                debug!(href, %target, "document resolved by catalog");
                let target = Url::parse(&target).map_err(|e| ResolverError::InvalidUri {
                    uri: target.clone(),
                    details: e.to_string(),
                })?;
                if self.options.xinclude_aware {
                    // XInclude needs a concrete fetchable URL
                    let relocated = self
                        .shared
                        .locator
                        .locate(target.as_str(), base.as_ref())
                        .await?;
                    Some(relocated.unwrap_or(target))
                } else {
                    Some(target)
                }
            }
            None => self.shared.locator.locate(href, base.as_ref()).await?,
        };

        let Some(url) = located else {
            debug!(href, "document not found");
            return Ok(None);
        };

        let source = self.shared.opener.open(&url).await?;
        Ok(Some(DocumentSource {
            source,
            options: self.options.parse_options(),
            entity_resolver: Arc::new(self.clone()),
        }))
    }
}

#[async_trait]
impl ResourceResolver for Resolver {
    async fn resolve_resource(&self, request: &ResolutionRequest) -> Result<Option<ResourceInput>> {
        let public_id = request.public_id.as_deref();
        let system_id = request.system_id.as_deref();
        let base = request
            .base_uri
            .as_deref()
            .map(uri::parse_base_uri)
            .transpose()?;

        let mut target = self.shared.catalogs.resolve_entity(public_id, system_id);
        if target.is_none()
            && let Some(namespace_uri) = request.namespace_uri.as_deref()
        {
            target = self.shared.catalogs.resolve_namespace(namespace_uri, system_id);
        }

        let source = match target {
            Some(target) => {
                debug!(?public_id, ?system_id, namespace = ?request.namespace_uri, %target, "resource resolved by catalog");
                self.open_target(&target, public_id).await?
            }
            None => {
                let Some(system_id) = system_id else {
                    return Ok(None);
                };
                let subject = Self::policy_subject(system_id, base.as_ref());
                if !self.options.policy.permits(&subject) {
                    debug!(system_id, policy = %self.options.policy, "resource rejected by policy");
                    return Ok(None);
                }
                match self.shared.locator.locate(system_id, base.as_ref()).await? {
                    Some(url) => self.open_located(&url, public_id).await?,
                    None => {
                        debug!(system_id, "resource not found");
                        return Ok(None);
                    }
                }
            }
        };

        Ok(Some(ResourceInput::from_source(source, request.base_uri.clone())))
    }
}

enum PendingCatalog {
    Spec(String),
    Location(CatalogLocation),
}

/// Builds a [`Resolver`]; catalogs are loaded eagerly by [`ResolverBuilder::build`].
pub struct ResolverBuilder {
    base_dir: PathBuf,
    catalogs: Vec<PendingCatalog>,
    registry: ResourceRegistry,
    resource_manager: Option<Arc<dyn ResourceManager>>,
    http_config: HttpClientConfig,
    probe_cache: ProbeCacheConfig,
    options: UnitOptions,
}

impl ResolverBuilder {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            catalogs: Vec::new(),
            registry: ResourceRegistry::builtin(),
            resource_manager: None,
            http_config: HttpClientConfig::default(),
            probe_cache: ProbeCacheConfig::default(),
            options: UnitOptions::default(),
        }
    }

    /// Add a catalog given as configured: URL, packaged resource name or file path
    pub fn catalog(mut self, spec: impl Into<String>) -> Self {
        self.catalogs.push(PendingCatalog::Spec(spec.into()));
        self
    }

    pub fn catalogs<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalogs
            .extend(specs.into_iter().map(|spec| PendingCatalog::Spec(spec.into())));
        self
    }

    pub fn catalog_location(mut self, location: CatalogLocation) -> Self {
        self.catalogs.push(PendingCatalog::Location(location));
        self
    }

    pub fn registry(mut self, registry: ResourceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn resource_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.registry = self.registry.with_root(root);
        self
    }

    pub fn resource_manager(mut self, manager: Arc<dyn ResourceManager>) -> Self {
        self.resource_manager = Some(manager);
        self
    }

    pub fn http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    pub fn probe_cache(mut self, config: ProbeCacheConfig) -> Self {
        self.probe_cache = config;
        self
    }

    pub fn options(mut self, options: UnitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn policy(mut self, policy: ResolutionPolicy) -> Self {
        self.options.policy = policy;
        self
    }

    /// Load every catalog and assemble the resolver. Any catalog failure is fatal.
    pub async fn build(self) -> Result<Resolver> {
        let registry = Arc::new(self.registry);
        let http_client = AsyncHttpClient::new(self.http_config)?;

        let mut locations = Vec::with_capacity(self.catalogs.len());
        for pending in self.catalogs {
            let location = match pending {
                PendingCatalog::Spec(spec) => {
                    CatalogLocation::locate(&spec, &self.base_dir, &registry)?
                }
                PendingCatalog::Location(location) => location,
            };
            locations.push(location);
        }

        let loader = CatalogLoader::new(http_client.clone(), Arc::clone(&registry));
        let catalogs = CatalogStore::load(&locations, &loader).await?;
        info!(
            catalogs = catalogs.len(),
            base_dir = %self.base_dir.display(),
            "resolver ready"
        );

        let mut locator = SourceLocator::new(
            self.base_dir,
            Arc::clone(&registry),
            http_client.clone(),
            &self.probe_cache,
        );
        if let Some(manager) = self.resource_manager {
            locator = locator.with_resource_manager(manager);
        }
        let opener = SourceOpener::new(http_client, registry);

        Ok(Resolver::from_parts(
            catalogs,
            Arc::new(locator),
            opener,
            self.options,
        ))
    }
}
