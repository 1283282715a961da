//! Catalog Store: OASIS XML Catalogs loaded once per resolver and queried read-only.
//!
//! Catalogs are parsed with `roxmltree`. Every catalog referenced through `nextCatalog` or
//! one of the `delegate*` entries is loaded eagerly, so a broken reference fails resolver
//! construction instead of a later lookup.

use futures::future::{BoxFuture, FutureExt};
use roxmltree::{Document, Node, ParsingOptions};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CatalogError, CatalogResult};
use crate::http_client::AsyncHttpClient;
use crate::resources::{RESOURCE_SCHEME, ResourceRegistry};
use crate::uri;

/// Namespace of OASIS XML Catalog documents
pub const CATALOG_NAMESPACE: &str = "urn:oasis:names:tc:entity:xmlns:xml:catalog";

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

const PUBLICID_URN_PREFIX: &str = "urn:publicid:";

/// Maximum depth of `nextCatalog`/`delegate*` chains
pub const MAX_CATALOG_DEPTH: usize = 10;

/// Whether `public` entries apply when a system identifier is also supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prefer {
    #[default]
    Public,
    System,
}

impl Prefer {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "public" => Some(Prefer::Public),
            "system" => Some(Prefer::System),
            _ => None,
        }
    }
}

/// Where a catalog document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    File(PathBuf),
    Url(Url),
    Resource(String),
}

impl CatalogLocation {
    /// Turn a configured catalog string into a location.
    ///
    /// Tried in order: absolute URL, packaged resource, file (absolute or relative to
    /// `base_dir`). Anything else is a fatal "catalog not found".
    pub fn locate(
        spec: &str,
        base_dir: &Path,
        registry: &ResourceRegistry,
    ) -> CatalogResult<Self> {
        if let Some(url) = uri::absolute_uri(spec) {
            match url.scheme() {
                "http" | "https" | "file" => return Ok(CatalogLocation::Url(url)),
                RESOURCE_SCHEME => {
                    if let Some(name) = ResourceRegistry::resource_name(&url) {
                        return Ok(CatalogLocation::Resource(name.to_string()));
                    }
                }
                _ => {}
            }
        }

        if registry.contains(spec) {
            return Ok(CatalogLocation::Resource(spec.to_string()));
        }

        let path = Path::new(spec);
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        };
        if candidate.is_file() {
            return Ok(CatalogLocation::File(candidate));
        }

        Err(CatalogError::NotFound {
            spec: spec.to_string(),
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// URL used as the default base of the catalog's entries
    pub fn to_url(&self) -> CatalogResult<Url> {
        match self {
            CatalogLocation::File(path) => {
                uri::file_url(path).map_err(|e| CatalogError::Fetch {
                    location: path.display().to_string(),
                    details: e.to_string(),
                })
            }
            CatalogLocation::Url(url) => Ok(url.clone()),
            CatalogLocation::Resource(name) => {
                ResourceRegistry::resource_url(name).map_err(|e| CatalogError::Fetch {
                    location: name.clone(),
                    details: e.to_string(),
                })
            }
        }
    }
}

impl fmt::Display for CatalogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogLocation::File(path) => write!(f, "{}", path.display()),
            CatalogLocation::Url(url) => write!(f, "{}", url),
            CatalogLocation::Resource(name) => write!(f, "{}:{}", RESOURCE_SCHEME, name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EntryKind {
    Public { public_id: String, prefer: Prefer },
    System { system_id: String },
    RewriteSystem { prefix: String },
    SystemSuffix { suffix: String },
    Uri { name: String },
    RewriteUri { prefix: String },
    UriSuffix { suffix: String },
    DelegatePublic { prefix: String, prefer: Prefer },
    DelegateSystem { prefix: String },
    DelegateUri { prefix: String },
    NextCatalog,
}

impl EntryKind {
    fn links_catalog(&self) -> bool {
        matches!(
            self,
            EntryKind::DelegatePublic { .. }
                | EntryKind::DelegateSystem { .. }
                | EntryKind::DelegateUri { .. }
                | EntryKind::NextCatalog
        )
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    kind: EntryKind,
    /// Absolute replacement URI, rewrite prefix, or linked catalog URL
    target: String,
    /// Loaded catalog for `nextCatalog` and `delegate*` entries
    linked: Option<Catalog>,
}

/// One parsed catalog document, with its linked catalogs
#[derive(Debug, Clone)]
pub struct Catalog {
    location: String,
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Parse a catalog document. Linked catalogs are recorded but not loaded.
    pub fn parse(text: &str, base: &Url, location: impl Into<String>) -> CatalogResult<Self> {
        let location = location.into();
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let document = Document::parse_with_options(text, options).map_err(|e| {
            let pos = e.pos();
            CatalogError::Parse {
                location: location.clone(),
                details: e.to_string(),
                position: Some((pos.row, pos.col)),
            }
        })?;

        let root = document.root_element();
        if root.tag_name().namespace() != Some(CATALOG_NAMESPACE) || root.tag_name().name() != "catalog"
        {
            return Err(CatalogError::Parse {
                location,
                details: format!(
                    "root element <{}> is not an OASIS XML catalog",
                    root.tag_name().name()
                ),
                position: None,
            });
        }

        let mut parser = EntryParser {
            location: &location,
            entries: Vec::new(),
        };
        let (base, prefer) = parser.scope(root, base, Prefer::default())?;
        parser.parse_children(root, &base, prefer)?;

        let entries = parser.entries;
        debug!(catalog = %location, entries = entries.len(), "parsed catalog");
        Ok(Self { location, entries })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Number of entries in this document, linked catalogs excluded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn linked(&self) -> impl Iterator<Item = (&CatalogEntry, &Catalog)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.linked.as_ref().map(|catalog| (entry, catalog)))
    }

    /// External identifier resolution (OASIS XML Catalogs, section 7.1.2)
    fn resolve_external(&self, public_id: Option<&str>, system_id: Option<&str>) -> Option<String> {
        if let Some(system_id) = system_id {
            for entry in &self.entries {
                if let EntryKind::System { system_id: candidate } = &entry.kind
                    && candidate == system_id
                {
                    return Some(entry.target.clone());
                }
            }

            let rewrite = self
                .entries
                .iter()
                .filter_map(|entry| match &entry.kind {
                    EntryKind::RewriteSystem { prefix } if system_id.starts_with(prefix.as_str()) => {
                        Some((prefix.len(), entry))
                    }
                    _ => None,
                })
                .max_by_key(|(len, _)| *len);
            if let Some((len, entry)) = rewrite {
                return Some(format!("{}{}", entry.target, &system_id[len..]));
            }

            let suffix = self
                .entries
                .iter()
                .filter_map(|entry| match &entry.kind {
                    EntryKind::SystemSuffix { suffix } if system_id.ends_with(suffix.as_str()) => {
                        Some((suffix.len(), entry))
                    }
                    _ => None,
                })
                .max_by_key(|(len, _)| *len);
            if let Some((_, entry)) = suffix {
                return Some(entry.target.clone());
            }

            let delegates = self.delegates(|kind| match kind {
                EntryKind::DelegateSystem { prefix } if system_id.starts_with(prefix.as_str()) => {
                    Some(prefix.len())
                }
                _ => None,
            });
            if !delegates.is_empty() {
                return delegates
                    .into_iter()
                    .find_map(|catalog| catalog.resolve_external(None, Some(system_id)));
            }
        }

        if let Some(public_id) = public_id {
            let applies = |prefer: Prefer| system_id.is_none() || prefer == Prefer::Public;

            for entry in &self.entries {
                if let EntryKind::Public {
                    public_id: candidate,
                    prefer,
                } = &entry.kind
                    && candidate == public_id
                    && applies(*prefer)
                {
                    return Some(entry.target.clone());
                }
            }

            let delegates = self.delegates(|kind| match kind {
                EntryKind::DelegatePublic { prefix, prefer }
                    if public_id.starts_with(prefix.as_str()) && applies(*prefer) =>
                {
                    Some(prefix.len())
                }
                _ => None,
            });
            if !delegates.is_empty() {
                return delegates
                    .into_iter()
                    .find_map(|catalog| catalog.resolve_external(Some(public_id), None));
            }
        }

        self.linked()
            .filter(|(entry, _)| entry.kind == EntryKind::NextCatalog)
            .find_map(|(_, catalog)| catalog.resolve_external(public_id, system_id))
    }

    /// URI resolution (OASIS XML Catalogs, section 7.2.2)
    fn resolve_uri(&self, uri: &str) -> Option<String> {
        for entry in &self.entries {
            if let EntryKind::Uri { name } = &entry.kind
                && name == uri
            {
                return Some(entry.target.clone());
            }
        }

        let rewrite = self
            .entries
            .iter()
            .filter_map(|entry| match &entry.kind {
                EntryKind::RewriteUri { prefix } if uri.starts_with(prefix.as_str()) => {
                    Some((prefix.len(), entry))
                }
                _ => None,
            })
            .max_by_key(|(len, _)| *len);
        if let Some((len, entry)) = rewrite {
            return Some(format!("{}{}", entry.target, &uri[len..]));
        }

        let suffix = self
            .entries
            .iter()
            .filter_map(|entry| match &entry.kind {
                EntryKind::UriSuffix { suffix } if uri.ends_with(suffix.as_str()) => {
                    Some((suffix.len(), entry))
                }
                _ => None,
            })
            .max_by_key(|(len, _)| *len);
        if let Some((_, entry)) = suffix {
            return Some(entry.target.clone());
        }

        let delegates = self.delegates(|kind| match kind {
            EntryKind::DelegateUri { prefix } if uri.starts_with(prefix.as_str()) => {
                Some(prefix.len())
            }
            _ => None,
        });
        if !delegates.is_empty() {
            return delegates
                .into_iter()
                .find_map(|catalog| catalog.resolve_uri(uri));
        }

        self.linked()
            .filter(|(entry, _)| entry.kind == EntryKind::NextCatalog)
            .find_map(|(_, catalog)| catalog.resolve_uri(uri))
    }

    /// Linked catalogs of matching delegate entries, longest match first, duplicates removed
    fn delegates<F>(&self, matches: F) -> Vec<&Catalog>
    where
        F: Fn(&EntryKind) -> Option<usize>,
    {
        let mut found: Vec<(usize, &CatalogEntry, &Catalog)> = self
            .linked()
            .filter_map(|(entry, catalog)| matches(&entry.kind).map(|len| (len, entry, catalog)))
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));

        let mut seen: Vec<&str> = Vec::new();
        let mut catalogs = Vec::new();
        for (_, entry, catalog) in found {
            if !seen.contains(&entry.target.as_str()) {
                seen.push(&entry.target);
                catalogs.push(catalog);
            }
        }
        catalogs
    }
}

struct EntryParser<'l> {
    location: &'l str,
    entries: Vec<CatalogEntry>,
}

impl EntryParser<'_> {
    /// Effective base URI and prefer value for an element and its descendants
    fn scope(&self, node: Node, base: &Url, prefer: Prefer) -> CatalogResult<(Url, Prefer)> {
        let base = match node.attribute((XML_NAMESPACE, "base")) {
            Some(value) => uri::join(base, value)
                .map_err(|e| self.invalid(node, format!("xml:base '{}': {}", value, e)))?,
            None => base.clone(),
        };
        let prefer = match node.attribute("prefer") {
            Some(value) => Prefer::parse(value)
                .ok_or_else(|| self.invalid(node, format!("invalid prefer value '{}'", value)))?,
            None => prefer,
        };
        Ok((base, prefer))
    }

    fn parse_children(&mut self, parent: Node, base: &Url, prefer: Prefer) -> CatalogResult<()> {
        for node in parent.children().filter(|n| n.is_element()) {
            if node.tag_name().namespace() != Some(CATALOG_NAMESPACE) {
                continue;
            }
            let (base, prefer) = self.scope(node, base, prefer)?;
            let name = node.tag_name().name();

            let (kind, target_attr) = match name {
                "group" => {
                    self.parse_children(node, &base, prefer)?;
                    continue;
                }
                "public" => (
                    EntryKind::Public {
                        public_id: normalize_public_id(self.required(node, "publicId")?),
                        prefer,
                    },
                    "uri",
                ),
                "system" => (
                    EntryKind::System {
                        system_id: self.required(node, "systemId")?.to_string(),
                    },
                    "uri",
                ),
                "rewriteSystem" => (
                    EntryKind::RewriteSystem {
                        prefix: self.required(node, "systemIdStartString")?.to_string(),
                    },
                    "rewritePrefix",
                ),
                "systemSuffix" => (
                    EntryKind::SystemSuffix {
                        suffix: self.required(node, "systemIdSuffix")?.to_string(),
                    },
                    "uri",
                ),
                "uri" => (
                    EntryKind::Uri {
                        name: self.required(node, "name")?.to_string(),
                    },
                    "uri",
                ),
                "rewriteURI" => (
                    EntryKind::RewriteUri {
                        prefix: self.required(node, "uriStartString")?.to_string(),
                    },
                    "rewritePrefix",
                ),
                "uriSuffix" => (
                    EntryKind::UriSuffix {
                        suffix: self.required(node, "uriSuffix")?.to_string(),
                    },
                    "uri",
                ),
                "delegatePublic" => (
                    EntryKind::DelegatePublic {
                        prefix: normalize_public_id(self.required(node, "publicIdStartString")?),
                        prefer,
                    },
                    "catalog",
                ),
                "delegateSystem" => (
                    EntryKind::DelegateSystem {
                        prefix: self.required(node, "systemIdStartString")?.to_string(),
                    },
                    "catalog",
                ),
                "delegateURI" => (
                    EntryKind::DelegateUri {
                        prefix: self.required(node, "uriStartString")?.to_string(),
                    },
                    "catalog",
                ),
                "nextCatalog" => (EntryKind::NextCatalog, "catalog"),
                other => {
                    debug!(catalog = %self.location, element = other, "ignoring catalog element");
                    continue;
                }
            };

            let value = self.required(node, target_attr)?;
            let target = uri::join(&base, value)
                .map_err(|e| self.invalid(node, format!("{} '{}': {}", target_attr, value, e)))?;
            self.entries.push(CatalogEntry {
                kind,
                target: target.to_string(),
                linked: None,
            });
        }
        Ok(())
    }

    fn required<'a>(&self, node: Node<'a, '_>, attribute: &str) -> CatalogResult<&'a str> {
        node.attribute(attribute)
            .ok_or_else(|| self.invalid(node, format!("missing attribute {}", attribute)))
    }

    fn invalid(&self, node: Node, details: String) -> CatalogError {
        CatalogError::InvalidEntry {
            location: self.location.to_string(),
            element: node.tag_name().name().to_string(),
            details,
        }
    }
}

/// Collapse whitespace runs in a public identifier and trim both ends
pub fn normalize_public_id(public_id: &str) -> String {
    public_id.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode a `urn:publicid:` URN into the public identifier it wraps
pub fn unwrap_public_id_urn(urn: &str) -> Option<String> {
    let prefix = urn.get(..PUBLICID_URN_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(PUBLICID_URN_PREFIX) {
        return None;
    }
    let encoded = &urn[PUBLICID_URN_PREFIX.len()..];

    let mut result = String::with_capacity(encoded.len());
    let mut rest = encoded;
    while let Some(c) = rest.chars().next() {
        match c {
            '+' => result.push(' '),
            ':' => result.push_str("//"),
            ';' => result.push_str("::"),
            '%' => {
                let decoded = match rest.get(1..3) {
                    Some("2B") => Some('+'),
                    Some("3A") => Some(':'),
                    Some("2F") => Some('/'),
                    Some("3B") => Some(';'),
                    Some("27") => Some('\''),
                    Some("3F") => Some('?'),
                    Some("23") => Some('#'),
                    Some("25") => Some('%'),
                    _ => None,
                };
                if let Some(decoded) = decoded {
                    result.push(decoded);
                    rest = &rest[3..];
                    continue;
                }
                result.push('%');
            }
            other => result.push(other),
        }
        rest = &rest[c.len_utf8()..];
    }
    Some(result)
}

/// Loads catalog documents from files, URLs and packaged resources.
#[derive(Clone)]
pub struct CatalogLoader {
    http_client: AsyncHttpClient,
    resources: Arc<ResourceRegistry>,
}

impl CatalogLoader {
    pub fn new(http_client: AsyncHttpClient, resources: Arc<ResourceRegistry>) -> Self {
        Self {
            http_client,
            resources,
        }
    }

    /// Load a catalog and, recursively, every catalog it links to
    pub async fn load(&self, location: &CatalogLocation) -> CatalogResult<Catalog> {
        let url = location.to_url()?;
        self.load_at(url, location.to_string(), 0, Vec::new()).await
    }

    fn load_at(
        &self,
        url: Url,
        label: String,
        depth: usize,
        ancestors: Vec<String>,
    ) -> BoxFuture<'_, CatalogResult<Catalog>> {
        async move {
            if depth > MAX_CATALOG_DEPTH {
                return Err(CatalogError::Recursion {
                    location: label,
                    limit: MAX_CATALOG_DEPTH,
                });
            }

            debug!(catalog = %label, depth, "loading catalog");
            let text = self.read(&url, &label).await?;
            let mut catalog = Catalog::parse(&text, &url, label)?;

            let mut chain = ancestors;
            chain.push(url.to_string());

            for entry in catalog.entries.iter_mut() {
                if !entry.kind.links_catalog() {
                    continue;
                }
                if chain.contains(&entry.target) {
                    warn!(catalog = %catalog.location, target = %entry.target, "ignoring circular catalog reference");
                    continue;
                }
                let target = Url::parse(&entry.target).map_err(|e| CatalogError::Fetch {
                    location: entry.target.clone(),
                    details: e.to_string(),
                })?;
                let linked = self
                    .load_at(target, entry.target.clone(), depth + 1, chain.clone())
                    .await?;
                entry.linked = Some(linked);
            }

            Ok(catalog)
        }
        .boxed()
    }

    async fn read(&self, url: &Url, label: &str) -> CatalogResult<String> {
        let fetch_error = |details: String| CatalogError::Fetch {
            location: label.to_string(),
            details,
        };

        let data = match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| fetch_error("not a local file path".to_string()))?;
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| fetch_error(e.to_string()))?
            }
            "http" | "https" => self
                .http_client
                .download(url.as_str())
                .await
                .map_err(|e| fetch_error(e.to_string()))?,
            RESOURCE_SCHEME => {
                let name = ResourceRegistry::resource_name(url).unwrap_or_default();
                self.resources
                    .read(name)
                    .await
                    .map_err(|e| fetch_error(e.to_string()))?
                    .ok_or_else(|| fetch_error("packaged resource not found".to_string()))?
            }
            other => return Err(fetch_error(format!("unsupported scheme '{}'", other))),
        };

        String::from_utf8(data).map_err(|e| CatalogError::Parse {
            location: label.to_string(),
            details: format!("catalog is not valid UTF-8: {}", e),
            position: None,
        })
    }
}

/// Merged, read-only view over every configured catalog.
///
/// The first catalog in load order that has a match wins.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    catalogs: Vec<Catalog>,
}

impl CatalogStore {
    /// Store without any catalog; every lookup misses
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalogs(catalogs: Vec<Catalog>) -> Self {
        Self { catalogs }
    }

    /// Load every location in order. The first failure aborts the whole load.
    pub async fn load(locations: &[CatalogLocation], loader: &CatalogLoader) -> CatalogResult<Self> {
        let mut catalogs = Vec::with_capacity(locations.len());
        for location in locations {
            catalogs.push(loader.load(location).await?);
        }
        Ok(Self { catalogs })
    }

    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.catalogs.iter().map(Catalog::location)
    }

    /// Map a (public ID, system ID) pair to an alternate system URI
    pub fn resolve_entity(&self, public_id: Option<&str>, system_id: Option<&str>) -> Option<String> {
        if self.catalogs.is_empty() {
            return None;
        }

        let mut public_id = public_id.map(|id| unwrap_public_id_urn(id).unwrap_or_else(|| normalize_public_id(id)));
        let mut system_id = system_id.map(str::to_string);

        if let Some(unwrapped) = system_id.as_deref().and_then(unwrap_public_id_urn) {
            if public_id.is_none() {
                public_id = Some(unwrapped);
            }
            system_id = None;
        }

        let result = self
            .catalogs
            .iter()
            .find_map(|catalog| catalog.resolve_external(public_id.as_deref(), system_id.as_deref()));
        if let Some(target) = &result {
            debug!(public_id = ?public_id, system_id = ?system_id, %target, "catalog entity match");
        }
        result
    }

    /// Schema lookup by namespace: the namespace is tried as a public identifier and then
    /// as a URI.
    pub fn resolve_namespace(&self, namespace_uri: &str, system_id: Option<&str>) -> Option<String> {
        self.resolve_entity(Some(namespace_uri), system_id)
            .or_else(|| self.lookup_uri(namespace_uri))
    }

    /// Map an href (optionally relative to `base`) to an alternate URI
    pub fn resolve_uri(&self, href: &str, base: Option<&Url>) -> Option<String> {
        if self.catalogs.is_empty() {
            return None;
        }

        self.lookup_uri(href).or_else(|| {
            let base = base?;
            if uri::absolute_uri(href).is_some() {
                return None;
            }
            let absolute = uri::join(base, href).ok()?;
            self.lookup_uri(absolute.as_str())
        })
    }

    fn lookup_uri(&self, uri: &str) -> Option<String> {
        if let Some(public_id) = unwrap_public_id_urn(uri) {
            return self
                .catalogs
                .iter()
                .find_map(|catalog| catalog.resolve_external(Some(&public_id), None));
        }
        let result = self
            .catalogs
            .iter()
            .find_map(|catalog| catalog.resolve_uri(uri));
        if let Some(target) = &result {
            debug!(uri, %target, "catalog uri match");
        }
        result
    }
}
