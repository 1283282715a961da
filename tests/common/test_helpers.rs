use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use xml_resolve::{
    AsyncHttpClient, Catalog, CatalogStore, HttpClientConfig, Locate, ResolutionPolicy, Resolver,
    ResourceRegistry, SourceOpener, UnitOptions,
};

pub const CATALOG_NAMESPACE: &str = "urn:oasis:names:tc:entity:xmlns:xml:catalog";

/// Wrap catalog entries in an OASIS catalog document
pub fn catalog_document(entries: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<!DOCTYPE catalog PUBLIC "-//OASIS//DTD XML Catalogs V1.1//EN"
  "http://www.oasis-open.org/committees/entity/release/1.1/catalog.dtd">
<catalog xmlns="{}">
{}
</catalog>
"#,
        CATALOG_NAMESPACE, entries
    )
}

/// Write `content` to `relative` under `dir`, creating parent directories
pub fn write_file(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

pub fn file_url(path: &Path) -> Url {
    Url::from_file_path(path).unwrap()
}

/// HTTP settings that fail fast against unreachable hosts
pub fn test_http_config() -> HttpClientConfig {
    HttpClientConfig {
        timeout_seconds: 5,
        retry_attempts: 0,
        retry_delay_ms: 10,
        ..HttpClientConfig::default()
    }
}

/// Catalog store parsed in memory, relative entries resolved against `base`
pub fn store_from(text: &str, base: &Url) -> CatalogStore {
    let catalog = Catalog::parse(text, base, base.to_string()).unwrap();
    CatalogStore::from_catalogs(vec![catalog])
}

/// Resolver over a stub locator
pub fn resolver_with_locator(
    catalogs: CatalogStore,
    locator: Arc<dyn Locate>,
    policy: ResolutionPolicy,
) -> Resolver {
    let http_client = AsyncHttpClient::new(test_http_config()).unwrap();
    let opener = SourceOpener::new(http_client, Arc::new(ResourceRegistry::builtin()));
    Resolver::from_parts(
        catalogs,
        locator,
        opener,
        UnitOptions {
            policy,
            ..UnitOptions::default()
        },
    )
}
