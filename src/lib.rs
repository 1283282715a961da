//! # xml-resolve Library
//!
//! An async-first resolver for XML identifiers: OASIS XML catalogs first, then a
//! per-unit resolution policy, then a source locator that tries packaged resources,
//! remote URLs and the filesystem.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod error_reporter;
pub mod http_client;
pub mod locator;
pub mod output;
pub mod policy;
pub mod resolver;
pub mod resources;
pub mod source;
pub mod transform;
pub mod uri;

pub use catalog::{Catalog, CatalogLoader, CatalogLocation, CatalogStore, Prefer};
pub use cli::{Cli, OutputFormat, ResolveMode, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use error::{CatalogError, ResolverError, Result};
pub use error_reporter::{ErrorReporter, ParseLocation};
pub use http_client::{AsyncHttpClient, HttpClientConfig};
pub use locator::{Locate, ProbeCacheConfig, SourceLocator};
pub use output::{Output, ResolutionOutcome, ResolutionReport, ResolutionStatus};
pub use policy::ResolutionPolicy;
pub use resolver::{
    EntityResolver, Resolver, ResolverBuilder, ResourceResolver, UnitOptions, UriResolver,
};
pub use resources::{ResourceLoader, ResourceManager, ResourceRegistry, SearchPathResourceManager};
pub use source::{
    ByteStream, CharacterStream, DocumentSource, ParseOptions, ResolutionRequest, ResolvedSource,
    ResourceInput, SourceOpener,
};
pub use transform::{TransformerEngine, TransformerFeature, TransformerSettings};
