use crate::cli::{Cli, OutputFormat};
use crate::http_client::HttpClientConfig;
use crate::locator::ProbeCacheConfig;
use crate::policy::ResolutionPolicy;
use crate::resolver::{ResolverBuilder, UnitOptions};
use crate::transform::{TransformerSettings, parse_feature_assignment};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub network: NetworkConfig,
    pub probe_cache: ProbeCacheConfig,
    pub output: OutputConfig,
    pub transformer: TransformerSettings,
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base directory for relative files and catalogs (defaults to the working directory)
    pub base_dir: Option<PathBuf>,
    /// Catalog files, URLs or packaged resource names, in lookup order
    pub catalogs: Vec<String>,
    /// Policy for identifiers no catalog maps
    pub policy: ResolutionPolicy,
    pub validating: bool,
    pub xinclude_aware: bool,
    /// Directories holding packaged resources
    pub resource_roots: Vec<PathBuf>,
    /// Number of identifiers resolved concurrently
    pub concurrency: Option<usize>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed downloads
    pub retry_attempts: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    Human,
    Json,
    Summary,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
            OutputFormat::Summary => OutputFormatConfig::Summary,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
            OutputFormatConfig::Summary => OutputFormat::Summary,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormatConfig::Human,
            verbose: false,
            quiet: false,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    /// Same as [`ConfigManager::load_config`] with a custom environment provider
    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli)?;
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                let config: Config = toml::from_str(&content)?;
                Ok(config)
            }
            Some("json") => {
                let config: Config = serde_json::from_str(&content)?;
                Ok(config)
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    let config: Config = serde_json::from_str(&content)?;
                    Ok(config)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "xml-resolve.toml",
            "xml-resolve.json",
            ".xml-resolve.toml",
            ".xml-resolve.json",
        ];

        // Check current directory first
        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xml-resolve");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Resolver settings
        if let Some(base_dir) = env.get("XML_RESOLVE_BASE_DIR") {
            config.resolver.base_dir = Some(PathBuf::from(base_dir));
        }

        if let Some(catalogs) = env.get("XML_RESOLVE_CATALOGS") {
            config.resolver.catalogs = catalogs
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(policy) = env.get("XML_RESOLVE_POLICY") {
            config.resolver.policy = policy.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_RESOLVE_POLICY value: {}", policy))
            })?;
        }

        if let Some(validating) = env.get("XML_RESOLVE_VALIDATING") {
            config.resolver.validating = validating.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XML_RESOLVE_VALIDATING value: {}",
                    validating
                ))
            })?;
        }

        if let Some(xinclude) = env.get("XML_RESOLVE_XINCLUDE") {
            config.resolver.xinclude_aware = xinclude.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XML_RESOLVE_XINCLUDE value: {}",
                    xinclude
                ))
            })?;
        }

        if let Some(concurrency) = env.get("XML_RESOLVE_CONCURRENCY") {
            config.resolver.concurrency = Some(concurrency.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XML_RESOLVE_CONCURRENCY value: {}",
                    concurrency
                ))
            })?);
        }

        // Network settings
        if let Some(timeout) = env.get("XML_RESOLVE_TIMEOUT") {
            config.network.timeout_seconds = timeout.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_RESOLVE_TIMEOUT value: {}", timeout))
            })?;
        }

        if let Some(retry_attempts) = env.get("XML_RESOLVE_RETRY_ATTEMPTS") {
            config.network.retry_attempts = retry_attempts.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XML_RESOLVE_RETRY_ATTEMPTS value: {}",
                    retry_attempts
                ))
            })?;
        }

        // Probe cache settings
        if let Some(entries) = env.get("XML_RESOLVE_PROBE_CACHE_ENTRIES") {
            config.probe_cache.max_entries = entries.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XML_RESOLVE_PROBE_CACHE_ENTRIES value: {}",
                    entries
                ))
            })?;
        }

        if let Some(ttl) = env.get("XML_RESOLVE_PROBE_CACHE_TTL") {
            config.probe_cache.ttl_seconds = ttl.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XML_RESOLVE_PROBE_CACHE_TTL value: {}",
                    ttl
                ))
            })?;
        }

        // Output settings
        if let Some(verbose) = env.get("XML_RESOLVE_VERBOSE") {
            config.output.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_RESOLVE_VERBOSE value: {}", verbose))
            })?;
        }

        if let Some(quiet) = env.get("XML_RESOLVE_QUIET") {
            config.output.quiet = quiet.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_RESOLVE_QUIET value: {}", quiet))
            })?;
        }

        if let Some(format) = env.get("XML_RESOLVE_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                "summary" => OutputFormatConfig::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid XML_RESOLVE_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence where given)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Result<Config> {
        // Resolver settings
        if let Some(base_dir) = &cli.base_dir {
            config.resolver.base_dir = Some(base_dir.clone());
        }
        config.resolver.catalogs.extend(cli.catalogs.iter().cloned());
        if let Some(policy) = cli.policy {
            config.resolver.policy = policy;
        }
        config.resolver.validating |= cli.validating;
        config.resolver.xinclude_aware |= cli.xinclude_aware;
        config
            .resolver
            .resource_roots
            .extend(cli.resource_roots.iter().cloned());
        if cli.concurrency.is_some() {
            config.resolver.concurrency = cli.concurrency;
        }

        // Network settings
        if let Some(timeout) = cli.timeout {
            config.network.timeout_seconds = timeout;
        }
        if let Some(retry_attempts) = cli.retry_attempts {
            config.network.retry_attempts = retry_attempts;
        }

        // Output settings
        if let Some(format) = cli.output_format {
            config.output.format = format.into();
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        // Transformer settings
        for assignment in &cli.features {
            let (feature, enabled) = parse_feature_assignment(assignment)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
            config.transformer.set_feature(feature, enabled);
        }

        Ok(config)
    }

    /// Merge two configurations (second takes precedence for non-None values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        // Resolver settings
        if override_config.resolver.base_dir.is_some() {
            base.resolver.base_dir = override_config.resolver.base_dir;
        }
        if !override_config.resolver.catalogs.is_empty() {
            base.resolver.catalogs = override_config.resolver.catalogs;
        }
        base.resolver.policy = override_config.resolver.policy;
        base.resolver.validating = override_config.resolver.validating;
        base.resolver.xinclude_aware = override_config.resolver.xinclude_aware;
        if !override_config.resolver.resource_roots.is_empty() {
            base.resolver.resource_roots = override_config.resolver.resource_roots;
        }
        if override_config.resolver.concurrency.is_some() {
            base.resolver.concurrency = override_config.resolver.concurrency;
        }

        // Network settings
        base.network = override_config.network;

        // Probe cache settings
        base.probe_cache = override_config.probe_cache;

        // Output settings
        base.output = override_config.output;

        // Transformer settings
        base.transformer.merge(&override_config.transformer);

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if let Some(concurrency) = config.resolver.concurrency {
            if concurrency == 0 {
                return Err(ConfigError::Validation(
                    "Concurrency must be greater than 0".to_string(),
                ));
            }
            if concurrency > 1000 {
                return Err(ConfigError::Validation(
                    "Concurrency cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.resolver.catalogs.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "Catalog entries must not be empty".to_string(),
            ));
        }

        // Validate network settings
        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        // Validate probe cache settings
        if config.probe_cache.max_entries == 0 {
            return Err(ConfigError::Validation(
                "Probe cache must hold at least one entry".to_string(),
            ));
        }

        if config.probe_cache.ttl_seconds == 0 {
            return Err(ConfigError::Validation(
                "Probe cache TTL must be greater than 0".to_string(),
            ));
        }

        // Validate output settings
        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the effective base directory
    pub fn get_base_dir(config: &Config) -> PathBuf {
        config
            .resolver
            .base_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the effective number of concurrent resolutions
    pub fn get_concurrency(config: &Config) -> usize {
        config.resolver.concurrency.unwrap_or_else(num_cpus::get)
    }

    pub fn http_client_config(config: &Config) -> HttpClientConfig {
        HttpClientConfig {
            timeout_seconds: config.network.timeout_seconds,
            retry_attempts: config.network.retry_attempts,
            retry_delay_ms: config.network.retry_delay_ms,
            ..HttpClientConfig::default()
        }
    }

    pub fn unit_options(config: &Config) -> UnitOptions {
        UnitOptions {
            policy: config.resolver.policy,
            validating: config.resolver.validating,
            xinclude_aware: config.resolver.xinclude_aware,
        }
    }

    /// Resolver builder carrying every resolver-related setting
    pub fn resolver_builder(config: &Config) -> ResolverBuilder {
        let mut builder = ResolverBuilder::new(Self::get_base_dir(config))
            .catalogs(config.resolver.catalogs.iter().cloned())
            .http_config(Self::http_client_config(config))
            .probe_cache(config.probe_cache.clone())
            .options(Self::unit_options(config));
        for root in &config.resolver.resource_roots {
            builder = builder.resource_root(root.clone());
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformerFeature;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.resolver.base_dir, None);
        assert!(config.resolver.catalogs.is_empty());
        assert_eq!(config.resolver.policy, ResolutionPolicy::PassThrough);
        assert!(!config.resolver.validating);
        assert!(!config.resolver.xinclude_aware);

        assert_eq!(config.network.timeout_seconds, 30);
        assert_eq!(config.network.retry_attempts, 3);
        assert_eq!(config.network.retry_delay_ms, 1000);

        assert_eq!(config.probe_cache.max_entries, 1000);
        assert_eq!(config.probe_cache.ttl_seconds, 3600);

        assert_eq!(config.output.format, OutputFormatConfig::Human);
        assert!(!config.output.verbose);
        assert!(!config.output.quiet);

        assert!(config.transformer.features.is_empty());
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let toml_content = r#"
[resolver]
base_dir = "/work/project"
catalogs = ["catalog.xml", "http://example.com/catalog.xml"]
policy = "local-only"
validating = true
resource_roots = ["/opt/schemas"]
concurrency = 8

[network]
timeout_seconds = 60
retry_attempts = 5
retry_delay_ms = 2000

[probe_cache]
max_entries = 50
ttl_seconds = 120

[output]
format = "json"
verbose = true
quiet = false

[transformer.features]
secure-processing = true

[transformer.parameters]
title = "Report"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();

        assert_eq!(config.resolver.base_dir, Some(PathBuf::from("/work/project")));
        assert_eq!(
            config.resolver.catalogs,
            vec!["catalog.xml", "http://example.com/catalog.xml"]
        );
        assert_eq!(config.resolver.policy, ResolutionPolicy::LocalOnly);
        assert!(config.resolver.validating);
        assert!(!config.resolver.xinclude_aware);
        assert_eq!(config.resolver.resource_roots, vec![PathBuf::from("/opt/schemas")]);
        assert_eq!(config.resolver.concurrency, Some(8));

        assert_eq!(config.network.timeout_seconds, 60);
        assert_eq!(config.network.retry_attempts, 5);
        assert_eq!(config.network.retry_delay_ms, 2000);

        assert_eq!(config.probe_cache.max_entries, 50);
        assert_eq!(config.probe_cache.ttl_seconds, 120);

        assert_eq!(config.output.format, OutputFormatConfig::Json);
        assert!(config.output.verbose);

        assert_eq!(
            config.transformer.feature(TransformerFeature::SecureProcessing),
            Some(true)
        );
        assert_eq!(
            config.transformer.parameters.get("title").map(String::as_str),
            Some("Report")
        );
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let json_content = r#"{
  "resolver": {
    "catalogs": ["resource:catalog.xml"],
    "policy": "strict"
  },
  "network": {
    "timeout_seconds": 45,
    "retry_attempts": 2,
    "retry_delay_ms": 500
  },
  "output": {
    "format": "summary",
    "verbose": false,
    "quiet": true
  }
}"#;

        fs::write(&config_path, json_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();

        assert_eq!(config.resolver.catalogs, vec!["resource:catalog.xml"]);
        assert_eq!(config.resolver.policy, ResolutionPolicy::Strict);

        assert_eq!(config.network.timeout_seconds, 45);
        assert_eq!(config.network.retry_attempts, 2);
        assert_eq!(config.network.retry_delay_ms, 500);

        // Missing sections fall back to defaults
        assert_eq!(config.probe_cache, ProbeCacheConfig::default());

        assert_eq!(config.output.format, OutputFormatConfig::Summary);
        assert!(!config.output.verbose);
        assert!(config.output.quiet);
    }

    #[tokio::test]
    async fn test_unsupported_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(&config_path, "invalid: yaml").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(result.is_err());

        match result.unwrap_err() {
            ConfigError::UnsupportedFormat(ext) => assert_eq!(ext, "yaml"),
            _ => panic!("Expected UnsupportedFormat error"),
        }
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid toml [[[").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParsing(_)));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        fs::write(&config_path, "{ invalid json }").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::JsonParsing(_)));
    }

    #[tokio::test]
    async fn test_unknown_policy_in_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "[resolver]\npolicy = \"offline\"\n").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParsing(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XML_RESOLVE_BASE_DIR", "/env/base");
        mock_env.set("XML_RESOLVE_CATALOGS", "a.xml, http://example.com/b.xml");
        mock_env.set("XML_RESOLVE_POLICY", "strict");
        mock_env.set("XML_RESOLVE_XINCLUDE", "true");
        mock_env.set("XML_RESOLVE_CONCURRENCY", "16");
        mock_env.set("XML_RESOLVE_TIMEOUT", "120");
        mock_env.set("XML_RESOLVE_PROBE_CACHE_TTL", "60");
        mock_env.set("XML_RESOLVE_VERBOSE", "true");
        mock_env.set("XML_RESOLVE_FORMAT", "json");

        let base_config = Config::default();
        let config =
            ConfigManager::apply_environment_overrides_with(&mock_env, base_config).unwrap();

        assert_eq!(config.resolver.base_dir, Some(PathBuf::from("/env/base")));
        assert_eq!(
            config.resolver.catalogs,
            vec!["a.xml", "http://example.com/b.xml"]
        );
        assert_eq!(config.resolver.policy, ResolutionPolicy::Strict);
        assert!(config.resolver.xinclude_aware);
        assert_eq!(config.resolver.concurrency, Some(16));
        assert_eq!(config.network.timeout_seconds, 120);
        assert_eq!(config.probe_cache.ttl_seconds, 60);
        assert!(config.output.verbose);
        assert_eq!(config.output.format, OutputFormatConfig::Json);
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XML_RESOLVE_CONCURRENCY", "invalid");

        let result = ConfigManager::apply_environment_overrides_with(&mock_env, Config::default());
        assert!(matches!(result.unwrap_err(), ConfigError::Environment(_)));

        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XML_RESOLVE_POLICY", "offline");

        let result = ConfigManager::apply_environment_overrides_with(&mock_env, Config::default());
        assert!(matches!(result.unwrap_err(), ConfigError::Environment(_)));
    }

    #[test]
    fn test_merge_with_cli() {
        use clap::Parser;

        let args = vec![
            "xml-resolve",
            "--catalog",
            "extra.xml",
            "--policy",
            "strict",
            "--validating",
            "--timeout",
            "90",
            "--format",
            "summary",
            "--feature",
            "xinclude-aware",
            "-v",
            "doc.dtd",
        ];

        let cli = Cli::try_parse_from(args).unwrap();
        let mut base_config = Config::default();
        base_config.resolver.catalogs = vec!["base.xml".to_string()];
        base_config.network.retry_attempts = 7;
        let config = ConfigManager::merge_with_cli(base_config, &cli).unwrap();

        assert_eq!(config.resolver.catalogs, vec!["base.xml", "extra.xml"]);
        assert_eq!(config.resolver.policy, ResolutionPolicy::Strict);
        assert!(config.resolver.validating);
        assert_eq!(config.network.timeout_seconds, 90);
        // Options the CLI leaves out keep their configured value
        assert_eq!(config.network.retry_attempts, 7);
        assert_eq!(config.output.format, OutputFormatConfig::Summary);
        assert!(config.output.verbose);
        assert_eq!(
            config.transformer.feature(TransformerFeature::XIncludeAware),
            Some(true)
        );
    }

    #[test]
    fn test_merge_with_cli_rejects_unknown_feature() {
        use clap::Parser;

        let cli =
            Cli::try_parse_from(vec!["xml-resolve", "--feature", "turbo", "doc.dtd"]).unwrap();
        let result = ConfigManager::merge_with_cli(Config::default(), &cli);
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_merge_configs() {
        let mut base = Config::default();
        base.resolver.catalogs = vec!["base.xml".to_string()];
        base.resolver.concurrency = Some(4);

        let mut override_config = Config::default();
        override_config.resolver.concurrency = Some(8);
        override_config.network.timeout_seconds = 60;

        let merged = ConfigManager::merge_configs(base, override_config);

        assert_eq!(merged.resolver.concurrency, Some(8)); // Override wins
        assert_eq!(merged.network.timeout_seconds, 60); // Override wins
        assert_eq!(merged.resolver.catalogs, vec!["base.xml"]); // Empty list keeps base
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(ConfigManager::validate_config(&config).is_ok());

        // Invalid concurrency
        config.resolver.concurrency = Some(0);
        assert!(ConfigManager::validate_config(&config).is_err());

        config.resolver.concurrency = Some(1001);
        assert!(ConfigManager::validate_config(&config).is_err());

        config.resolver.concurrency = Some(4);

        // Blank catalog entry
        config.resolver.catalogs = vec![" ".to_string()];
        assert!(ConfigManager::validate_config(&config).is_err());

        config.resolver.catalogs.clear();

        // Invalid timeout
        config.network.timeout_seconds = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        config.network.timeout_seconds = 30;

        // Invalid probe cache
        config.probe_cache.max_entries = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        config.probe_cache.max_entries = 10;

        // Invalid verbose + quiet
        config.output.verbose = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_utility_functions() {
        let mut config = Config::default();

        assert!(ConfigManager::get_concurrency(&config) >= 1);
        config.resolver.concurrency = Some(3);
        assert_eq!(ConfigManager::get_concurrency(&config), 3);

        assert_eq!(
            ConfigManager::get_base_dir(&config),
            std::env::current_dir().unwrap()
        );
        config.resolver.base_dir = Some(PathBuf::from("/work"));
        assert_eq!(ConfigManager::get_base_dir(&config), PathBuf::from("/work"));

        let http = ConfigManager::http_client_config(&config);
        assert_eq!(http.timeout_seconds, 30);
        assert_eq!(http.retry_attempts, 3);
        assert_eq!(http.retry_delay_ms, 1000);

        config.resolver.policy = ResolutionPolicy::LocalOnly;
        config.resolver.validating = true;
        let options = ConfigManager::unit_options(&config);
        assert_eq!(options.policy, ResolutionPolicy::LocalOnly);
        assert!(options.validating);
        assert!(!options.xinclude_aware);
    }

    #[test]
    fn test_output_format_conversion() {
        assert_eq!(
            OutputFormatConfig::from(OutputFormat::Human),
            OutputFormatConfig::Human
        );
        assert_eq!(
            OutputFormatConfig::from(OutputFormat::Json),
            OutputFormatConfig::Json
        );
        assert_eq!(
            OutputFormat::from(OutputFormatConfig::Summary),
            OutputFormat::Summary
        );
    }

    #[tokio::test]
    async fn test_load_config_integration() {
        use clap::Parser;

        let temp_dir = TempDir::new().unwrap();

        let config_path = temp_dir.path().join("test.toml");
        let toml_content = r#"
[resolver]
policy = "local-only"
concurrency = 6

[network]
timeout_seconds = 45
retry_attempts = 3
retry_delay_ms = 1000
"#;
        fs::write(&config_path, toml_content).unwrap();

        let args = vec![
            "xml-resolve",
            "--config",
            config_path.to_str().unwrap(),
            "--concurrency",
            "8",
            "--verbose",
            "doc.dtd",
        ];

        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XML_RESOLVE_TIMEOUT", "50");

        let cli = Cli::try_parse_from(args).unwrap();
        let config = ConfigManager::load_config_with(&cli, &mock_env).await.unwrap();

        // CLI overrides the file
        assert_eq!(config.resolver.concurrency, Some(8));
        assert!(config.output.verbose);

        // File values survive where nothing overrides them
        assert_eq!(config.resolver.policy, ResolutionPolicy::LocalOnly);

        // Environment overrides the file
        assert_eq!(config.network.timeout_seconds, 50);
    }
}
