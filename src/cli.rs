use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::policy::ResolutionPolicy;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// Which resolver role answers the identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Entity resolution: public/system IDs from DOCTYPEs and external entities
    #[default]
    Entity,
    /// Document resolution for stylesheet includes/imports
    Uri,
    /// Imported schema documents, filtered by the resolution policy
    Resource,
    /// Schema lookup of a validation unit, filtered by the resolution policy
    Schema,
}

impl ResolveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveMode::Entity => "entity",
            ResolveMode::Uri => "uri",
            ResolveMode::Resource => "resource",
            ResolveMode::Schema => "schema",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Summary,
}

/// Resolve XML public IDs, system IDs and URIs through OASIS catalogs and fallbacks
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-resolve")]
#[command(
    about = "Resolve XML identifiers through catalogs, packaged resources, URLs and the filesystem"
)]
#[command(version)]
pub struct Cli {
    /// Identifiers to resolve (system IDs, hrefs or resource names)
    #[arg(required = true, help = "Identifiers to resolve")]
    pub identifiers: Vec<String>,

    /// Resolver role to use
    #[arg(short = 'm', long = "mode", value_enum, default_value_t = ResolveMode::Entity)]
    pub mode: ResolveMode,

    /// Catalog file, URL or packaged resource (repeatable)
    #[arg(short = 'c', long = "catalog", action = clap::ArgAction::Append)]
    pub catalogs: Vec<String>,

    /// Base directory for relative files and catalogs
    #[arg(short = 'b', long = "base-dir")]
    pub base_dir: Option<PathBuf>,

    /// Base URI for relative identifiers (uri and resource modes)
    #[arg(long = "base-uri")]
    pub base_uri: Option<String>,

    /// Public identifier sent along with every identifier
    #[arg(long = "public-id", allow_hyphen_values = true)]
    pub public_id: Option<String>,

    /// Target namespace (resource mode)
    #[arg(long = "namespace")]
    pub namespace: Option<String>,

    /// Policy for identifiers no catalog maps
    #[arg(short = 'p', long = "policy", value_enum)]
    pub policy: Option<ResolutionPolicy>,

    /// Mark the unit as validating
    #[arg(long = "validating")]
    pub validating: bool,

    /// Mark the unit as XInclude-aware
    #[arg(long = "xinclude")]
    pub xinclude_aware: bool,

    /// Directory of packaged resources (repeatable)
    #[arg(long = "resource-root", action = clap::ArgAction::Append)]
    pub resource_roots: Vec<PathBuf>,

    /// Transformer feature, `name` or `name=false` (repeatable, uri mode)
    #[arg(long = "feature", action = clap::ArgAction::Append)]
    pub features: Vec<String>,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Number of identifiers resolved concurrently
    #[arg(short = 'j', long = "concurrency")]
    pub concurrency: Option<usize>,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Number of retry attempts for failed downloads
    #[arg(long = "retry-attempts")]
    pub retry_attempts: Option<u32>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(base_dir) = &self.base_dir
            && !base_dir.is_dir()
        {
            return Err(format!(
                "Base directory does not exist: {}",
                base_dir.display()
            ));
        }
        if let Some(concurrency) = self.concurrency
            && concurrency == 0
        {
            return Err("Concurrency must be greater than 0".to_string());
        }
        if self.identifiers.iter().any(|id| id.trim().is_empty()) {
            return Err("Identifiers must not be empty".to_string());
        }
        Ok(())
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}
