use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::error::{CatalogError, ResolverError};

/// Where in a document a parse failure happened. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseLocation {
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ParseLocation {
    pub fn is_empty(&self) -> bool {
        self.public_id.is_none()
            && self.system_id.is_none()
            && self.line.is_none()
            && self.column.is_none()
    }
}

impl std::fmt::Display for ParseLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sep = "";
        if let Some(public_id) = &self.public_id {
            write!(f, "Public ID {}", public_id)?;
            sep = ", ";
        }
        if let Some(system_id) = &self.system_id {
            write!(f, "{}{}", sep, system_id)?;
            sep = ", ";
        }
        if let Some(line) = self.line {
            write!(f, "{}line {}", sep, line)?;
            sep = ", ";
        }
        if let Some(column) = self.column {
            // " column" keeps its leading space after the separator
            write!(f, "{} column {}", sep, column)?;
        }
        Ok(())
    }
}

/// Error reporter with configurable verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
    show_error_codes: bool,
}

impl ErrorReporter {
    /// Create a new error reporter with specified verbosity
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
            show_error_codes: false,
        }
    }

    /// Create a new error reporter with additional options
    pub fn with_options(
        verbosity: VerbosityLevel,
        show_timestamps: bool,
        show_error_codes: bool,
    ) -> Self {
        Self {
            verbosity,
            show_timestamps,
            show_error_codes,
        }
    }

    /// Compose the diagnostic for a document that failed to parse:
    /// `While parsing <file>, at <location>: <message>`
    pub fn format_parse_failure(file: &str, location: &ParseLocation, message: &str) -> String {
        if location.is_empty() {
            format!("While parsing {}: {}", file, message)
        } else {
            format!("While parsing {}, at {}: {}", file, location, message)
        }
    }

    /// Report a resolver error with appropriate verbosity
    pub fn report_error(&self, error: &ResolverError) {
        if let Some(formatted) = self.format_error(error) {
            eprintln!("{}", formatted);
        }
    }

    /// The text [`ErrorReporter::report_error`] prints, `None` when this verbosity hides it
    pub fn format_error(&self, error: &ResolverError) -> Option<String> {
        match self.verbosity {
            VerbosityLevel::Quiet => self
                .is_critical_error(error)
                .then(|| self.format_error_brief(error)),
            VerbosityLevel::Normal => Some(self.format_error_normal(error)),
            VerbosityLevel::Verbose => Some(self.format_error_verbose(error)),
            VerbosityLevel::Debug => Some(self.format_error_debug(error)),
        }
    }

    /// Report a configuration error
    pub fn report_config_error(&self, error: &ConfigError) {
        eprintln!("{}", self.format_config_error(error));
    }

    pub fn format_config_error(&self, error: &ConfigError) -> String {
        match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!(
                    "Configuration Error: {}\n{}",
                    error,
                    self.get_config_help(error)
                )
            }
            VerbosityLevel::Debug => {
                format!(
                    "Configuration Error: {}\nDebug: {:?}\n{}",
                    error,
                    error,
                    self.get_config_help(error)
                )
            }
        }
    }

    /// Errors that stop the run, shown even in quiet mode
    fn is_critical_error(&self, error: &ResolverError) -> bool {
        matches!(
            error,
            ResolverError::Catalog(_) | ResolverError::Config(_) | ResolverError::Transformer(_)
        )
    }

    /// Format error for brief output (quiet mode)
    fn format_error_brief(&self, error: &ResolverError) -> String {
        match error {
            ResolverError::Catalog(CatalogError::NotFound { spec, .. }) => {
                format!("CATALOG NOT FOUND: {}", spec)
            }
            ResolverError::Catalog(CatalogError::Parse { location, .. }) => {
                format!("CATALOG INVALID: {}", location)
            }
            _ => format!("ERROR: {}", error),
        }
    }

    /// Format error for normal output
    fn format_error_normal(&self, error: &ResolverError) -> String {
        let timestamp = if self.show_timestamps {
            format!("[{}] ", chrono::Utc::now().format("%H:%M:%S"))
        } else {
            String::new()
        };

        format!("{}{}", timestamp, error)
    }

    /// Format error for verbose output
    fn format_error_verbose(&self, error: &ResolverError) -> String {
        let mut output = self.format_error_normal(error);

        match error {
            ResolverError::Http(http_err) => {
                output.push_str("\nSuggestion: Check network connectivity and URL validity");
                if self.show_error_codes {
                    output.push_str(&format!("\nHTTP Error Details: {:?}", http_err));
                }
            }
            ResolverError::HttpStatus { status, .. } if self.show_error_codes => {
                output.push_str(&format!("\nHTTP Status: {}", status));
            }
            ResolverError::Catalog(CatalogError::Parse {
                location,
                details,
                position,
            }) => {
                let (line, column) = match position {
                    Some((line, column)) => (Some(*line), Some(*column)),
                    None => (None, None),
                };
                let at = ParseLocation {
                    line,
                    column,
                    ..ParseLocation::default()
                };
                output.push('\n');
                output.push_str(&Self::format_parse_failure(location, &at, details));
                output.push_str("\nSuggestion: Check the catalog is a well-formed OASIS XML catalog");
            }
            ResolverError::Catalog(CatalogError::NotFound { base_dir, .. }) => {
                output.push_str(&format!(
                    "\nSuggestion: Pass an absolute path, a URL, or a file relative to {}",
                    base_dir.display()
                ));
            }
            ResolverError::Catalog(CatalogError::Recursion { .. }) => {
                output.push_str("\nSuggestion: Look for nextCatalog/delegate entries forming a long chain");
            }
            ResolverError::InvalidBaseUri { .. } => {
                output.push_str("\nSuggestion: Base URIs must be absolute, e.g. file:///path/ or http://host/");
            }
            ResolverError::Open { system_id, .. } => {
                output.push_str(&format!(
                    "\nSuggestion: The identifier was mapped to {}, but it could not be read",
                    system_id
                ));
            }
            _ => {}
        }

        output
    }

    /// Format error for debug output
    fn format_error_debug(&self, error: &ResolverError) -> String {
        let mut output = self.format_error_verbose(error);
        output.push_str(&format!("\nDebug Info: {:?}", error));

        output.push_str("\nError Chain:");
        let mut current_error: &dyn std::error::Error = error;
        let mut level = 0;
        while let Some(source) = current_error.source() {
            output.push_str(&format!("\n  {}: {}", level + 1, source));
            current_error = source;
            level += 1;
        }

        output
    }

    /// Get helpful suggestions for configuration errors
    fn get_config_help(&self, error: &ConfigError) -> String {
        match error {
            ConfigError::Io(_) => "Check that the configuration file exists and is readable".to_string(),
            ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
                "Check the configuration file syntax (TOML/JSON format expected)".to_string()
            }
            ConfigError::Validation(_) => {
                "Fix the offending value in the configuration file, environment or command line"
                    .to_string()
            }
            ConfigError::Environment(_) => {
                "Check the XML_RESOLVE_* environment variables".to_string()
            }
            ConfigError::UnsupportedFormat(_) => {
                "Use a .toml or .json configuration file".to_string()
            }
        }
    }
}
