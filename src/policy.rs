use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::uri::{self, IdentifierScheme};

/// What happens to identifiers that no catalog maps.
///
/// Only consulted by resource and schema resolution; entity and URI resolution never
/// filter their input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    /// Uncataloged identifiers go to the source locator as-is
    #[default]
    PassThrough,
    /// Only scheme-less and `file:` identifiers reach the source locator
    LocalOnly,
    /// Every uncataloged identifier is rejected
    Strict,
}

impl ResolutionPolicy {
    /// Whether an uncataloged identifier may be handed to the source locator
    pub fn permits(&self, identifier: &str) -> bool {
        match self {
            ResolutionPolicy::PassThrough => true,
            ResolutionPolicy::Strict => false,
            ResolutionPolicy::LocalOnly => matches!(
                uri::classify(identifier),
                IdentifierScheme::None | IdentifierScheme::File
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPolicy::PassThrough => "pass-through",
            ResolutionPolicy::LocalOnly => "local-only",
            ResolutionPolicy::Strict => "strict",
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "pass-through" | "passthrough" => Ok(ResolutionPolicy::PassThrough),
            "local-only" | "localonly" => Ok(ResolutionPolicy::LocalOnly),
            "strict" => Ok(ResolutionPolicy::Strict),
            other => Err(format!(
                "unknown resolution policy '{}' (expected pass-through, local-only or strict)",
                other
            )),
        }
    }
}
