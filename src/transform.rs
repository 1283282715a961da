//! Typed transformer configuration.
//!
//! Features are a closed enum applied through one explicit setter each on a
//! [`TransformerEngine`]; unknown feature names are rejected when the configuration is read.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ResolverError, Result};
use crate::resolver::{Resolver, UnitOptions, UriResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformerFeature {
    SecureProcessing,
    XIncludeAware,
    Validating,
    NamespaceAware,
}

impl TransformerFeature {
    pub const ALL: [TransformerFeature; 4] = [
        TransformerFeature::SecureProcessing,
        TransformerFeature::XIncludeAware,
        TransformerFeature::Validating,
        TransformerFeature::NamespaceAware,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransformerFeature::SecureProcessing => "secure-processing",
            TransformerFeature::XIncludeAware => "xinclude-aware",
            TransformerFeature::Validating => "validating",
            TransformerFeature::NamespaceAware => "namespace-aware",
        }
    }

    /// JAXP-style feature URI
    pub fn uri(&self) -> &'static str {
        match self {
            TransformerFeature::SecureProcessing => {
                "http://javax.xml.XMLConstants/feature/secure-processing"
            }
            TransformerFeature::XIncludeAware => "http://apache.org/xml/features/xinclude",
            TransformerFeature::Validating => "http://xml.org/sax/features/validation",
            TransformerFeature::NamespaceAware => "http://xml.org/sax/features/namespaces",
        }
    }
}

impl fmt::Display for TransformerFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformerFeature {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        TransformerFeature::ALL
            .into_iter()
            .find(|feature| feature.name().eq_ignore_ascii_case(s) || feature.uri() == s)
            .ok_or_else(|| ResolverError::Transformer(format!("unknown transformer feature '{}'", s)))
    }
}

impl Serialize for TransformerFeature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for TransformerFeature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Features, stylesheet parameters and output properties of one transformation unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerSettings {
    pub features: BTreeMap<TransformerFeature, bool>,
    pub parameters: BTreeMap<String, String>,
    pub output_properties: BTreeMap<String, String>,
}

/// The transformation engine, seen through explicit setters
pub trait TransformerEngine {
    fn set_secure_processing(&mut self, enabled: bool) -> Result<()>;
    fn set_xinclude_aware(&mut self, enabled: bool) -> Result<()>;
    fn set_validating(&mut self, enabled: bool) -> Result<()>;
    fn set_namespace_aware(&mut self, enabled: bool) -> Result<()>;
    fn set_parameter(&mut self, name: &str, value: &str) -> Result<()>;
    fn set_output_property(&mut self, name: &str, value: &str) -> Result<()>;
    fn set_uri_resolver(&mut self, resolver: Arc<dyn UriResolver>);
}

impl TransformerSettings {
    pub fn set_feature(&mut self, feature: TransformerFeature, enabled: bool) {
        self.features.insert(feature, enabled);
    }

    pub fn feature(&self, feature: TransformerFeature) -> Option<bool> {
        self.features.get(&feature).copied()
    }

    /// Resolver options for the unit these settings configure; features left unset keep
    /// the value from `base`.
    pub fn unit_options(&self, base: UnitOptions) -> UnitOptions {
        UnitOptions {
            policy: base.policy,
            validating: self
                .feature(TransformerFeature::Validating)
                .unwrap_or(base.validating),
            xinclude_aware: self
                .feature(TransformerFeature::XIncludeAware)
                .unwrap_or(base.xinclude_aware),
        }
    }

    /// Overlay `other` on top of these settings
    pub fn merge(&mut self, other: &TransformerSettings) {
        self.features.extend(other.features.iter().map(|(k, v)| (*k, *v)));
        self.parameters
            .extend(other.parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.output_properties.extend(
            other
                .output_properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    /// Configure `engine` and hand it a resolver view derived from these settings
    pub fn apply<E>(&self, engine: &mut E, resolver: &Resolver) -> Result<()>
    where
        E: TransformerEngine + ?Sized,
    {
        for (feature, enabled) in &self.features {
            match feature {
                TransformerFeature::SecureProcessing => engine.set_secure_processing(*enabled)?,
                TransformerFeature::XIncludeAware => engine.set_xinclude_aware(*enabled)?,
                TransformerFeature::Validating => engine.set_validating(*enabled)?,
                TransformerFeature::NamespaceAware => engine.set_namespace_aware(*enabled)?,
            }
        }
        for (name, value) in &self.parameters {
            engine.set_parameter(name, value)?;
        }
        for (name, value) in &self.output_properties {
            engine.set_output_property(name, value)?;
        }

        let view = resolver.with_options(self.unit_options(*resolver.options()));
        engine.set_uri_resolver(Arc::new(view));
        Ok(())
    }
}

/// Parse a `feature=bool` assignment; a bare feature name means `true`
pub fn parse_feature_assignment(assignment: &str) -> Result<(TransformerFeature, bool)> {
    match assignment.split_once('=') {
        Some((name, value)) => {
            let enabled = value.trim().parse::<bool>().map_err(|_| {
                ResolverError::Transformer(format!(
                    "feature value must be true or false, got '{}'",
                    value
                ))
            })?;
            Ok((name.parse()?, enabled))
        }
        None => Ok((assignment.parse()?, true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ResolutionPolicy;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingEngine {
        calls: Vec<String>,
        resolver: Option<Arc<dyn UriResolver>>,
    }

    impl TransformerEngine for RecordingEngine {
        fn set_secure_processing(&mut self, enabled: bool) -> Result<()> {
            self.calls.push(format!("secure-processing={}", enabled));
            Ok(())
        }

        fn set_xinclude_aware(&mut self, enabled: bool) -> Result<()> {
            self.calls.push(format!("xinclude-aware={}", enabled));
            Ok(())
        }

        fn set_validating(&mut self, enabled: bool) -> Result<()> {
            self.calls.push(format!("validating={}", enabled));
            Ok(())
        }

        fn set_namespace_aware(&mut self, _enabled: bool) -> Result<()> {
            Err(ResolverError::Transformer(
                "namespace awareness cannot be changed".to_string(),
            ))
        }

        fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
            self.calls.push(format!("param {}={}", name, value));
            Ok(())
        }

        fn set_output_property(&mut self, name: &str, value: &str) -> Result<()> {
            self.calls.push(format!("output {}={}", name, value));
            Ok(())
        }

        fn set_uri_resolver(&mut self, resolver: Arc<dyn UriResolver>) {
            self.resolver = Some(resolver);
        }
    }

    #[test]
    fn test_feature_names_and_uris() {
        assert_eq!(
            "secure-processing".parse::<TransformerFeature>().unwrap(),
            TransformerFeature::SecureProcessing
        );
        assert_eq!(
            "http://apache.org/xml/features/xinclude"
                .parse::<TransformerFeature>()
                .unwrap(),
            TransformerFeature::XIncludeAware
        );
        let err = "http://saxon.sf.net/feature/unknown"
            .parse::<TransformerFeature>()
            .unwrap_err();
        assert!(matches!(err, ResolverError::Transformer(_)));
    }

    #[test]
    fn test_unknown_feature_in_config_is_rejected() {
        let parsed: std::result::Result<TransformerSettings, _> =
            toml::from_str("[features]\nfast-mode = true\n");
        assert!(parsed.is_err());

        let parsed: TransformerSettings = toml::from_str(
            "[features]\nvalidating = true\n\n[parameters]\ntitle = \"Report\"\n",
        )
        .unwrap();
        assert_eq!(parsed.feature(TransformerFeature::Validating), Some(true));
        assert_eq!(parsed.parameters.get("title").map(String::as_str), Some("Report"));
    }

    #[test]
    fn test_unit_options() {
        let base = UnitOptions {
            policy: ResolutionPolicy::Strict,
            validating: true,
            xinclude_aware: false,
        };
        let mut settings = TransformerSettings::default();
        assert_eq!(settings.unit_options(base), base);

        settings.set_feature(TransformerFeature::XIncludeAware, true);
        settings.set_feature(TransformerFeature::Validating, false);
        let options = settings.unit_options(base);
        assert_eq!(options.policy, ResolutionPolicy::Strict);
        assert!(!options.validating);
        assert!(options.xinclude_aware);
    }

    #[tokio::test]
    async fn test_apply_uses_explicit_setters() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = Resolver::builder(temp_dir.path()).build().await.unwrap();

        let mut settings = TransformerSettings::default();
        settings.set_feature(TransformerFeature::SecureProcessing, true);
        settings.set_feature(TransformerFeature::XIncludeAware, true);
        settings.parameters.insert("title".to_string(), "Report".to_string());
        settings
            .output_properties
            .insert("indent".to_string(), "yes".to_string());

        let mut engine = RecordingEngine::default();
        settings.apply(&mut engine, &resolver).unwrap();
        assert_eq!(
            engine.calls,
            vec![
                "secure-processing=true",
                "xinclude-aware=true",
                "param title=Report",
                "output indent=yes",
            ]
        );
        assert!(engine.resolver.is_some());
        // The original view keeps its own options
        assert!(!resolver.options().xinclude_aware);
    }

    #[tokio::test]
    async fn test_apply_propagates_engine_errors() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = Resolver::builder(temp_dir.path()).build().await.unwrap();

        let mut settings = TransformerSettings::default();
        settings.set_feature(TransformerFeature::NamespaceAware, false);
        let mut engine = RecordingEngine::default();
        assert!(settings.apply(&mut engine, &resolver).is_err());
        assert!(engine.resolver.is_none());
    }

    #[test]
    fn test_feature_assignments() {
        assert_eq!(
            parse_feature_assignment("validating").unwrap(),
            (TransformerFeature::Validating, true)
        );
        assert_eq!(
            parse_feature_assignment("secure-processing=false").unwrap(),
            (TransformerFeature::SecureProcessing, false)
        );
        assert!(parse_feature_assignment("validating=maybe").is_err());
    }

    #[test]
    fn test_merge_overlays() {
        let mut base = TransformerSettings::default();
        base.set_feature(TransformerFeature::Validating, true);
        base.parameters.insert("a".to_string(), "1".to_string());

        let mut overlay = TransformerSettings::default();
        overlay.set_feature(TransformerFeature::Validating, false);
        overlay.parameters.insert("b".to_string(), "2".to_string());

        base.merge(&overlay);
        assert_eq!(base.feature(TransformerFeature::Validating), Some(false));
        assert_eq!(base.parameters.len(), 2);
    }
}
