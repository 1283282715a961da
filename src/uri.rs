//! URI helpers shared by the catalog store, the resolution policy and the source locator.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use url::{ParseError, Url};

use crate::error::{ResolverError, Result};
use crate::resources::RESOURCE_SCHEME;

/// Cached regex for `file:` URIs carrying a bare drive letter
static DRIVE_LETTER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_drive_letter_regex() -> &'static Regex {
    DRIVE_LETTER_REGEX.get_or_init(|| {
        Regex::new(r"^file:([A-Za-z]):").expect("Failed to compile drive letter regex")
    })
}

/// Rewrite `file:D:/path` into `file:/D:/path` so it parses as a rooted URI.
///
/// Pure string transform, applied regardless of the host platform. Already rooted
/// URIs and anything that is not a `file:` URI come back unchanged.
pub fn escape_windows_drive_letter(uri: Option<&str>) -> Option<String> {
    uri.map(|uri| get_drive_letter_regex().replace(uri, "file:/${1}:").into_owned())
}

/// Scheme of an identifier as seen by the resolution policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierScheme {
    /// Relative reference, bare path or Windows drive path
    None,
    /// Explicit `file:` URI
    File,
    /// Any other scheme (`http`, `https`, `urn`, `ftp`, ...)
    Other(String),
    /// Could not be parsed as a URI reference
    Malformed,
}

/// Classify an identifier by its URI scheme.
pub fn classify(identifier: &str) -> IdentifierScheme {
    match Url::parse(identifier) {
        // `C:\schemas\a.xsd` parses with scheme "c"
        Ok(url) if url.scheme().len() == 1 => IdentifierScheme::None,
        Ok(url) if url.scheme() == "file" => IdentifierScheme::File,
        Ok(url) => IdentifierScheme::Other(url.scheme().to_string()),
        Err(ParseError::RelativeUrlWithoutBase) => IdentifierScheme::None,
        Err(_) => IdentifierScheme::Malformed,
    }
}

/// Parse an identifier that is already an absolute URI, ignoring drive-letter paths.
pub fn absolute_uri(identifier: &str) -> Option<Url> {
    Url::parse(identifier)
        .ok()
        .filter(|url| url.scheme().len() > 1)
}

/// Resolve a reference against a base URI.
///
/// `resource:` bases are opaque URLs, so a relative reference replaces the last path
/// segment of the resource name by hand.
pub fn join(base: &Url, reference: &str) -> std::result::Result<Url, ParseError> {
    if base.scheme() == RESOURCE_SCHEME && base.cannot_be_a_base() && absolute_uri(reference).is_none()
    {
        let name = match reference.strip_prefix('/') {
            Some(rooted) => rooted.to_string(),
            None => match base.path().rsplit_once('/') {
                Some((dir, _)) => format!("{}/{}", dir, reference),
                None => reference.to_string(),
            },
        };
        return Url::parse(&format!("{}:{}", RESOURCE_SCHEME, name));
    }
    base.join(reference)
}

/// Convert a filesystem path into a `file:` URL, anchoring relative paths at the
/// process working directory.
pub fn file_url(path: &Path) -> Result<Url> {
    let absolute = std::path::absolute(path)?;
    Url::from_file_path(&absolute).map_err(|_| ResolverError::InvalidUri {
        uri: absolute.display().to_string(),
        details: "path cannot be represented as a file URL".to_string(),
    })
}

/// Parse a caller-supplied base URI after drive-letter normalization.
///
/// Bare paths are accepted and turned into `file:` URLs; a trailing separator marks a
/// directory base.
pub fn parse_base_uri(base: &str) -> Result<Url> {
    let escaped = escape_windows_drive_letter(Some(base)).unwrap_or_default();
    match Url::parse(&escaped) {
        Ok(url) if url.scheme().len() > 1 => Ok(url),
        Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => {
            let absolute = std::path::absolute(Path::new(base))?;
            let url = if base.ends_with('/') || base.ends_with('\\') {
                Url::from_directory_path(&absolute)
            } else {
                Url::from_file_path(&absolute)
            };
            url.map_err(|_| ResolverError::InvalidBaseUri {
                uri: base.to_string(),
                details: "path cannot be represented as a file URL".to_string(),
            })
        }
        Err(e) => Err(ResolverError::InvalidBaseUri {
            uri: base.to_string(),
            details: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_upper_case_drive_letter() {
        assert_eq!(
            escape_windows_drive_letter(Some("file:D:/a/share/folder")),
            Some("file:/D:/a/share/folder".to_string())
        );
    }

    #[test]
    fn test_escape_lower_case_drive_letter() {
        assert_eq!(
            escape_windows_drive_letter(Some("file:z:/a/share/folder")),
            Some("file:/z:/a/share/folder".to_string())
        );
    }

    #[test]
    fn test_escape_none() {
        assert_eq!(escape_windows_drive_letter(None), None);
    }

    #[test]
    fn test_escape_is_noop_and_idempotent() {
        let normal = "file:/already/normal";
        assert_eq!(
            escape_windows_drive_letter(Some(normal)),
            Some(normal.to_string())
        );

        let once = escape_windows_drive_letter(Some("file:C:/x")).unwrap();
        let twice = escape_windows_drive_letter(Some(&once)).unwrap();
        assert_eq!(once, twice);

        assert_eq!(
            escape_windows_drive_letter(Some("http://example.com/D:/x")),
            Some("http://example.com/D:/x".to_string())
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("schemas/a.xsd"), IdentifierScheme::None);
        assert_eq!(classify("/abs/a.xsd"), IdentifierScheme::None);
        assert_eq!(classify("C:\\schemas\\a.xsd"), IdentifierScheme::None);
        assert_eq!(classify("file:///tmp/a.xsd"), IdentifierScheme::File);
        assert_eq!(
            classify("http://example.com/a.xsd"),
            IdentifierScheme::Other("http".to_string())
        );
        assert_eq!(
            classify("urn:publicid:-:TEST:DOC"),
            IdentifierScheme::Other("urn".to_string())
        );
        assert_eq!(classify("http://[broken/a.xsd"), IdentifierScheme::Malformed);
    }

    #[test]
    fn test_parse_base_uri() {
        let url = parse_base_uri("file:D:/work/schemas/main.xsd").unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/work/schemas/main.xsd"));

        let url = parse_base_uri("http://example.com/schemas/main.xsd").unwrap();
        assert_eq!(url.join("types.xsd").unwrap().as_str(), "http://example.com/schemas/types.xsd");

        let url = parse_base_uri("/work/schemas/").unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.as_str().ends_with("/work/schemas/"));

        let err = parse_base_uri("http://[broken/main.xsd").unwrap_err();
        assert!(matches!(err, ResolverError::InvalidBaseUri { .. }));
    }

    #[test]
    fn test_join_against_resource_base() {
        let base = Url::parse("resource:schemas/main.xsd").unwrap();
        assert_eq!(join(&base, "types.xsd").unwrap().as_str(), "resource:schemas/types.xsd");
        assert_eq!(join(&base, "/common/a.xsd").unwrap().as_str(), "resource:common/a.xsd");
        assert_eq!(
            join(&base, "http://example.com/a.xsd").unwrap().as_str(),
            "http://example.com/a.xsd"
        );

        let flat = Url::parse("resource:main.xsd").unwrap();
        assert_eq!(join(&flat, "types.xsd").unwrap().as_str(), "resource:types.xsd");

        let file = Url::parse("file:///work/schemas/main.xsd").unwrap();
        assert_eq!(
            join(&file, "types.xsd").unwrap().as_str(),
            "file:///work/schemas/types.xsd"
        );
    }

    #[test]
    fn test_absolute_uri_ignores_drive_letters() {
        assert!(absolute_uri("http://example.com/a.xsd").is_some());
        assert!(absolute_uri("C:/schemas/a.xsd").is_none());
        assert!(absolute_uri("schemas/a.xsd").is_none());
    }
}
