//! Values exchanged between the resolver and the components that consume it: requests,
//! opened sources and the parser-ready document source.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt};
use url::Url;

use crate::error::{ResolverError, Result};
use crate::http_client::AsyncHttpClient;
use crate::resolver::EntityResolver;
use crate::resources::{RESOURCE_SCHEME, ResourceRegistry};

/// Readable byte content of a resolved source
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Already decoded character content
pub type CharacterStream = Box<dyn AsyncBufRead + Send + Unpin>;

/// One resolution call. `system_id` is what gets resolved; everything else is context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Type of reference, e.g. `http://www.w3.org/2001/XMLSchema`
    pub kind: Option<String>,
    pub namespace_uri: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub base_uri: Option<String>,
}

impl ResolutionRequest {
    pub fn new(system_id: impl Into<String>) -> Self {
        Self {
            system_id: Some(system_id.into()),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_namespace(mut self, namespace_uri: impl Into<String>) -> Self {
        self.namespace_uri = Some(namespace_uri.into());
        self
    }

    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }
}

/// An opened resolution result. The caller owns the stream; dropping it closes it.
pub struct ResolvedSource {
    system_id: Url,
    public_id: Option<String>,
    encoding: Option<String>,
    stream: ByteStream,
}

impl ResolvedSource {
    pub fn new(system_id: Url, stream: ByteStream) -> Self {
        Self {
            system_id,
            public_id: None,
            encoding: None,
            stream,
        }
    }

    pub fn with_public_id(mut self, public_id: Option<String>) -> Self {
        self.public_id = public_id;
        self
    }

    pub fn with_encoding(mut self, encoding: Option<String>) -> Self {
        self.encoding = encoding;
        self
    }

    /// System ID actually used, after any catalog redirection
    pub fn system_id(&self) -> &Url {
        &self.system_id
    }

    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn into_reader(self) -> ByteStream {
        self.stream
    }

    /// Read the whole stream into memory
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.stream.read_to_end(&mut data).await?;
        Ok(data)
    }
}

impl fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("system_id", &self.system_id.as_str())
            .field("public_id", &self.public_id)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

/// Input handed to schema validators for an imported schema document
pub struct ResourceInput {
    pub byte_stream: Option<ByteStream>,
    pub character_stream: Option<CharacterStream>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub base_uri: Option<String>,
    pub encoding: Option<String>,
}

impl ResourceInput {
    pub fn from_source(source: ResolvedSource, base_uri: Option<String>) -> Self {
        Self {
            public_id: source.public_id,
            system_id: Some(source.system_id.to_string()),
            encoding: source.encoding,
            base_uri,
            character_stream: None,
            byte_stream: Some(source.stream),
        }
    }

    /// Read the content as text. The character stream takes precedence over the byte
    /// stream; bytes are decoded as UTF-8.
    pub async fn read_to_string(self) -> Result<String> {
        let mut text = String::new();
        if let Some(mut characters) = self.character_stream {
            characters.read_to_string(&mut text).await?;
        } else if let Some(mut bytes) = self.byte_stream {
            let mut data = Vec::new();
            bytes.read_to_end(&mut data).await?;
            text = String::from_utf8_lossy(&data).into_owned();
        }
        Ok(text)
    }
}

impl fmt::Debug for ResourceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceInput")
            .field("byte_stream", &self.byte_stream.is_some())
            .field("character_stream", &self.character_stream.is_some())
            .field("public_id", &self.public_id)
            .field("system_id", &self.system_id)
            .field("base_uri", &self.base_uri)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Parser configuration carried by a [`DocumentSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub namespace_aware: bool,
    pub validating: bool,
    pub xinclude_aware: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            namespace_aware: true,
            validating: false,
            xinclude_aware: false,
        }
    }
}

/// Parseable source for an included or imported document.
///
/// Nested references inside the document resolve through `entity_resolver`, the same
/// resolver view that produced this source.
pub struct DocumentSource {
    pub source: ResolvedSource,
    pub options: ParseOptions,
    pub entity_resolver: Arc<dyn EntityResolver>,
}

impl DocumentSource {
    pub fn system_id(&self) -> &Url {
        self.source.system_id()
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSource")
            .field("source", &self.source)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Opens located URLs: `file:` from disk, `http(s):` over the network, `resource:` from
/// the packaged registry.
#[derive(Clone)]
pub struct SourceOpener {
    http_client: AsyncHttpClient,
    resources: Arc<ResourceRegistry>,
}

impl SourceOpener {
    pub fn new(http_client: AsyncHttpClient, resources: Arc<ResourceRegistry>) -> Self {
        Self {
            http_client,
            resources,
        }
    }

    pub async fn open(&self, url: &Url) -> Result<ResolvedSource> {
        let open_error = |details: String| ResolverError::Open {
            system_id: url.to_string(),
            details,
        };

        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| open_error("not a local file path".to_string()))?;
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| open_error(e.to_string()))?;
                Ok(ResolvedSource::new(url.clone(), Box::new(file)))
            }
            "http" | "https" => {
                let document = self
                    .http_client
                    .fetch(url.as_str())
                    .await
                    .map_err(|e| open_error(e.to_string()))?;
                Ok(ResolvedSource::new(url.clone(), Box::new(Cursor::new(document.data)))
                    .with_encoding(document.encoding))
            }
            RESOURCE_SCHEME => {
                let name = ResourceRegistry::resource_name(url).unwrap_or_default();
                let data = self
                    .resources
                    .read(name)
                    .await
                    .map_err(|e| open_error(e.to_string()))?
                    .ok_or_else(|| open_error("packaged resource not found".to_string()))?;
                Ok(ResolvedSource::new(url.clone(), Box::new(Cursor::new(data))))
            }
            other => Err(ResolverError::UnsupportedScheme {
                scheme: other.to_string(),
                uri: url.to_string(),
            }),
        }
    }
}
