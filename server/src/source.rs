//! Token source loaders.
//!
//! A loader turns a source descriptor (a file path or a URL) into raw bytes.
//! Loaders know nothing about the payload format; parsing happens in the
//! watcher.
//!
//! # Pre-conditions
//! - Loaders must tolerate being called repeatedly, from a background task,
//!   concurrently with loaders for other sources.
//!
//! # Post-conditions
//! - A successful load returns the complete payload; partial reads are errors.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Error returned when a source cannot be read.
#[derive(Debug)]
pub enum LoadError {
    /// Reading a local file failed.
    Io {
        /// The descriptor that was being loaded.
        descriptor: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The HTTP request could not be completed.
    Http {
        /// The descriptor that was being loaded.
        descriptor: String,
        /// Description of the transport failure.
        message: String,
    },
    /// The HTTP server answered with a non-success status.
    Status {
        /// The descriptor that was being loaded.
        descriptor: String,
        /// The HTTP status code.
        status: u16,
    },
}

impl LoadError {
    /// The descriptor the failed load was for.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        match self {
            Self::Io { descriptor, .. }
            | Self::Http { descriptor, .. }
            | Self::Status { descriptor, .. } => descriptor,
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { descriptor, source } => write!(f, "failed to read {descriptor}: {source}"),
            Self::Http {
                descriptor,
                message,
            } => write!(f, "failed to fetch {descriptor}: {message}"),
            Self::Status { descriptor, status } => {
                write!(f, "failed to fetch {descriptor}: HTTP status {status}")
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Http { .. } | Self::Status { .. } => None,
        }
    }
}

/// Supplies the raw bytes of a token source.
pub trait SourceLoader: Send + Sync {
    /// Load the full payload named by `descriptor`.
    ///
    /// # Errors
    /// Returns `LoadError` if the source is unreachable or unreadable.
    fn load(&self, descriptor: &str) -> impl Future<Output = Result<Vec<u8>, LoadError>> + Send;
}

impl<L: SourceLoader> SourceLoader for Arc<L> {
    fn load(&self, descriptor: &str) -> impl Future<Output = Result<Vec<u8>, LoadError>> + Send {
        L::load(self, descriptor)
    }
}

/// Reads tokens from the local filesystem.
///
/// Accepts plain paths and `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    fn path(descriptor: &str) -> PathBuf {
        PathBuf::from(descriptor.strip_prefix("file://").unwrap_or(descriptor))
    }
}

impl SourceLoader for FileLoader {
    async fn load(&self, descriptor: &str) -> Result<Vec<u8>, LoadError> {
        tokio::fs::read(Self::path(descriptor))
            .await
            .map_err(|source| LoadError::Io {
                descriptor: descriptor.to_string(),
                source,
            })
    }
}

/// Fetches tokens over HTTP(S) with a plain `GET`.
#[derive(Debug, Clone)]
pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a loader whose requests give up after `timeout`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be initialized (for example,
    /// when no TLS backend is available).
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create a loader on top of an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl SourceLoader for HttpLoader {
    async fn load(&self, descriptor: &str) -> Result<Vec<u8>, LoadError> {
        let http_error = |e: reqwest::Error| LoadError::Http {
            descriptor: descriptor.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(descriptor).send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                descriptor: descriptor.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(http_error)?;
        Ok(body.to_vec())
    }
}

/// Picks a loader from the descriptor: `http://` and `https://` go over the
/// network, anything else is read from disk.
#[derive(Debug, Clone)]
pub struct AnySourceLoader {
    file: FileLoader,
    http: HttpLoader,
}

impl AnySourceLoader {
    /// Create a dispatching loader with the given HTTP timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(http_timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            file: FileLoader,
            http: HttpLoader::new(http_timeout)?,
        })
    }

    fn is_remote(descriptor: &str) -> bool {
        descriptor.starts_with("http://") || descriptor.starts_with("https://")
    }
}

impl SourceLoader for AnySourceLoader {
    async fn load(&self, descriptor: &str) -> Result<Vec<u8>, LoadError> {
        if Self::is_remote(descriptor) {
            self.http.load(descriptor).await
        } else {
            self.file.load(descriptor).await
        }
    }
}
