//! Retrieval errors.

use thiserror::Error;

/// Boxed error returned by post-processors and transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Connection could not be established; the host is reported to the
    /// network status
    #[error("Host unreachable for {url}: {message}")]
    HostUnreachable { url: String, message: String },

    /// Connect or read timed out
    #[error("Timed out retrieving {url}")]
    Timeout { url: String },

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// I/O failure while reading the body
    #[error("I/O error retrieving {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Request failed for another transport reason
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Zipped payload could not be expanded
    #[error("Cannot unzip payload from {url}: {message}")]
    Unzip { url: String, message: String },

    /// The post-processor rejected the retrieved data
    #[error("Post-processing {url} failed: {source}")]
    PostProcess {
        url: String,
        #[source]
        source: BoxError,
    },

    /// A local source failed to produce the tile
    #[error("Cannot compose {url}: {message}")]
    Compose { url: String, message: String },

    /// The retriever could not be built
    #[error("Cannot create retriever: {0}")]
    Create(String),
}

impl RetrievalError {
    /// Whether the failure is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the failure indicates the host could not be reached.
    pub fn is_host_unreachable(&self) -> bool {
        matches!(self, Self::HostUnreachable { .. })
    }
}

/// Errors reported by an [`HttpTransport`](super::HttpTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
