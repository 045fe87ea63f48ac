use std::io::Error as IoError;
use std::io::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// A chunk-level read failed; `op` labels the decode step so the flow
    /// log can attribute the failure without losing the cause.
    #[error("{op}: {source}")]
    Chunk {
        op: &'static str,
        #[source]
        source: IoError,
    },

    #[error("AMF decode error: {0}")]
    AmfDecode(String),

    #[error("AMF encode error: {0}")]
    AmfEncode(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Wrap an IO failure with the decode operation that hit it.
    pub fn chunk(op: &'static str, source: IoError) -> Self {
        Error::Chunk { op, source }
    }

    /// Create an AMF decode error
    pub fn amf_decode(msg: impl Into<String>) -> Self {
        Error::AmfDecode(msg.into())
    }

    /// Create an AMF encode error
    pub fn amf_encode(msg: impl Into<String>) -> Self {
        Error::AmfEncode(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// True for clean end-of-stream, directly or wrapped in a chunk label.
    ///
    /// Async `read_exact` reports end-of-stream as `UnexpectedEof` whether
    /// the stream ends at a read boundary or mid-field, so a single kind
    /// check covers every layer.
    pub fn is_eof(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == ErrorKind::UnexpectedEof,
            Error::Chunk { source, .. } => source.kind() == ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
