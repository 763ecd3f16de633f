//! Error types for ws-discovery.

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The message is well-formed XML but not a valid discovery message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The Action header names no operation of any registered protocol version.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// A protocol version was used without being registered.
    #[error("protocol version not registered: {0}")]
    UnknownVersion(&'static str),

    /// A scope match rule that cannot be evaluated locally.
    #[error("unsupported scope match rule: {0}")]
    UnsupportedScopeMatch(String),

    /// The message number counter of a sequence generator ran out.
    #[error("message numbers exhausted for instance {0}")]
    SequenceExhausted(u64),

    /// Sending or receiving over a channel failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation did not complete within its duration.
    #[error("operation timed out")]
    Timeout,

    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a malformed-message error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::Malformed(msg.into())
    }
}
