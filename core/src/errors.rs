use thiserror::Error;

/// Errors surfaced by the registry, codec, signing engine and stores.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("malformed key material: {0}")]
    Decode(String),
    #[error("unsupported algorithm: {0}")]
    Configuration(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("chain broken at counter {counter}: {violation}")]
    ChainBroken { counter: u64, violation: ChainViolation },
}

impl SigningError {
    /// Whether the error stems from corrupted state or storage rather than the caller's input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            SigningError::Decode(_)
                | SigningError::Configuration(_)
                | SigningError::Internal(_)
                | SigningError::ChainBroken { .. }
        )
    }
}

/// Ways a stored signature chain can fail an audit.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChainViolation {
    #[error("counter not contiguous")]
    CounterGap,
    #[error("signed payload does not carry its counter")]
    CounterMismatch,
    #[error("previous signature link mismatch")]
    LinkMismatch,
    #[error("signature base64")]
    MalformedSignature,
    #[error("invalid signature")]
    InvalidSignature,
}
