//! Error types for inbound credential verification.

use axum::http::StatusCode;

/// Stable machine codes. Callers branch on these, never on message text.
pub mod codes {
    pub const INVALID_JWT: &str = "INVALID_JWT";
    pub const INVALID_SIGNATURE: &str = "INVALID_SIGNATURE";
    pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
    pub const KEY_NOT_FOUND: &str = "KEY_NOT_FOUND";
    pub const UNSUPPORTED_ALG: &str = "UNSUPPORTED_ALG";
    pub const MISSING_TOKEN: &str = "MISSING_TOKEN";
    pub const JWKS_FETCH_FAILED: &str = "JWKS_FETCH_FAILED";
}

/// Verification errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    /// Token is not a well-formed compact JWS or its header is incomplete.
    #[error("invalid token format: {reason}")]
    InvalidFormat { reason: String },

    /// Signature did not verify against the resolved key.
    #[error("invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// `exp` claim is not strictly in the future.
    #[error("token expired at {exp}")]
    TokenExpired { exp: i64 },

    /// No key with this id, even after a forced key set refetch.
    #[error("signing key not found: {kid}")]
    KeyNotFound { kid: String },

    /// Header names an algorithm other than RS256 / ES256.
    #[error("unsupported algorithm: {alg}")]
    UnsupportedAlgorithm { alg: String },

    /// Credential header absent from the inbound request.
    #[error("missing credential header '{header}'")]
    MissingToken { header: String },

    /// Key set endpoint unreachable or returned garbage.
    #[error("failed to fetch signing keys: {message}")]
    JwksFetchFailed { message: String },
}

impl TrustError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    pub(crate) fn signature(reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            reason: reason.into(),
        }
    }

    pub(crate) fn fetch(message: impl Into<String>) -> Self {
        Self::JwksFetchFailed {
            message: message.into(),
        }
    }

    /// Stable machine code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => codes::INVALID_JWT,
            Self::InvalidSignature { .. } => codes::INVALID_SIGNATURE,
            Self::TokenExpired { .. } => codes::TOKEN_EXPIRED,
            Self::KeyNotFound { .. } => codes::KEY_NOT_FOUND,
            Self::UnsupportedAlgorithm { .. } => codes::UNSUPPORTED_ALG,
            Self::MissingToken { .. } => codes::MISSING_TOKEN,
            Self::JwksFetchFailed { .. } => codes::JWKS_FETCH_FAILED,
        }
    }

    /// HTTP status used when the error crosses a request boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::JwksFetchFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Result type for verification operations.
pub type TrustResult<T> = Result<T, TrustError>;
