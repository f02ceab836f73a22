//! Trust boundary for governed tool calls.
//!
//! The tool-serving side uses this crate to authenticate the credential that
//! the gateway attaches to forwarded requests:
//!
//! - [`TrustValidator`] verifies compact JWS tokens (RS256 / ES256) against a
//!   published key set, tolerating key rotation with a single forced refetch.
//! - [`TrustValidator::as_middleware`] guards an axum router with it.
//! - [`SignatureVerifier`] is the crypto seam; [`JwtVerifier`] is the default.
//!
//! ```no_run
//! use std::sync::Arc;
//! use arbiter_trust::{TrustConfig, TrustValidator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let validator = Arc::new(TrustValidator::new(TrustConfig::from_env())?);
//! validator.init().await?;
//! let app = validator.as_middleware(axum::Router::<()>::new());
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod config;
pub mod error;
pub mod jwks;
pub mod middleware;
pub mod validation;
pub mod verifier;

pub use claims::Claims;
pub use config::{TrustConfig, CREDENTIAL_HEADER};
pub use error::{codes, TrustError, TrustResult};
pub use jwks::{Jwk, JwksClient, SigningKeySet};
pub use middleware::error_response;
pub use validation::TrustValidator;
pub use verifier::{JwtVerifier, SignatureVerifier, SigningAlgorithm};
