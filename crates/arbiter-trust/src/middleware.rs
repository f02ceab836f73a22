//! axum integration for the tool-serving side of the trust boundary.

use axum::extract::{Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::error::TrustError;
use crate::validation::TrustValidator;
use crate::verifier::SignatureVerifier;

impl<V: SignatureVerifier> TrustValidator<V> {
    /// Guard every route of `router` with header validation.
    ///
    /// Valid requests continue with [`Claims`](crate::Claims) in their
    /// extensions; invalid ones are answered here with a structured error and
    /// never reach the inner service.
    pub fn as_middleware<S>(self: Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(from_fn_with_state(self, require_credential::<V>))
    }
}

async fn require_credential<V: SignatureVerifier>(
    State(validator): State<Arc<TrustValidator<V>>>,
    mut req: Request,
    next: Next,
) -> Response {
    match validator.validate_from_header(req.headers()).await {
        Ok(claims) => {
            tracing::debug!(
                sub = claims.sub.as_deref().unwrap_or("-"),
                tenant = claims.tenant_id.as_deref().unwrap_or("-"),
                "credential accepted"
            );
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(err) => {
            tracing::warn!(
                event = "credential_rejected",
                code = err.code(),
                path = %req.uri().path(),
                "{}",
                err
            );
            error_response(&err)
        }
    }
}

/// `{"error": {"code", "message"}}` with the error's HTTP status.
pub fn error_response(err: &TrustError) -> Response {
    let body = json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
        }
    });
    (err.status(), Json(body)).into_response()
}
