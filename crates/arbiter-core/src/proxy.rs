//! JSON-RPC over HTTP gateway.
//!
//! Every inbound body is inspected once. Any `tools/call` request object is
//! governed; other methods and bodies that are not JSON are forwarded
//! byte-for-byte. Denied calls and tool calls without a usable name are
//! answered here and never reach the backend.

use arbiter_trust::CREDENTIAL_HEADER;
use axum::body::{to_bytes, Body, Bytes};
use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

use crate::error::ProxyError;
use crate::governance::{GovernanceInterceptor, ToolCall};
use crate::jsonrpc::{classify, denial_response, error_response, Inbound};
use crate::session::TokenSession;

/// Inbound bodies larger than this are refused.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Connection-scoped headers (RFC 9110 §7.6.1) plus ones the HTTP client recomputes.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub struct ProxyGateway {
    interceptor: Arc<GovernanceInterceptor>,
    session: Arc<TokenSession>,
    client: Client,
    backend_url: Url,
}

impl ProxyGateway {
    pub fn new(
        backend_url: Url,
        timeout: Duration,
        session: Arc<TokenSession>,
        interceptor: Arc<GovernanceInterceptor>,
    ) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ProxyError::Backend)?;

        Ok(Self {
            interceptor,
            session,
            client,
            backend_url,
        })
    }

    pub fn backend_url(&self) -> &Url {
        &self.backend_url
    }

    /// Govern `body` if it is a tool call, then forward or deny.
    pub async fn handle(&self, headers: HeaderMap, body: Bytes) -> Result<Response, ProxyError> {
        let (id, params) = match classify(&body) {
            Inbound::Passthrough => return self.forward(&headers, body).await,
            Inbound::Invalid { id, code, message } => {
                tracing::warn!(event = "tool_call_rejected", id = %id, code, "{}", message);
                return Ok(reply(error_response(id, code, &message)));
            }
            Inbound::ToolCall { id, params } => (id, params),
        };

        let call = ToolCall::from_value(params.name, params.arguments);
        let verdict = self.interceptor.decide(&call).await;
        if !verdict.proceed {
            return Ok(reply(denial_response(id, &verdict.denial(&call.name))));
        }

        self.forward(&headers, body).await
    }

    /// POST `body` unchanged to the backend with the session credential attached.
    pub async fn forward(&self, headers: &HeaderMap, body: Bytes) -> Result<Response, ProxyError> {
        let mut outbound = strip_hop_by_hop(headers);
        outbound.remove(CREDENTIAL_HEADER);
        match self.session.credential().await {
            Some(credential) => match HeaderValue::from_str(credential.token()) {
                Ok(value) => {
                    outbound.insert(HeaderName::from_static(CREDENTIAL_HEADER), value);
                }
                Err(_) => tracing::warn!("credential is not a valid header value, not attached"),
            },
            None => tracing::warn!("session not connected, forwarding without credential"),
        }

        let resp = self
            .client
            .post(self.backend_url.clone())
            .headers(outbound)
            .body(body)
            .send()
            .await
            .map_err(ProxyError::Backend)?;

        let status = resp.status();
        let resp_headers = strip_hop_by_hop(resp.headers());
        let bytes = resp.bytes().await.map_err(ProxyError::Backend)?;

        let mut out = Response::new(Body::from(bytes));
        *out.status_mut() = status;
        *out.headers_mut() = resp_headers;
        Ok(out)
    }

    /// Every path and method lands in [`ProxyGateway::handle`].
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().fallback(proxy_handler).with_state(self)
    }

    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            event = "proxy_listening",
            addr = %addr,
            backend = %self.backend_url,
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn proxy_handler(State(gateway): State<Arc<ProxyGateway>>, headers: HeaderMap, body: Body) -> Response {
    let result = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => gateway.handle(headers, bytes).await,
        Err(e) => Err(ProxyError::Body(e.to_string())),
    };

    result.unwrap_or_else(|err| {
        tracing::warn!(code = err.code(), "{}", err);
        err.into_response()
    })
}

fn reply(body: serde_json::Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    // Headers named in `Connection` are connection-scoped too.
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let n = name.as_str();
        if HOP_BY_HOP.contains(&n) || named.iter().any(|c| c == n) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
