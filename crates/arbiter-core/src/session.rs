//! Authenticated session against the decision service.
//!
//! A [`TokenSession`] exchanges the long-lived API key for a short-lived
//! [`Credential`], keeps it fresh from a background task, and signals
//! liveness from a second one. Both tasks belong to the session: they are
//! aborted together on [`TokenSession::destroy`], on reconnect, and on drop.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Response};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::api::{ConfirmRequest, ConfirmResponse, Decision, GovernRequest, GovernanceApi, Outcome};
use crate::config::SessionConfig;
use crate::credential::{Credential, TokenResponse};
use crate::error::{SessionError, SessionResult};

const USER_AGENT: &str = concat!("arbiter/", env!("CARGO_PKG_VERSION"));

/// Error bodies are truncated to this many bytes in messages.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug)]
enum SessionState {
    Idle,
    Connected(Arc<Credential>),
    Destroyed,
}

#[derive(Default)]
struct Tasks {
    refresh: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for handle in [self.refresh.take(), self.heartbeat.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

struct Inner {
    config: SessionConfig,
    client: Client,
    state: RwLock<SessionState>,
}

pub struct TokenSession {
    inner: Arc<Inner>,
    tasks: Mutex<Tasks>,
}

impl TokenSession {
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SessionError::Network {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                state: RwLock::new(SessionState::Idle),
            }),
            tasks: Mutex::new(Tasks::default()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Exchange the API key for a credential and (re)start refresh and heartbeat.
    ///
    /// Calling this on a connected session replaces the credential and
    /// restarts both background tasks.
    pub async fn connect(&self) -> SessionResult<()> {
        if matches!(*self.inner.state.read().await, SessionState::Destroyed) {
            return Err(SessionError::Destroyed);
        }

        let credential = self.inner.exchange().await?;
        self.inner.store(credential.clone()).await?;

        let delay = credential.refresh_delay(Utc::now(), self.inner.config.refresh_margin);
        {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.abort_all();
            tasks.refresh = Some(tokio::spawn(refresh_loop(self.inner.clone(), delay)));
            tasks.heartbeat = Some(tokio::spawn(heartbeat_loop(self.inner.clone())));
        }

        tracing::info!(
            event = "session_connected",
            expires_at = %credential.expires_at(),
            refresh_in = ?delay,
        );
        Ok(())
    }

    /// Cancel background work and drop the credential. Safe to call repeatedly.
    pub async fn destroy(&self) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();

        let mut state = self.inner.state.write().await;
        if !matches!(*state, SessionState::Destroyed) {
            *state = SessionState::Destroyed;
            tracing::info!(event = "session_destroyed");
        }
    }

    /// Current credential, if connected.
    pub async fn credential(&self) -> Option<Arc<Credential>> {
        match &*self.inner.state.read().await {
            SessionState::Connected(c) => Some(c.clone()),
            _ => None,
        }
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.inner.state.read().await, SessionState::Connected(_))
    }

    /// Authenticated JSON call. An empty response body yields `Value::Null`.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> SessionResult<Value> {
        self.inner.request(method, path, body).await
    }

    pub async fn govern(&self, action: &str, context: &Map<String, Value>) -> SessionResult<Decision> {
        let body = serde_json::to_value(GovernRequest {
            action,
            context,
            blocking: true,
        })
        .map_err(invalid_response)?;
        let value = self.request(Method::POST, "/v1/govern", Some(&body)).await?;
        serde_json::from_value(value).map_err(invalid_response)
    }

    pub async fn confirm(&self, event_id: &str, outcome: Outcome, metadata: Value) -> SessionResult<bool> {
        let body = serde_json::to_value(ConfirmRequest {
            event_id,
            result: outcome,
            metadata,
        })
        .map_err(invalid_response)?;
        let value = self.request(Method::POST, "/v1/confirm", Some(&body)).await?;
        if value.is_null() {
            return Ok(false);
        }
        let resp: ConfirmResponse = serde_json::from_value(value).map_err(invalid_response)?;
        Ok(resp.acknowledged)
    }
}

impl Drop for TokenSession {
    fn drop(&mut self) {
        self.tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
    }
}

#[async_trait]
impl GovernanceApi for TokenSession {
    async fn govern(&self, action: &str, context: &Map<String, Value>) -> SessionResult<Decision> {
        TokenSession::govern(self, action, context).await
    }

    async fn confirm(&self, event_id: &str, outcome: Outcome, metadata: Value) -> SessionResult<bool> {
        TokenSession::confirm(self, event_id, outcome, metadata).await
    }
}

impl Inner {
    async fn exchange(&self) -> SessionResult<Credential> {
        let timeout = self.config.request_timeout;
        let resp = self
            .client
            .post(self.config.endpoint("/v1/auth/token"))
            .json(&json!({ "api_key": self.config.api_key }))
            .send()
            .await
            .map_err(|e| SessionError::from_reqwest(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = error_body(resp).await;
            return Err(SessionError::Authentication {
                message: format!("HTTP {status}: {body}"),
            });
        }

        let issued: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SessionError::InvalidResponse {
                message: format!("token response: {e}"),
            })?;

        Credential::new(
            issued.token,
            issued.expires_at.to_datetime()?,
            Utc::now(),
            self.config.max_credential_lifetime,
        )
    }

    /// Swap in a new credential unless the session was destroyed meanwhile.
    async fn store(&self, credential: Credential) -> SessionResult<()> {
        let mut state = self.state.write().await;
        if matches!(*state, SessionState::Destroyed) {
            return Err(SessionError::Destroyed);
        }
        *state = SessionState::Connected(Arc::new(credential));
        Ok(())
    }

    async fn bearer(&self) -> SessionResult<String> {
        match &*self.state.read().await {
            SessionState::Idle => Err(SessionError::NotConnected),
            SessionState::Destroyed => Err(SessionError::Destroyed),
            SessionState::Connected(c) => Ok(c.token().to_string()),
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> SessionResult<Response> {
        let token = self.bearer().await?;
        let timeout = self.config.request_timeout;

        let mut req = self
            .client
            .request(method, self.config.endpoint(path))
            .bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SessionError::from_reqwest(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SessionError::Api {
                status: status.as_u16(),
                message: error_body(resp).await,
            });
        }
        Ok(resp)
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> SessionResult<Value> {
        let timeout = self.config.request_timeout;
        let bytes = self
            .send(method, path, body)
            .await?
            .bytes()
            .await
            .map_err(|e| SessionError::from_reqwest(e, timeout))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(invalid_response)
    }
}

async fn refresh_loop(inner: Arc<Inner>, first_delay: Duration) {
    let margin = inner.config.refresh_margin;
    let backoff = inner.config.refresh_retry_backoff;
    let mut delay = first_delay;

    loop {
        tokio::time::sleep(delay).await;

        let refreshed = match inner.exchange().await {
            Ok(credential) => inner.store(credential.clone()).await.map(|()| credential),
            Err(e) => Err(e),
        };

        delay = match refreshed {
            Ok(credential) => {
                let next = credential.refresh_delay(Utc::now(), margin);
                tracing::info!(
                    event = "credential_refreshed",
                    expires_at = %credential.expires_at(),
                    refresh_in = ?next,
                );
                next
            }
            Err(SessionError::Destroyed) => return,
            Err(e) => {
                tracing::warn!(
                    event = "credential_refresh_failed",
                    code = e.code(),
                    retry_in = ?backoff,
                    "{}",
                    e
                );
                backoff
            }
        };
    }
}

async fn heartbeat_loop(inner: Arc<Inner>) {
    let period = inner.config.heartbeat_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match inner.send(Method::POST, "/v1/heartbeat", None).await {
            Ok(_) => {}
            Err(SessionError::Destroyed) => return,
            Err(e) => tracing::debug!(event = "heartbeat_failed", code = e.code(), "{}", e),
        }
    }
}

async fn error_body(resp: Response) -> String {
    let mut text = resp.text().await.unwrap_or_default();
    if text.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

fn invalid_response(e: serde_json::Error) -> SessionError {
    SessionError::InvalidResponse {
        message: e.to_string(),
    }
}
