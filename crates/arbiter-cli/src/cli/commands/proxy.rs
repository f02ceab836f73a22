use anyhow::Context;
use arbiter_core::{
    ArbiterConfig, ConfigError, GovernanceInterceptor, ProxyGateway, TokenSession,
};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::cli::args::ProxyArgs;
use crate::exit_codes;

pub async fn run(args: ProxyArgs, config_path: Option<&Path>) -> anyhow::Result<i32> {
    let mut config = ArbiterConfig::load(config_path).context("failed to load configuration")?;
    if let Some(addr) = args.listen {
        config.proxy.listen_addr = addr;
    }
    if let Some(url) = args.backend {
        config.proxy.backend_url = Some(url);
    }
    if let Some(mode) = args.mode {
        config.governance.mode = mode;
    }
    let backend_url = config
        .proxy
        .backend_url
        .clone()
        .ok_or(ConfigError::Missing("ARBITER_BACKEND_URL"))?;

    let session = Arc::new(TokenSession::new(config.session.clone())?);
    if let Err(e) = session.connect().await {
        tracing::error!(code = e.code(), error = %e, "could not open governance session");
        return Ok(if e.is_retryable() {
            exit_codes::UNAVAILABLE
        } else {
            exit_codes::CONFIG_ERROR
        });
    }

    let interceptor = Arc::new(GovernanceInterceptor::new(
        session.clone(),
        config.governance.clone(),
    ));
    let gateway = Arc::new(ProxyGateway::new(
        backend_url,
        config.session.request_timeout,
        session.clone(),
        interceptor,
    )?);

    let listener = TcpListener::bind(config.proxy.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.proxy.listen_addr))?;
    tracing::info!(mode = %config.governance.mode, "governance proxy starting");

    let served = gateway.serve(listener, shutdown_signal()).await;
    session.destroy().await;
    served.context("proxy server failed")?;

    Ok(exit_codes::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable; stop the process to exit");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
