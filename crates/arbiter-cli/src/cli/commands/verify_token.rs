use anyhow::Context;
use arbiter_core::ArbiterConfig;
use arbiter_trust::{TrustConfig, TrustError, TrustValidator};
use std::path::Path;

use crate::cli::args::VerifyTokenArgs;
use crate::exit_codes;

/// Prints the verified claims as JSON on stdout; the failure code goes to stderr.
pub async fn run(args: VerifyTokenArgs, config_path: Option<&Path>) -> anyhow::Result<i32> {
    let mut trust = match config_path {
        Some(path) => {
            ArbiterConfig::from_file(path)
                .context("failed to load configuration")?
                .trust
        }
        None => TrustConfig::from_env(),
    };
    if let Some(url) = args.jwks_url {
        trust.jwks_url = Some(url);
    }
    if trust.jwks_url.is_none() {
        anyhow::bail!("no signing key set location: pass --jwks-url or set ARBITER_JWKS_URL");
    }

    let validator = TrustValidator::new(trust)?;
    match validator.validate_token(args.token.trim()).await {
        Ok(claims) => {
            println!("{}", serde_json::to_string_pretty(&claims)?);
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}: {e}", e.code());
            Ok(match e {
                TrustError::JwksFetchFailed { .. } => exit_codes::UNAVAILABLE,
                _ => exit_codes::REJECTED,
            })
        }
    }
}
