use crate::{
    auth::{AuthSnapshot, AuthState},
    cli::commands::client::Options,
    config::ClientConfig,
    persist::{FileStorage, PersistPipeline},
};
use anyhow::{Context, Result};
use std::{fmt::Write as _, sync::Arc};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub options: Options,
}

/// Prints the persisted session. Never touches the network.
/// # Errors
/// Returns an error if the state file cannot be opened.
pub fn execute(args: &Args) -> Result<()> {
    let config = ClientConfig::with_overrides(args.options.runtime_config());
    let state = load_state(&args.options, &config)?;
    print!("{}", render(&config, &state));
    Ok(())
}

fn load_state(options: &Options, config: &ClientConfig) -> Result<AuthState> {
    let path = options.local_state_path();
    debug!(path = %path.display(), "reading persisted session");

    let storage = FileStorage::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let pipeline =
        PersistPipeline::sealed(Arc::new(storage), &config.storage_key, &config.persist_secret);

    Ok(AuthState::from(pipeline.rehydrate::<AuthSnapshot>()))
}

fn render(config: &ClientConfig, state: &AuthState) -> String {
    let mut out = String::new();
    let api = if config.api_base_url.is_empty() {
        "(not configured)"
    } else {
        config.api_base_url.as_str()
    };
    let _ = writeln!(out, "api:     {api}");

    match (&state.user, state.is_authenticated) {
        (Some(user), true) => {
            let _ = writeln!(out, "session: signed in");
            let _ = writeln!(out, "user:    {} <{}>", user.name, user.email);
            let _ = writeln!(out, "role:    {}", user.role);
            let _ = writeln!(
                out,
                "verified: {}",
                if user.is_verified { "yes" } else { "no" }
            );
            if let Some(last_login) = &user.last_login {
                let _ = writeln!(out, "last login: {last_login}");
            }
        }
        _ => {
            let _ = writeln!(out, "session: signed out");
        }
    }

    if config.uses_insecure_secret() {
        let _ = writeln!(out, "warning: persisted state uses the built-in secret");
    }
    out
}
