use crate::config::RuntimeConfig;
use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_STATE_DIR: &str = "state-dir";
pub const ARG_PERSIST_SECRET: &str = "persist-secret";
pub const ARG_REFRESH_INTERVAL: &str = "refresh-interval";
pub const ARG_REFRESH_MARGIN: &str = "refresh-margin";
pub const ARG_ACCESS_TTL: &str = "access-ttl";

/// File inside the state directory that backs durable storage.
pub const LOCAL_STATE_FILE: &str = "local.json";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_URL)
                .long(ARG_API_URL)
                .help("Base URL of the credvault API, example: https://api.credvault.dev")
                .env("CREDVAULT_API_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_STATE_DIR)
                .long(ARG_STATE_DIR)
                .help("Directory holding the persisted session")
                .env("CREDVAULT_STATE_DIR")
                .default_value(".credvault")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_PERSIST_SECRET)
                .long(ARG_PERSIST_SECRET)
                .help("Secret the persisted session is encrypted with")
                .env("CREDVAULT_PERSIST_SECRET")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_INTERVAL)
                .long(ARG_REFRESH_INTERVAL)
                .help("Seconds between session monitor checks")
                .env("CREDVAULT_REFRESH_INTERVAL")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_MARGIN)
                .long(ARG_REFRESH_MARGIN)
                .help("Refresh this many seconds before the access cookie expires")
                .env("CREDVAULT_REFRESH_MARGIN")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Lifetime of the access cookie in seconds")
                .env("CREDVAULT_ACCESS_TTL")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub api_url: Option<String>,
    pub state_dir: PathBuf,
    pub persist_secret: Option<SecretString>,
    pub refresh_interval: Option<u64>,
    pub refresh_margin: Option<u64>,
    pub access_ttl: Option<u64>,
}

impl Options {
    /// # Errors
    /// Returns an error if the margin does not fit inside the access lifetime.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let options = Self {
            api_url: matches.get_one::<String>(ARG_API_URL).cloned(),
            state_dir: matches
                .get_one::<PathBuf>(ARG_STATE_DIR)
                .cloned()
                .unwrap_or_else(|| PathBuf::from(".credvault")),
            persist_secret: matches
                .get_one::<String>(ARG_PERSIST_SECRET)
                .map(|secret| SecretString::from(secret.clone())),
            refresh_interval: matches.get_one::<u64>(ARG_REFRESH_INTERVAL).copied(),
            refresh_margin: matches.get_one::<u64>(ARG_REFRESH_MARGIN).copied(),
            access_ttl: matches.get_one::<u64>(ARG_ACCESS_TTL).copied(),
        };

        if let (Some(margin), Some(ttl)) = (options.refresh_margin, options.access_ttl) {
            anyhow::ensure!(
                margin < ttl,
                "--{ARG_REFRESH_MARGIN} ({margin}s) must be shorter than --{ARG_ACCESS_TTL} ({ttl}s)"
            );
        }

        Ok(options)
    }

    #[must_use]
    pub fn local_state_path(&self) -> PathBuf {
        self.state_dir.join(LOCAL_STATE_FILE)
    }

    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            api_base_url: self.api_url.clone(),
            persist_secret: self.persist_secret.clone(),
            monitor_interval: self.refresh_interval.map(Duration::from_secs),
            access_ttl: self.access_ttl.map(Duration::from_secs),
            refresh_margin: self.refresh_margin.map(Duration::from_secs),
            ..RuntimeConfig::default()
        }
    }
}
