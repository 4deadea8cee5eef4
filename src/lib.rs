//! Client side of the credvault credential manager.
//!
//! ## Core Session Flows
//!
//! ### Reactive refresh
//!
//! 1. **Detect:** A call through [`http::HttpClient`] receives `401` with code
//!    `TOKEN_EXPIRED`.
//! 2. **Coalesce:** The first such response starts one `POST /auth/refresh`; every
//!    other expired call parks on the same flight.
//! 3. **Replay:** When the refresh settles, parked calls retry once (success) or
//!    fail with [`ApiError::SessionEnded`] (failure).
//!
//! ### Terminal failures
//!
//! `SESSION_EXPIRED`, `NO_TOKEN`, `INVALID_TOKEN`, a failed refresh, or an expired
//! token on an already retried call run the forced logout exactly once: storage is
//! wiped, cookies dropped, and the navigator is sent to the login route with
//! `expired=1`.
//!
//! ### Persistence
//!
//! Only a whitelisted identity snapshot is written, sealed with ChaCha20-Poly1305.
//! Rehydration never fails: a corrupted blob is removed and the client starts
//! signed out.
//!
//! Nothing in this crate logs cookies, passwords, or the persistence secret.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod http;
pub mod persist;

#[cfg(test)]
pub(crate) mod testing;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub(crate) mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub use app::{App, AppParts};
pub use config::ClientConfig;
pub use error::ApiError;

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub(crate) static APP_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
