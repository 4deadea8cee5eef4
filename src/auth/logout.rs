//! Forced logout: the terminal, idempotent sink for every unrecoverable auth
//! failure. The first caller runs the whole sequence; anyone arriving while it
//! is in progress (including a 401 produced by the logout call itself) is a
//! no-op until the next successful login re-arms it.

use super::refresh::RefreshState;
use crate::{config::expired_route, error::ErrorEnvelope, http::CookieJar, persist::Storage};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::{debug, info, warn};

/// Session-scoped key carrying the reason for the last forced logout.
pub const LOGOUT_REASON_KEY: &str = "credvault:logout-reason";

/// Phrases the API uses when a newer login invalidated this session.
const ELSEWHERE_MARKERS: [&str; 4] = [
    "logged in elsewhere",
    "signed in elsewhere",
    "another device",
    "another session",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogoutReason {
    /// Generic expiry or invalid credential.
    SessionExpired,
    /// The credential was invalidated by a concurrent login elsewhere.
    LoggedInElsewhere,
}

impl LogoutReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionExpired => "session_expired",
            Self::LoggedInElsewhere => "logged_in_elsewhere",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "session_expired" => Some(Self::SessionExpired),
            "logged_in_elsewhere" => Some(Self::LoggedInElsewhere),
            _ => None,
        }
    }

    /// Message shown on the login screen after the redirect.
    #[must_use]
    pub fn notice(self) -> &'static str {
        match self {
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::LoggedInElsewhere => {
                "You were signed out because your account was signed in elsewhere."
            }
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Hard navigation target. In a browser this replaces the page; natively the
/// embedder decides (the CLI shell re-bootstraps the app).
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

pub struct ForcedLogout {
    local: Arc<dyn Storage>,
    session: Arc<dyn Storage>,
    cookies: Option<Arc<CookieJar>>,
    navigator: Arc<dyn Navigator>,
    refresh_state: Arc<RefreshState>,
    login_route: String,
    in_progress: AtomicBool,
    episodes: AtomicUsize,
}

impl ForcedLogout {
    #[must_use]
    pub fn new(
        local: Arc<dyn Storage>,
        session: Arc<dyn Storage>,
        navigator: Arc<dyn Navigator>,
        refresh_state: Arc<RefreshState>,
        login_route: &str,
    ) -> Self {
        Self {
            local,
            session,
            cookies: None,
            navigator,
            refresh_state,
            login_route: login_route.to_string(),
            in_progress: AtomicBool::new(false),
            episodes: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_cookies(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// Runs the forced logout sequence once per episode.
    /// Returns `false` when a logout was already in progress.
    pub fn force(&self, reason: LogoutReason) -> bool {
        if !self.claim_forced() {
            debug!(%reason, "forced logout already in progress");
            return false;
        }
        self.run_forced(reason);
        true
    }

    /// Takes the guard without running the sequence yet. From here on new 401s
    /// see an active logout instead of starting a refresh.
    pub(crate) fn claim_forced(&self) -> bool {
        self.claim()
    }

    /// Runs the sequence for a guard taken with `claim_forced`.
    pub(crate) fn run_forced(&self, reason: LogoutReason) {
        warn!(%reason, "forcing logout");
        self.clear_local_state();

        let marker = match reason {
            LogoutReason::LoggedInElsewhere => self.session.set(LOGOUT_REASON_KEY, reason.as_str()),
            LogoutReason::SessionExpired => self.session.remove(LOGOUT_REASON_KEY),
        };
        if let Err(err) = marker {
            warn!("Failed to record logout reason: {err}");
        }

        self.episodes.fetch_add(1, Ordering::SeqCst);
        self.navigator.navigate(&expired_route(&self.login_route));
    }

    /// Claims the guard for a user-initiated logout, so a 401 from the logout
    /// call cannot start a forced sequence on top of it.
    pub fn begin_voluntary(&self) -> bool {
        self.claim()
    }

    /// Finishes a user-initiated logout: local state is wiped and the user lands
    /// on the login route without the expiry indicator.
    pub fn complete_voluntary(&self) {
        self.clear_local_state();
        if let Err(err) = self.session.remove(LOGOUT_REASON_KEY) {
            warn!("Failed to clear logout reason: {err}");
        }
        info!("signed out");
        self.navigator.navigate(&self.login_route);
    }

    /// Resets refresh coordination and wipes persisted keys and cookies. The
    /// session-scoped logout marker survives.
    pub fn clear_local_state(&self) {
        self.refresh_state.reset();

        if let Err(err) = self.local.clear() {
            warn!("Failed to clear persisted state: {err}");
        }

        match self.session.keys() {
            Ok(keys) => {
                for key in keys.iter().filter(|key| key.as_str() != LOGOUT_REASON_KEY) {
                    if let Err(err) = self.session.remove(key) {
                        warn!("Failed to clear session key: {err}");
                    }
                }
            }
            Err(err) => warn!("Failed to list session keys: {err}"),
        }

        if let Some(jar) = &self.cookies {
            jar.clear();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Re-enables the handler; called once a new session is established.
    pub fn rearm(&self) {
        if self.in_progress.swap(false, Ordering::AcqRel) {
            debug!("forced logout re-armed");
        }
    }

    /// Number of forced logout sequences that actually ran.
    #[must_use]
    pub fn episodes(&self) -> usize {
        self.episodes.load(Ordering::SeqCst)
    }

    fn claim(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Reads and removes the logout marker. The message is therefore shown once;
/// without a marker, `expired` (the `expired=1` indicator) yields the generic
/// notice.
pub fn take_logout_notice(session: &dyn Storage, expired: bool) -> Option<LogoutReason> {
    let marker = match session.get(LOGOUT_REASON_KEY) {
        Ok(marker) => marker,
        Err(err) => {
            warn!("Failed to read logout reason: {err}");
            None
        }
    };

    if marker.is_some() {
        if let Err(err) = session.remove(LOGOUT_REASON_KEY) {
            warn!("Failed to clear logout reason: {err}");
        }
    }

    marker
        .as_deref()
        .and_then(LogoutReason::parse)
        .or_else(|| expired.then_some(LogoutReason::SessionExpired))
}

/// Classifies a failed refresh from its error body.
#[must_use]
pub fn classify_refresh_failure(envelope: &ErrorEnvelope) -> LogoutReason {
    let message = envelope.message().to_lowercase();
    if ELSEWHERE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        LogoutReason::LoggedInElsewhere
    } else {
        LogoutReason::SessionExpired
    }
}
