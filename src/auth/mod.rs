//! Session recovery and lifecycle. The refresh coordinator sits on the HTTP
//! client's post-receive hook; the forced-logout handler is the single terminal
//! sink; the monitor keeps an active user's session warm; `AuthSession` owns the
//! in-memory auth state and its persistence.
//!
//! Flow Overview: a `TOKEN_EXPIRED` 401 joins (or starts) one refresh flight and
//! is retried once; any terminal 401 or failed refresh runs the forced logout,
//! which wipes storage and cookies and navigates to the login route with
//! `expired=1`. Only `AuthSnapshot` fields ever reach storage.

pub mod logout;
pub mod monitor;
pub mod refresh;
pub mod session;
pub mod types;

pub use logout::{
    classify_refresh_failure, take_logout_notice, ForcedLogout, LogoutReason, Navigator,
    LOGOUT_REASON_KEY,
};
pub use monitor::{
    ActivityEmitter, ActivityKind, ActivityListener, ActivitySource, ListenerId, RefreshPolicy,
    SessionMonitor,
};
pub use refresh::{Entry, RefreshCoordinator, RefreshFailure, RefreshState, RefreshTicket};
pub use session::AuthSession;
pub use types::{AuthSnapshot, AuthState, UserProfile};
