//! Single-flight refresh coordination.
//!
//! `RefreshState` is the only shared mutable piece: a `refreshing` flag and the
//! waiters parked behind the outstanding refresh. Checking the flag, setting it,
//! and enqueueing a waiter happen inside one critical section with no `.await`
//! in between, so a burst of expired responses elects exactly one leader no
//! matter how the runtime interleaves them.
//!
//! Invariants:
//! - `refreshing` is true iff one refresh call is outstanding;
//! - waiters exist only while `refreshing` is true;
//! - settling drains every waiter at once;
//! - `reset()` bumps the generation, so a refresh that started before a logout
//!   cannot settle into the next session.

use super::logout::{classify_refresh_failure, ForcedLogout, LogoutReason};
use crate::{
    error::ApiError,
    http::{ApiRequest, ApiResponse, HookOutcome, ResponseHook, Transport},
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, info, instrument, warn};

pub const REFRESH_PATH: &str = "/auth/refresh";

/// Why a refresh did not produce a new credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshFailure {
    pub reason: LogoutReason,
    pub message: String,
}

impl RefreshFailure {
    fn aborted() -> Self {
        Self {
            reason: LogoutReason::SessionExpired,
            message: "refresh abandoned".to_string(),
        }
    }
}

pub type RefreshOutcome = Result<(), RefreshFailure>;

/// Result of [`RefreshState::try_enter`].
#[derive(Debug)]
pub enum Entry {
    /// The caller must issue the refresh and settle the ticket.
    Leader(RefreshTicket),
    /// A refresh is already running; await its outcome.
    Follower(oneshot::Receiver<RefreshOutcome>),
}

#[derive(Debug, Default)]
struct Inner {
    refreshing: bool,
    generation: u64,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

#[derive(Debug, Default)]
pub struct RefreshState {
    inner: Mutex<Inner>,
}

impl RefreshState {
    /// Becomes the leader when idle, otherwise parks a waiter.
    pub fn try_enter(self: &Arc<Self>) -> Entry {
        let mut inner = self.lock();
        if inner.refreshing {
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            Entry::Follower(rx)
        } else {
            inner.refreshing = true;
            Entry::Leader(RefreshTicket {
                state: Arc::clone(self),
                generation: inner.generation,
                settled: false,
            })
        }
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of parked waiters.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Settles the flight owned by `ticket`, waking every waiter with `outcome`.
    pub fn drain(&self, ticket: RefreshTicket, outcome: &RefreshOutcome) -> usize {
        ticket.drain(outcome)
    }

    /// Forgets any flight and waiter. Parked waiters observe an abort.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let dropped = inner.waiters.len();
        inner.refreshing = false;
        inner.generation = inner.generation.wrapping_add(1);
        inner.waiters.clear();
        if dropped > 0 {
            debug!(dropped, "refresh state reset with parked waiters");
        }
    }

    fn settle(&self, generation: u64, outcome: &RefreshOutcome) -> usize {
        let waiters = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return 0;
            }
            inner.refreshing = false;
            std::mem::take(&mut inner.waiters)
        };

        let woken = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away is fine to skip.
            let _ = waiter.send(outcome.clone());
        }
        woken
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of leadership for one refresh flight. Dropping it unsettled (e.g. the
/// leader's future was cancelled) aborts the flight instead of stranding waiters.
#[derive(Debug)]
pub struct RefreshTicket {
    state: Arc<RefreshState>,
    generation: u64,
    settled: bool,
}

impl RefreshTicket {
    pub fn drain(mut self, outcome: &RefreshOutcome) -> usize {
        self.settled = true;
        self.state.settle(self.generation, outcome)
    }
}

impl Drop for RefreshTicket {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh leader dropped before settling");
            self.state
                .settle(self.generation, &Err(RefreshFailure::aborted()));
        }
    }
}

/// Post-receive hook that turns expired-token 401s into one shared refresh.
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    state: Arc<RefreshState>,
    logout: Arc<ForcedLogout>,
    last_refreshed: Mutex<Option<Instant>>,
    refresh_calls: AtomicUsize,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        state: Arc<RefreshState>,
        logout: Arc<ForcedLogout>,
    ) -> Self {
        Self {
            transport,
            state,
            logout,
            last_refreshed: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<RefreshState> {
        &self.state
    }

    #[must_use]
    pub fn logout(&self) -> &Arc<ForcedLogout> {
        &self.logout
    }

    /// Records that a fresh credential was just issued (login or refresh).
    pub fn mark_refreshed(&self) {
        *self
            .last_refreshed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    #[must_use]
    pub fn last_refreshed(&self) -> Option<Instant> {
        *self
            .last_refreshed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh calls issued by this coordinator.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Manual refresh entry point; joins an in-flight refresh if there is one.
    ///
    /// # Errors
    /// Returns `ApiError::SessionEnded` when the refresh fails; the forced logout
    /// has run by then.
    pub async fn refresh_now(&self) -> Result<(), ApiError> {
        if self.logout.is_active() {
            return Err(ApiError::SessionEnded(LogoutReason::SessionExpired));
        }
        self.join_refresh()
            .await
            .map_err(|failure| ApiError::SessionEnded(failure.reason))
    }

    async fn join_refresh(&self) -> RefreshOutcome {
        match self.state.try_enter() {
            Entry::Leader(ticket) => {
                let outcome = self.call_refresh().await;
                // The logout guard is taken before waiters wake, so no request
                // can lead a second refresh in between. The sequence itself
                // resets the flight, so it runs after the drain.
                let claimed = outcome.is_err() && self.logout.claim_forced();
                let woken = ticket.drain(&outcome);
                debug!(woken, ok = outcome.is_ok(), "refresh settled");
                if let (true, Err(failure)) = (claimed, &outcome) {
                    self.logout.run_forced(failure.reason);
                }
                outcome
            }
            Entry::Follower(waiter) => waiter.await.unwrap_or_else(|_| {
                debug!("refresh waiter released by reset");
                Err(RefreshFailure::aborted())
            }),
        }
    }

    #[instrument(skip(self))]
    async fn call_refresh(&self) -> RefreshOutcome {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let request = ApiRequest::post(REFRESH_PATH).without_session_recovery();

        match self.transport.send(&request).await {
            Ok(response) if response.is_success() => {
                self.mark_refreshed();
                info!("session refreshed");
                Ok(())
            }
            Ok(response) => {
                let envelope = response.envelope();
                let reason = classify_refresh_failure(&envelope);
                warn!(status = response.status, %reason, "refresh rejected");
                Err(RefreshFailure {
                    reason,
                    message: envelope.message().to_string(),
                })
            }
            Err(err) => {
                warn!("refresh failed: {err}");
                Err(RefreshFailure {
                    reason: LogoutReason::SessionExpired,
                    message: err.to_string(),
                })
            }
        }
    }

    fn terminate(&self, reason: LogoutReason) -> HookOutcome {
        self.logout.force(reason);
        HookOutcome::Deliver(Err(ApiError::SessionEnded(reason)))
    }
}

#[async_trait]
impl ResponseHook for RefreshCoordinator {
    async fn after_receive(
        &self,
        request: &mut ApiRequest,
        outcome: Result<ApiResponse, ApiError>,
    ) -> HookOutcome {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => return HookOutcome::Deliver(Err(err)),
        };

        if response.status != 401 || !request.recover_session {
            return HookOutcome::Deliver(Ok(response));
        }

        let Some(code) = response.envelope().auth_code() else {
            return HookOutcome::Deliver(Ok(response));
        };

        if !code.is_recoverable() {
            warn!(code = code.as_str(), path = %request.path, "session rejected");
            return self.terminate(LogoutReason::SessionExpired);
        }

        if request.retried {
            warn!(path = %request.path, "token still expired after refresh");
            return self.terminate(LogoutReason::SessionExpired);
        }

        if self.logout.is_active() {
            return HookOutcome::Deliver(Err(ApiError::SessionEnded(
                LogoutReason::SessionExpired,
            )));
        }

        match self.join_refresh().await {
            Ok(()) => {
                request.retried = true;
                HookOutcome::Retry
            }
            Err(failure) => HookOutcome::Deliver(Err(ApiError::SessionEnded(failure.reason))),
        }
    }
}
