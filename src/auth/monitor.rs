//! Session lifecycle monitor. Passive activity listeners record when the user
//! last did something; a periodic task refreshes proactively when an active
//! user's credential is about to expire. An idle user is left alone so the
//! session can lapse.

use super::refresh::RefreshCoordinator;
use crate::{config::MonitorConfig, error::ApiError};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
    Click,
}

impl ActivityKind {
    pub const ALL: [Self; 5] = [
        Self::PointerDown,
        Self::KeyDown,
        Self::Scroll,
        Self::TouchStart,
        Self::Click,
    ];

    /// DOM event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PointerDown => "pointerdown",
            Self::KeyDown => "keydown",
            Self::Scroll => "scroll",
            Self::TouchStart => "touchstart",
            Self::Click => "click",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type ActivityListener = Arc<dyn Fn(ActivityKind) + Send + Sync>;

/// Where user activity comes from (the document in a browser, stdin in the CLI).
pub trait ActivitySource: Send + Sync {
    fn subscribe(&self, kind: ActivityKind, listener: ActivityListener) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
}

/// In-process activity source.
#[derive(Default)]
pub struct ActivityEmitter {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, ActivityKind, ActivityListener)>>,
}

impl ActivityEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches `kind` to its listeners. Listeners run outside the lock.
    pub fn emit(&self, kind: ActivityKind) {
        let listeners: Vec<ActivityListener> = self
            .lock()
            .iter()
            .filter(|(_, subscribed, _)| *subscribed == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(kind);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, ActivityKind, ActivityListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActivitySource for ActivityEmitter {
    fn subscribe(&self, kind: ActivityKind, listener: ActivityListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, kind, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.lock().retain(|(existing, _, _)| *existing != id);
    }
}

/// Decides when a proactive refresh is due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub access_ttl: Duration,
    pub refresh_margin: Duration,
}

impl RefreshPolicy {
    /// Credential age at which a refresh becomes due.
    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.access_ttl.saturating_sub(self.refresh_margin)
    }

    /// True when the user was active after `last_refresh` and the credential is
    /// within the margin of its lifetime.
    #[must_use]
    pub fn should_refresh(
        &self,
        now: Instant,
        last_activity: Option<Instant>,
        last_refresh: Instant,
    ) -> bool {
        let active = last_activity.is_some_and(|activity| activity > last_refresh);
        active && now.saturating_duration_since(last_refresh) >= self.threshold()
    }
}

impl From<&MonitorConfig> for RefreshPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            access_ttl: config.access_ttl,
            refresh_margin: config.refresh_margin,
        }
    }
}

struct Running {
    listeners: Vec<ListenerId>,
    task: JoinHandle<()>,
}

/// Listener ids owned by the timer task; dropped with it, whether the task
/// ends on its own or is aborted.
struct Subscriptions {
    source: Arc<dyn ActivitySource>,
    ids: Vec<ListenerId>,
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.source.unsubscribe(id);
        }
    }
}

pub struct SessionMonitor {
    coordinator: Arc<RefreshCoordinator>,
    source: Arc<dyn ActivitySource>,
    policy: RefreshPolicy,
    interval: Duration,
    last_activity: Arc<Mutex<Option<Instant>>>,
    running: Mutex<Option<Running>>,
}

impl SessionMonitor {
    #[must_use]
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        source: Arc<dyn ActivitySource>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            coordinator,
            source,
            policy: RefreshPolicy::from(config),
            interval: config.interval,
            last_activity: Arc::new(Mutex::new(None)),
            running: Mutex::new(None),
        }
    }

    /// Installs the activity listeners and the periodic check. Idempotent; needs
    /// a tokio runtime.
    pub fn start(&self) {
        let mut running = self.lock_running();
        if running.as_ref().is_some_and(|current| !current.task.is_finished()) {
            return;
        }
        if let Some(stale) = running.take() {
            self.teardown(stale);
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                warn!("Session monitor not started: {err}");
                return;
            }
        };

        let listeners: Vec<ListenerId> = ActivityKind::ALL
            .iter()
            .map(|kind| {
                let last_activity = Arc::clone(&self.last_activity);
                self.source.subscribe(
                    *kind,
                    Arc::new(move |_| {
                        *last_activity.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(Instant::now());
                    }),
                )
            })
            .collect();

        let task = handle.spawn(run(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.last_activity),
            self.policy,
            self.interval,
            Subscriptions {
                source: Arc::clone(&self.source),
                ids: listeners.clone(),
            },
        ));

        debug!(interval = ?self.interval, "session monitor started");
        *running = Some(Running { listeners, task });
    }

    /// Removes listeners and cancels the timer.
    pub fn stop(&self) {
        if let Some(running) = self.lock_running().take() {
            self.teardown(running);
            debug!("session monitor stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    #[must_use]
    pub fn last_activity(&self) -> Option<Instant> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Manual refresh; shares the single flight with reactive refreshes.
    ///
    /// # Errors
    /// Returns `ApiError::SessionEnded` when the session could not be refreshed.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.coordinator.refresh_now().await
    }

    fn teardown(&self, running: Running) {
        running.task.abort();
        for id in running.listeners {
            self.source.unsubscribe(id);
        }
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    coordinator: Arc<RefreshCoordinator>,
    last_activity: Arc<Mutex<Option<Instant>>>,
    policy: RefreshPolicy,
    period: Duration,
    _subscriptions: Subscriptions,
) {
    let started = Instant::now();
    let mut ticker = interval_at(started + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if coordinator.logout().is_active() {
            debug!("forced logout in progress, session monitor exiting");
            return;
        }

        let activity = *last_activity.lock().unwrap_or_else(PoisonError::into_inner);
        let baseline = coordinator.last_refreshed().unwrap_or(started);
        if !policy.should_refresh(Instant::now(), activity, baseline) {
            continue;
        }

        info!("refreshing session ahead of expiry");
        if let Err(err) = coordinator.refresh_now().await {
            warn!("Proactive refresh failed: {err}");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockApi, Stack};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn config() -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(60),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_margin: Duration::from_secs(2 * 60),
        }
    }

    #[test]
    fn emitter_routes_by_kind_and_unsubscribes() {
        let emitter = ActivityEmitter::new();
        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = clicks.clone();
        let id = emitter.subscribe(
            ActivityKind::Click,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        emitter.emit(ActivityKind::Click);
        emitter.emit(ActivityKind::Scroll);
        assert_eq!(clicks.load(Ordering::SeqCst), 1);

        emitter.unsubscribe(id);
        emitter.emit(ActivityKind::Click);
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn policy_requires_activity_and_age() {
        let policy = RefreshPolicy::from(&config());
        let refreshed = Instant::now();
        let later = refreshed + Duration::from_secs(14 * 60);

        assert_eq!(policy.threshold(), Duration::from_secs(13 * 60));
        assert!(!policy.should_refresh(later, None, refreshed));
        assert!(!policy.should_refresh(later, Some(refreshed), refreshed));
        assert!(policy.should_refresh(later, Some(later), refreshed));
        assert!(!policy.should_refresh(
            refreshed + Duration::from_secs(60),
            Some(refreshed + Duration::from_secs(30)),
            refreshed
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn active_user_is_refreshed_before_expiry() {
        let api = Arc::new(MockApi::authenticated());
        let stack = Stack::new(api.clone());
        let emitter = Arc::new(ActivityEmitter::new());
        let monitor = SessionMonitor::new(stack.coordinator.clone(), emitter.clone(), &config());

        monitor.start();
        assert!(monitor.is_running());
        assert_eq!(emitter.listener_count(), ActivityKind::ALL.len());

        for _ in 0..14 {
            emitter.emit(ActivityKind::KeyDown);
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(api.refresh_calls(), 1);
        assert!(monitor.last_activity().is_some());
        monitor.stop();
        assert_eq!(emitter.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_user_is_left_to_expire() {
        let api = Arc::new(MockApi::authenticated());
        let stack = Stack::new(api.clone());
        let emitter = Arc::new(ActivityEmitter::new());
        let monitor = SessionMonitor::new(stack.coordinator.clone(), emitter.clone(), &config());

        monitor.start();
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;

        assert_eq!(api.refresh_calls(), 0);
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_forced_logout() {
        let api = Arc::new(MockApi::authenticated());
        let stack = Stack::new(api.clone());
        let emitter = Arc::new(ActivityEmitter::new());
        let monitor = SessionMonitor::new(stack.coordinator.clone(), emitter.clone(), &config());

        monitor.start();
        stack.logout.force(crate::auth::LogoutReason::SessionExpired);
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(!monitor.is_running());
        assert_eq!(emitter.listener_count(), 0);
        emitter.emit(ActivityKind::Click);
        assert_eq!(api.refresh_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_proactive_refresh_ends_monitor() {
        let api = Arc::new(MockApi::authenticated());
        api.fail_refresh(401, json!({"code": "INVALID_TOKEN", "message": "revoked"}));
        let stack = Stack::new(api.clone());
        let emitter = Arc::new(ActivityEmitter::new());
        let monitor = SessionMonitor::new(stack.coordinator.clone(), emitter.clone(), &config());

        monitor.start();
        tokio::time::sleep(Duration::from_secs(13 * 60 + 30)).await;
        emitter.emit(ActivityKind::Scroll);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(api.refresh_calls(), 1);
        assert!(!monitor.is_running());
        assert_eq!(emitter.listener_count(), 0);
        assert_eq!(stack.logout.episodes(), 1);

        // A later start subscribes afresh.
        stack.logout.rearm();
        monitor.start();
        assert!(monitor.is_running());
        assert_eq!(emitter.listener_count(), ActivityKind::ALL.len());
        monitor.stop();
        assert_eq!(emitter.listener_count(), 0);
    }

    #[tokio::test]
    async fn manual_refresh_goes_through_coordinator() {
        let api = Arc::new(MockApi::authenticated());
        let stack = Stack::new(api.clone());
        let monitor = SessionMonitor::new(
            stack.coordinator.clone(),
            Arc::new(ActivityEmitter::new()),
            &config(),
        );

        monitor.refresh().await.expect("refreshed");
        assert_eq!(api.refresh_calls(), 1);
        assert!(stack.coordinator.last_refreshed().is_some());
    }

    #[test]
    fn start_without_runtime_is_a_no_op() {
        let api = Arc::new(MockApi::authenticated());
        let stack = Stack::new(api);
        let emitter = Arc::new(ActivityEmitter::new());
        let monitor = SessionMonitor::new(stack.coordinator.clone(), emitter.clone(), &config());

        monitor.start();
        assert!(!monitor.is_running());
        assert_eq!(emitter.listener_count(), 0);
    }
}
