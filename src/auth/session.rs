use super::{
    monitor::SessionMonitor,
    refresh::RefreshCoordinator,
    types::{AuthSnapshot, AuthState, LoginRequest, UserEnvelope, UserProfile},
};
use crate::{
    error::ApiError,
    features::Payload,
    http::{ApiRequest, HttpClient},
    persist::PersistPipeline,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";

/// Owner of the in-memory auth state. Every change is persisted through the
/// pipeline, and authentication transitions start or stop the monitor.
pub struct AuthSession {
    client: Arc<HttpClient>,
    coordinator: Arc<RefreshCoordinator>,
    pipeline: PersistPipeline,
    monitor: Arc<SessionMonitor>,
    state: Mutex<AuthState>,
}

impl AuthSession {
    /// Rehydrates persisted state; resumes monitoring for a restored session.
    #[must_use]
    pub fn bootstrap(
        client: Arc<HttpClient>,
        coordinator: Arc<RefreshCoordinator>,
        pipeline: PersistPipeline,
        monitor: Arc<SessionMonitor>,
    ) -> Self {
        let state = AuthState::from(pipeline.rehydrate::<AuthSnapshot>());
        if state.is_authenticated {
            debug!("restored persisted session");
            monitor.start();
        }

        Self {
            client,
            coordinator,
            pipeline,
            monitor,
            state: Mutex::new(state),
        }
    }

    /// Current state. A forced logout that happened behind our back (the
    /// storage is already wiped) is reflected here as signed out.
    #[must_use]
    pub fn state(&self) -> AuthState {
        let mut state = self.lock();
        if state.is_authenticated && self.coordinator.logout().is_active() {
            *state = AuthState::default();
            self.monitor.stop();
        }
        state.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.state().user
    }

    #[must_use]
    pub fn monitor(&self) -> &Arc<SessionMonitor> {
        &self.monitor
    }

    /// Signs in. A 401 here is a credential error, not a session event, so the
    /// call opts out of session recovery.
    ///
    /// # Errors
    /// Returns an error on bad credentials or transport failure.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        self.lock().loading = true;

        let request = ApiRequest::post(LOGIN_PATH)
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })?
            .without_session_recovery();

        let result = match self.client.send(request).await {
            Ok(response) if !response.is_success() => {
                let envelope = response.envelope();
                Err(ApiError::Http {
                    status: response.status,
                    message: if envelope.message().is_empty() {
                        "Login failed.".to_string()
                    } else {
                        envelope.message().to_string()
                    },
                })
            }
            Ok(response) => response
                .into_json::<Payload<UserEnvelope>>()
                .map(|payload| payload.into_inner().user),
            Err(err) => Err(err),
        };

        match result {
            Ok(user) => {
                let logout = self.coordinator.logout();
                logout.rearm();
                self.coordinator.mark_refreshed();
                info!(user_id = %user.id, "signed in");
                self.update(AuthState::signed_in(user.clone()));
                Ok(user)
            }
            Err(err) => {
                warn!("Login failed: {err}");
                let mut state = self.lock();
                state.loading = false;
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Voluntary sign-out. Local state is cleared even if the API call fails;
    /// a forced logout already in progress wins and this becomes a no-op.
    pub async fn logout(&self) {
        let logout = Arc::clone(self.coordinator.logout());
        if !logout.begin_voluntary() {
            debug!("logout already in progress");
            return;
        }

        self.monitor.stop();
        if let Err(err) = self.client.post_empty(LOGOUT_PATH).await {
            warn!("Logout request failed: {err}");
        }

        *self.lock() = AuthState::default();
        logout.complete_voluntary();
    }

    /// Reloads the profile from `/auth/me`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self) -> Result<UserProfile, ApiError> {
        let payload: Payload<UserEnvelope> = self.client.get_json(ME_PATH).await?;
        let user = payload.into_inner().user;
        self.update(AuthState::signed_in(user.clone()));
        Ok(user)
    }

    fn update(&self, next: AuthState) {
        let authenticated = next.is_authenticated;
        {
            let mut state = self.lock();
            if let Err(err) = self.pipeline.persist(&next) {
                warn!("Failed to persist auth state: {err}");
            }
            *state = next;
        }

        if authenticated {
            self.monitor.start();
        } else {
            self.monitor.stop();
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
