//! Application wiring: the native equivalent of a page load. Storage, cookie
//! jar, transport, refresh coordinator, forced-logout handler, monitor, session
//! and feature clients are created together and share one `RefreshState`.

use crate::{
    auth::{
        take_logout_notice, ActivitySource, AuthSession, ForcedLogout, LogoutReason, Navigator,
        RefreshCoordinator, RefreshState, SessionMonitor,
    },
    config::ClientConfig,
    error::ApiError,
    features::{AuditClient, CredentialsClient, UsersClient},
    http::{CookieJar, HttpClient, ReqwestTransport, RequestIdHook, Transport},
    persist::{PersistPipeline, Storage},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-provided pieces an `App` is built from.
pub struct AppParts {
    pub config: ClientConfig,
    /// Durable storage (local storage equivalent).
    pub local_storage: Arc<dyn Storage>,
    /// Storage that lives as long as the process (session storage equivalent).
    pub session_storage: Arc<dyn Storage>,
    pub navigator: Arc<dyn Navigator>,
    pub activity: Arc<dyn ActivitySource>,
}

pub struct App {
    config: ClientConfig,
    client: Arc<HttpClient>,
    coordinator: Arc<RefreshCoordinator>,
    logout: Arc<ForcedLogout>,
    session: AuthSession,
    session_storage: Arc<dyn Storage>,
    users: UsersClient,
    credentials: CredentialsClient,
    audit: AuditClient,
}

impl App {
    /// Builds the app over the real HTTP transport.
    ///
    /// # Errors
    /// Returns an error if the API base URL is missing or the HTTP client cannot
    /// be built.
    pub fn bootstrap(parts: AppParts) -> Result<Self, ApiError> {
        if parts.config.api_base_url.trim().is_empty() {
            return Err(ApiError::Config(
                "API base URL is not configured (set CREDVAULT_API_URL)".to_string(),
            ));
        }

        let jar = Arc::new(CookieJar::new());
        let transport = ReqwestTransport::new(
            &parts.config.api_base_url,
            jar.clone(),
            parts.config.request_timeout,
        )?;

        Ok(Self::with_transport(parts, Arc::new(transport), Some(jar)))
    }

    /// Builds the app over any transport. `jar` is cleared on forced logout.
    #[must_use]
    pub fn with_transport(
        parts: AppParts,
        transport: Arc<dyn Transport>,
        jar: Option<Arc<CookieJar>>,
    ) -> Self {
        let AppParts {
            config,
            local_storage,
            session_storage,
            navigator,
            activity,
        } = parts;

        if config.uses_insecure_secret() {
            warn!("Using the built-in persistence secret; set CREDVAULT_PERSIST_SECRET");
        }

        let refresh_state = Arc::new(RefreshState::default());
        let mut logout = ForcedLogout::new(
            local_storage.clone(),
            session_storage.clone(),
            navigator,
            refresh_state.clone(),
            &config.login_route,
        );
        if let Some(jar) = jar {
            logout = logout.with_cookies(jar);
        }
        let logout = Arc::new(logout);

        let coordinator = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            refresh_state,
            logout.clone(),
        ));

        let client = Arc::new(
            HttpClient::new(transport)
                .with_request_hook(Arc::new(RequestIdHook))
                .with_response_hook(coordinator.clone()),
        );

        let pipeline =
            PersistPipeline::sealed(local_storage, &config.storage_key, &config.persist_secret);
        let monitor = Arc::new(SessionMonitor::new(
            coordinator.clone(),
            activity,
            &config.monitor,
        ));
        let session = AuthSession::bootstrap(client.clone(), coordinator.clone(), pipeline, monitor);

        debug!(api = %config.api_base_url, "app bootstrapped");

        Self {
            users: UsersClient::new(client.clone()),
            credentials: CredentialsClient::new(client.clone()),
            audit: AuditClient::new(client.clone()),
            config,
            client,
            coordinator,
            logout,
            session,
            session_storage,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &Arc<HttpClient> {
        &self.client
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn logout(&self) -> &Arc<ForcedLogout> {
        &self.logout
    }

    #[must_use]
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    #[must_use]
    pub fn users(&self) -> &UsersClient {
        &self.users
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialsClient {
        &self.credentials
    }

    #[must_use]
    pub fn audit(&self) -> &AuditClient {
        &self.audit
    }

    /// One-shot notice for the login screen; see [`take_logout_notice`].
    #[must_use]
    pub fn take_logout_notice(&self, expired: bool) -> Option<LogoutReason> {
        take_logout_notice(self.session_storage.as_ref(), expired)
    }
}
