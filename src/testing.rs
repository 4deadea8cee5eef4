#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::{
    app::{App, AppParts},
    auth::{ActivityEmitter, ForcedLogout, Navigator, RefreshCoordinator},
    config::ClientConfig,
    error::ApiError,
    http::{ApiRequest, ApiResponse, HttpClient, Transport, REQUEST_ID_HEADER},
    persist::MemoryStorage,
};
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

const REFRESH_LATENCY: Duration = Duration::from_millis(20);

#[derive(Default)]
struct MockState {
    token_valid: bool,
    overrides: HashMap<String, (u16, Value)>,
    refresh_failure: Option<(u16, Value)>,
    disconnected: HashSet<String>,
    hits: HashMap<String, usize>,
    retried_hits: HashMap<String, usize>,
    request_ids: HashMap<String, Vec<String>>,
    bodies: HashMap<String, Value>,
}

/// In-process API double. Unknown paths answer `{"data": {"path": ...}}` while
/// the access token is valid and `401 TOKEN_EXPIRED` otherwise; a successful
/// refresh makes the token valid again.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockState>,
    refresh_calls: AtomicUsize,
}

impl MockApi {
    pub fn authenticated() -> Self {
        let api = Self::default();
        api.state.lock().unwrap().token_valid = true;
        api
    }

    pub fn expired() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.state
            .lock()
            .unwrap()
            .overrides
            .insert(path.to_string(), (status, body));
    }

    pub fn fail_refresh(&self, status: u16, body: Value) {
        self.state.lock().unwrap().refresh_failure = Some((status, body));
    }

    pub fn disconnect(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .disconnected
            .insert(path.to_string());
    }

    pub fn expire_token(&self) {
        self.state.lock().unwrap().token_valid = false;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn retried_hits(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .retried_hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn request_ids(&self, path: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .request_ids
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().bodies.get(path).cloned()
    }

    async fn refresh(&self) -> ApiResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(REFRESH_LATENCY).await;

        let mut state = self.state.lock().unwrap();
        if let Some((status, body)) = state.refresh_failure.clone() {
            return ApiResponse::new(status, body.to_string());
        }
        state.token_valid = true;
        ApiResponse::new(200, json!({"ok": true}).to_string())
    }
}

#[async_trait]
impl Transport for MockApi {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let path = request.path.clone();
        {
            let mut state = self.state.lock().unwrap();
            *state.hits.entry(path.clone()).or_default() += 1;
            if request.retried {
                *state.retried_hits.entry(path.clone()).or_default() += 1;
            }
            state
                .request_ids
                .entry(path.clone())
                .or_default()
                .push(request.header_value(REQUEST_ID_HEADER).unwrap_or_default().to_string());
            if let Some(body) = &request.body {
                state.bodies.insert(path.clone(), body.clone());
            }
        }

        if path == crate::auth::refresh::REFRESH_PATH {
            return Ok(self.refresh().await);
        }

        let state = self.state.lock().unwrap();
        if state.disconnected.contains(&path) {
            return Err(ApiError::Network("connection reset".to_string()));
        }
        if let Some((status, body)) = state.overrides.get(&path) {
            return Ok(ApiResponse::new(*status, body.to_string()));
        }
        if !state.token_valid {
            return Ok(ApiResponse::new(
                401,
                json!({"code": "TOKEN_EXPIRED", "message": "Access token expired"}).to_string(),
            ));
        }
        Ok(ApiResponse::new(200, json!({"data": {"path": path}}).to_string()))
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    targets: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) {
        self.targets.lock().unwrap().push(target.to_string());
    }
}

pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::load();
    config.api_base_url = "http://mock.invalid".to_string();
    config.persist_secret = SecretString::from("test-secret".to_string());
    config
}

/// An `App` wired to a `MockApi` with in-memory storage.
pub struct Stack {
    pub api: Arc<MockApi>,
    pub app: App,
    pub client: Arc<HttpClient>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub logout: Arc<ForcedLogout>,
    pub navigator: Arc<RecordingNavigator>,
    pub local_storage: Arc<MemoryStorage>,
    pub session_storage: Arc<MemoryStorage>,
    pub activity: Arc<ActivityEmitter>,
}

impl Stack {
    pub fn new(api: Arc<MockApi>) -> Self {
        Self::build(
            api,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingNavigator::default()),
        )
    }

    /// Same storage and API, fresh process.
    pub fn restart(&self) -> Self {
        Self::build(
            self.api.clone(),
            self.local_storage.clone(),
            self.session_storage.clone(),
            self.navigator.clone(),
        )
    }

    fn build(
        api: Arc<MockApi>,
        local_storage: Arc<MemoryStorage>,
        session_storage: Arc<MemoryStorage>,
        navigator: Arc<RecordingNavigator>,
    ) -> Self {
        let activity = Arc::new(ActivityEmitter::new());
        let app = App::with_transport(
            AppParts {
                config: test_config(),
                local_storage: local_storage.clone(),
                session_storage: session_storage.clone(),
                navigator: navigator.clone(),
                activity: activity.clone(),
            },
            api.clone(),
            None,
        );

        Self {
            client: app.client().clone(),
            coordinator: app.coordinator().clone(),
            logout: app.logout().clone(),
            api,
            app,
            navigator,
            local_storage,
            session_storage,
            activity,
        }
    }
}
