//! Cookie store shared between the transport and the forced-logout handler. The
//! API sets its session cookies `HttpOnly`, so this jar is the only place they
//! live client side; values are never logged. Matching (domain, path, secure,
//! expiry) follows RFC 6265 through `cookie_store`.

use cookie_store::CookieStore;
use reqwest::{cookie::CookieStore as HttpCookieStore, header::HeaderValue};
use reqwest_cookie_store::CookieStoreMutex;
use std::sync::{MutexGuard, PoisonError};
use tracing::debug;
use url::Url;

#[derive(Default)]
pub struct CookieJar {
    store: CookieStoreMutex,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every cookie for every host.
    pub fn clear(&self) {
        let mut store = self.lock();
        let count = store.iter_any().count();
        store.clear();
        debug!(count, "cookie jar cleared");
    }

    /// Number of cookies that would be sent to `url`.
    #[must_use]
    pub fn len_for(&self, url: &Url) -> usize {
        self.lock().matches(url).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().iter_unexpired().next().is_none()
    }

    /// Stores one raw `Set-Cookie` value received from `url`. A cookie that is
    /// already expired removes any stored cookie of the same name and scope.
    pub fn store(&self, url: &Url, set_cookie: &str) {
        if let Err(err) = self.lock().parse(set_cookie, url) {
            debug!(url = %url, "ignoring malformed cookie: {err}");
        }
    }

    fn header_for(&self, url: &Url) -> Option<String> {
        let store = self.lock();
        let pairs: Vec<String> = store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    fn lock(&self) -> MutexGuard<'_, CookieStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HttpCookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.store.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for(url)
            .and_then(|header| HeaderValue::from_str(&header).ok())
    }
}
