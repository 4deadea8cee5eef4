//! Typed clients for the vault's resources. All of them go through the shared
//! `HttpClient`, so they inherit session recovery without knowing about it.

pub mod audit;
pub mod credentials;
pub mod users;

pub use audit::{AuditClient, AuditLog, AuditQuery};
pub use credentials::{Credential, CredentialInput, CredentialsClient};
pub use users::{NewUser, User, UserUpdate, UsersClient};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;

/// Everything but RFC 3986 unreserved characters is escaped inside a segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Response body that may or may not be wrapped in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Payload<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Payload<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// `{collection}/{id}` with the id percent-encoded as a single segment.
pub(crate) fn item_path(collection: &str, id: &str) -> String {
    format!(
        "{collection}/{}",
        utf8_percent_encode(id.trim(), PATH_SEGMENT)
    )
}
