use super::{item_path, Payload};
use crate::{error::ApiError, http::HttpClient};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::instrument;

const CREDENTIALS_PATH: &str = "/credentials";

/// Credential metadata. The secret itself is encrypted server side and never
/// part of a listing.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Clone, Default, Serialize)]
pub struct CredentialInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl fmt::Debug for CredentialInput {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CredentialInput")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("notes", &self.notes)
            .finish()
    }
}

#[derive(Clone)]
pub struct CredentialsClient {
    client: Arc<HttpClient>,
}

impl CredentialsClient {
    #[must_use]
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Credential>, ApiError> {
        let payload: Payload<Vec<Credential>> = self.client.get_json(CREDENTIALS_PATH).await?;
        Ok(payload.into_inner())
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Credential, ApiError> {
        let payload: Payload<Credential> = self
            .client
            .get_json(&item_path(CREDENTIALS_PATH, id))
            .await?;
        Ok(payload.into_inner())
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: &CredentialInput) -> Result<Credential, ApiError> {
        let payload: Payload<Credential> = self.client.post_json(CREDENTIALS_PATH, input).await?;
        Ok(payload.into_inner())
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: &str, input: &CredentialInput) -> Result<Credential, ApiError> {
        let payload: Payload<Credential> = self
            .client
            .put_json(&item_path(CREDENTIALS_PATH, id), input)
            .await?;
        Ok(payload.into_inner())
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&item_path(CREDENTIALS_PATH, id)).await
    }
}
