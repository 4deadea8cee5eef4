use super::Payload;
use crate::{error::ApiError, http::HttpClient};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use url::form_urlencoded;

const AUDIT_PATH: &str = "/audit-logs";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AuditLog {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

impl AuditQuery {
    fn to_path(self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(limit) = self.limit {
            query.append_pair("limit", &limit.to_string());
        }
        if let Some(page) = self.page {
            query.append_pair("page", &page.to_string());
        }
        let query = query.finish();
        if query.is_empty() {
            AUDIT_PATH.to_string()
        } else {
            format!("{AUDIT_PATH}?{query}")
        }
    }
}

#[derive(Clone)]
pub struct AuditClient {
    client: Arc<HttpClient>,
}

impl AuditClient {
    #[must_use]
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self))]
    pub async fn list(&self, query: AuditQuery) -> Result<Vec<AuditLog>, ApiError> {
        let payload: Payload<Vec<AuditLog>> = self.client.get_json(&query.to_path()).await?;
        Ok(payload.into_inner())
    }
}
