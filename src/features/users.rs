use super::{item_path, Payload};
use crate::{error::ApiError, http::HttpClient};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::instrument;

const USERS_PATH: &str = "/users";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Clone)]
pub struct UsersClient {
    client: Arc<HttpClient>,
}

impl UsersClient {
    #[must_use]
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<User>, ApiError> {
        let payload: Payload<Vec<User>> = self.client.get_json(USERS_PATH).await?;
        Ok(payload.into_inner())
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<User, ApiError> {
        let payload: Payload<User> = self.client.get_json(&item_path(USERS_PATH, id)).await?;
        Ok(payload.into_inner())
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self, user), fields(email = %user.email))]
    pub async fn create(&self, user: &NewUser) -> Result<User, ApiError> {
        let payload: Payload<User> = self.client.post_json(USERS_PATH, user).await?;
        Ok(payload.into_inner())
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: &str, update: &UserUpdate) -> Result<User, ApiError> {
        let payload: Payload<User> = self
            .client
            .put_json(&item_path(USERS_PATH, id), update)
            .await?;
        Ok(payload.into_inner())
    }

    /// # Errors
    /// Returns an error if the request fails or the session has ended.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&item_path(USERS_PATH, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockApi, Stack};
    use serde_json::json;

    #[tokio::test]
    async fn list_accepts_wrapped_bodies_and_recovers_session() {
        let api = Arc::new(MockApi::expired());
        api.respond(
            "/users",
            200,
            json!({"data": [{"id": "1", "name": "Ada", "email": "ada@example.com", "role": "admin"}]}),
        );
        let stack = Stack::new(api.clone());
        let users = UsersClient::new(stack.client.clone());

        let listed = users.list().await.expect("listed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].role, "admin");
    }

    #[tokio::test]
    async fn get_and_delete_use_item_paths() {
        let api = Arc::new(MockApi::authenticated());
        api.respond("/users/7", 200, json!({"id": "7", "email": "g@example.com"}));
        let stack = Stack::new(api.clone());
        let users = UsersClient::new(stack.client.clone());

        let user = users.get("7").await.expect("user");
        assert_eq!(user.email, "g@example.com");
        assert!(!user.is_verified);

        users.delete("7").await.expect("deleted");
        assert_eq!(api.hits("/users/7"), 2);
    }

    #[tokio::test]
    async fn create_sends_body_and_surfaces_http_errors() {
        let api = Arc::new(MockApi::authenticated());
        api.respond("/users", 409, json!({"message": "email taken"}));
        let stack = Stack::new(api.clone());
        let users = UsersClient::new(stack.client.clone());

        let err = users
            .create(&NewUser {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                password: "hunter2".into(),
                role: None,
            })
            .await
            .expect_err("conflict");
        assert_eq!(err.status(), Some(409));

        let body = api.last_body("/users").expect("body sent");
        assert_eq!(body["email"], "ada@example.com");
        assert!(body.get("role").is_none());
    }

    #[test]
    fn update_serializes_only_present_fields() {
        let update = UserUpdate {
            role: Some("viewer".into()),
            ..UserUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(update).expect("serialize"),
            json!({"role": "viewer"})
        );
    }
}
