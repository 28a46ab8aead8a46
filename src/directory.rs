//! Remote user directory and session API.
//!
//! `Directory` is the seam the identity broker and session terminator talk
//! through; `HttpDirectory` is the production implementation over the
//! platform's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DirectoryError;
use crate::token::TokenIssuer;

const API_VERSION: &str = "v0.3";

/// Backend for user lookup/creation and session revocation.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Id of the first user named `name`, or `None` when there is none.
    async fn find_user(&self, name: &str) -> Result<Option<String>, DirectoryError>;

    /// Create a user named `name` and return its id.
    async fn create_user(&self, name: &str) -> Result<String, DirectoryError>;

    /// Revoke a signaling-plane session.
    async fn delete_session(&self, session: &str) -> Result<(), DirectoryError>;
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Option<EmbeddedUsers>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedUsers {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateUserRequest<'a> {
    name: &'a str,
    display_name: &'a str,
}

/// REST client for the directory, authenticated with per-call service tokens.
pub struct HttpDirectory {
    base_url: Url,
    tokens: TokenIssuer,
    client: reqwest::Client,
}

impl HttpDirectory {
    pub fn new(
        base_url: &str,
        tokens: TokenIssuer,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| DirectoryError::Request {
                operation: "client setup".into(),
                reason: format!("invalid base URL: {base_url}"),
            })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Request {
                operation: "client setup".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            tokens,
            client,
        })
    }

    /// API URL with each of `segments` percent-encoded as one path segment.
    fn api_url(&self, segments: &[&str]) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| DirectoryError::Request {
                operation: "url".into(),
                reason: format!("{} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .push(API_VERSION)
            .extend(segments);
        Ok(url)
    }

    /// Send a request with a freshly minted bearer credential.
    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, DirectoryError> {
        let bearer = self.tokens.service_token()?;
        let response = request
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| DirectoryError::Request {
                operation: operation.into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DirectoryError::Status {
                operation: operation.into(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn find_user(&self, name: &str) -> Result<Option<String>, DirectoryError> {
        let request = self
            .client
            .get(self.api_url(&["users"])?)
            .query(&[("name", name)]);
        let response = self.send("lookup", request).await?;

        let body: UserListResponse =
            response
                .json()
                .await
                .map_err(|e| DirectoryError::InvalidResponse {
                    operation: "lookup".into(),
                    reason: e.to_string(),
                })?;

        let id = body
            .embedded
            .and_then(|embedded| embedded.users.into_iter().next())
            .map(|user| user.id);
        debug!(name, found = id.is_some(), "Directory lookup");
        Ok(id)
    }

    async fn create_user(&self, name: &str) -> Result<String, DirectoryError> {
        let request = self
            .client
            .post(self.api_url(&["users"])?)
            .json(&CreateUserRequest {
                name,
                display_name: name,
            });
        let response = self.send("create", request).await?;

        let user: UserRecord =
            response
                .json()
                .await
                .map_err(|e| DirectoryError::InvalidResponse {
                    operation: "create".into(),
                    reason: e.to_string(),
                })?;
        debug!(name, id = %user.id, "Directory user created");
        Ok(user.id)
    }

    async fn delete_session(&self, session: &str) -> Result<(), DirectoryError> {
        let request = self.client.delete(self.api_url(&["sessions", session])?);
        self.send("session delete", request).await?;
        debug!(session, "Session deleted");
        Ok(())
    }
}
