//! Reqwest client for the directory/graph collaborator.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::thread::{MessagePage, ThreadMessage};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph api error: status={status} body={body}")]
    Api { status: u16, body: String },
    #[error("graph network error: {0}")]
    Network(String),
    #[error("graph response decode error: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

/// Trait contract for the directory collaborator so the dialog and the
/// ticket handlers can run against stubs in tests.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn me(&self) -> Result<UserProfile, GraphError>;

    async fn team_channel(
        &self,
        team_aad_group_id: &str,
        channel_id: &str,
    ) -> Result<ChannelInfo, GraphError>;

    async fn channel_message(
        &self,
        team_aad_group_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<ThreadMessage, GraphError>;

    async fn channel_message_replies(
        &self,
        team_aad_group_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessagePage, GraphError>;

    async fn next_page(&self, next_link: &str) -> Result<MessagePage, GraphError>;
}

/// Bearer-token graph client. One instance per credential; the token is
/// the one the auth dialog obtained for the acting user.
pub struct GraphClient {
    http: Client,
    base_url: String,
    token: String,
}

fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GraphError> {
        tracing::debug!(url, "graph request");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|error| GraphError::Network(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                status: status.as_u16(),
                body: truncate_for_error(&body),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|error| GraphError::InvalidResponse(error.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn me(&self) -> Result<UserProfile, GraphError> {
        self.get_json(&self.url("/me")).await
    }

    async fn team_channel(
        &self,
        team_aad_group_id: &str,
        channel_id: &str,
    ) -> Result<ChannelInfo, GraphError> {
        self.get_json(&self.url(&format!(
            "/teams/{team_aad_group_id}/channels/{channel_id}"
        )))
        .await
    }

    async fn channel_message(
        &self,
        team_aad_group_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<ThreadMessage, GraphError> {
        self.get_json(&self.url(&format!(
            "/teams/{team_aad_group_id}/channels/{channel_id}/messages/{message_id}"
        )))
        .await
    }

    async fn channel_message_replies(
        &self,
        team_aad_group_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessagePage, GraphError> {
        self.get_json(&self.url(&format!(
            "/teams/{team_aad_group_id}/channels/{channel_id}/messages/{message_id}/replies"
        )))
        .await
    }

    async fn next_page(&self, next_link: &str) -> Result<MessagePage, GraphError> {
        // Continuation links are absolute; follow them as given.
        self.get_json(next_link).await
    }
}
