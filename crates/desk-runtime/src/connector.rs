//! Live connector channel and graph factory wiring.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use desk_core::{Activity, ConversationApi, DeskConfig, OutboundActivity, TransportError};
use desk_dialog::GraphApiFactory;
use desk_graph::{GraphApi, GraphClient};

const CONNECTOR_TOKEN_URL: &str =
    "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token";
const CONNECTOR_SCOPE: &str = "https://api.botframework.com/.default";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Refreshes this many seconds before the token actually expires.
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_unix: i64,
}

/// Client-credentials token source for the connector service. The token
/// is cached and refreshed shortly before expiry.
pub struct ConnectorAuth {
    http: Client,
    app_id: String,
    app_password: String,
    cached: Mutex<Option<CachedToken>>,
}

fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

impl ConnectorAuth {
    pub fn new(app_id: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            app_id: app_id.into(),
            app_password: app_password.into(),
            cached: Mutex::new(None),
        }
    }

    async fn bearer_token(&self) -> Result<String, TransportError> {
        let now = chrono::Utc::now().timestamp();
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.expires_unix - TOKEN_EXPIRY_SLACK_SECS > now {
                return Ok(entry.token.clone());
            }
        }
        let grant = self.request_token().await?;
        let token = grant.access_token.clone();
        *cached = Some(CachedToken {
            token: grant.access_token,
            expires_unix: now + grant.expires_in,
        });
        Ok(token)
    }

    async fn request_token(&self) -> Result<TokenGrant, TransportError> {
        tracing::debug!("requesting connector access token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.app_password.as_str()),
            ("scope", CONNECTOR_SCOPE),
        ];
        let response = self
            .http
            .post(CONNECTOR_TOKEN_URL)
            .form(&form)
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: status.as_u16(),
                message: truncate_for_error(&body),
            });
        }
        response
            .json::<TokenGrant>()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))
    }
}

/// Outbound channel bound to one service URL. Activities are posted to
/// the connector's `v3/conversations` surface.
pub struct HttpConnectorChannel {
    http: Client,
    auth: Arc<ConnectorAuth>,
    service_url: String,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    id: Option<String>,
}

impl HttpConnectorChannel {
    pub fn new(auth: Arc<ConnectorAuth>, service_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            auth,
            service_url: service_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn activities_url(&self, conversation_id: &str, activity_id: Option<&str>) -> String {
        match activity_id {
            Some(id) => format!(
                "{}/v3/conversations/{conversation_id}/activities/{id}",
                self.service_url
            ),
            None => format!(
                "{}/v3/conversations/{conversation_id}/activities",
                self.service_url
            ),
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Api {
            status: status.as_u16(),
            message: truncate_for_error(&body),
        })
    }
}

#[async_trait]
impl ConversationApi for HttpConnectorChannel {
    async fn send_activity(
        &self,
        conversation_id: &str,
        content: OutboundActivity,
    ) -> Result<String, TransportError> {
        let token = self.auth.bearer_token().await?;
        let url = self.activities_url(conversation_id, None);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&content)
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        let response = Self::check_status(response).await?;
        let resource = response
            .json::<ResourceResponse>()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        Ok(resource.id.unwrap_or_default())
    }

    async fn update_activity(
        &self,
        conversation_id: &str,
        activity_id: &str,
        content: OutboundActivity,
    ) -> Result<(), TransportError> {
        let token = self.auth.bearer_token().await?;
        let url = self.activities_url(conversation_id, Some(activity_id));
        let response = self
            .http
            .put(&url)
            .bearer_auth(token)
            .json(&content)
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete_activity(
        &self,
        conversation_id: &str,
        activity_id: &str,
    ) -> Result<(), TransportError> {
        let token = self.auth.bearer_token().await?;
        let url = self.activities_url(conversation_id, Some(activity_id));
        let response = self
            .http
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        Self::check_status(response).await?;
        Ok(())
    }
}

/// Builds the outbound channel for one inbound activity. Tests swap in
/// a recording channel through this seam.
pub trait ChannelFactory: Send + Sync {
    fn channel_for(&self, activity: &Activity) -> Arc<dyn ConversationApi>;
}

/// Production factory: a connector channel bound to the service URL the
/// inbound activity arrived from.
pub struct ConnectorChannelFactory {
    auth: Arc<ConnectorAuth>,
    fallback_service_url: String,
}

impl ConnectorChannelFactory {
    pub fn new(config: &DeskConfig, fallback_service_url: impl Into<String>) -> Self {
        Self {
            auth: Arc::new(ConnectorAuth::new(&config.bot_id, &config.bot_password)),
            fallback_service_url: fallback_service_url.into(),
        }
    }
}

impl ChannelFactory for ConnectorChannelFactory {
    fn channel_for(&self, activity: &Activity) -> Arc<dyn ConversationApi> {
        let service_url = activity
            .service_url
            .clone()
            .unwrap_or_else(|| self.fallback_service_url.clone());
        Arc::new(HttpConnectorChannel::new(Arc::clone(&self.auth), service_url))
    }
}

/// Builds a graph client for each user credential the dialog obtains.
pub struct LiveGraphFactory {
    base_url: String,
}

impl LiveGraphFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl GraphApiFactory for LiveGraphFactory {
    fn for_token(&self, token: &str) -> Arc<dyn GraphApi> {
        Arc::new(GraphClient::new(self.base_url.clone(), token))
    }
}
