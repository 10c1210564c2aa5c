//! REST client for the ticketing system. Resources carry `_hyperlinks`
//! arrays; navigation follows the `ref` entries rather than building
//! URLs by hand.

use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;

pub const HYPERLINK_REF_SELF: &str = "self";
pub const HYPERLINK_REF_COMMENT: &str = "comment";
pub const HYPERLINK_REF_HISTORY: &str = "history";
pub const HYPERLINK_REF_CREATE: &str = "create";

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum TicketingError {
    #[error("ticketing api error: status={status} body={body}")]
    Api { status: u16, body: String },
    #[error("ticketing network error: {0}")]
    Network(String),
    #[error("ticketing response decode error: {0}")]
    InvalidResponse(String),
    #[error("ticketing login did not yield a session cookie")]
    LoginFailed,
    #[error("resource has no '{0}' hyperlink")]
    MissingHyperlink(&'static str),
    #[error("hyperlink of type '{actual}' where '{expected}' was required")]
    WrongHyperlinkType { expected: &'static str, actual: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hyperlink {
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub link_ref: Option<String>,
    #[serde(rename = "_url")]
    pub url: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queue {
    pub id: String,
    #[serde(default, rename = "Name")]
    pub name: String,
    #[serde(default, rename = "_hyperlinks")]
    pub hyperlinks: Vec<Hyperlink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    #[serde(default, rename = "Subject")]
    pub subject: String,
    #[serde(default, rename = "Status", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, rename = "Queue", skip_serializing_if = "Option::is_none")]
    pub queue: Option<Hyperlink>,
    #[serde(default, rename = "_hyperlinks")]
    pub hyperlinks: Vec<Hyperlink>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagedCollection<T> {
    #[serde(default)]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewComment {
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "ContentType")]
    pub content_type: String,
}

fn find_hyperlink<'a>(
    hyperlinks: &'a [Hyperlink],
    link_ref: &'static str,
) -> Result<&'a Hyperlink, TicketingError> {
    hyperlinks
        .iter()
        .find(|link| link.link_ref.as_deref() == Some(link_ref))
        .ok_or(TicketingError::MissingHyperlink(link_ref))
}

impl Ticket {
    pub fn hyperlink(&self, link_ref: &'static str) -> Result<&Hyperlink, TicketingError> {
        find_hyperlink(&self.hyperlinks, link_ref)
    }
}

impl Queue {
    pub fn create_hyperlink(&self) -> Result<&Hyperlink, TicketingError> {
        find_hyperlink(&self.hyperlinks, HYPERLINK_REF_CREATE)
    }
}

/// Trait contract for the ticketing collaborator; the pipeline and the
/// createTicket handler run against this seam.
#[async_trait]
pub trait TicketingApi: Send + Sync {
    async fn queues(&self) -> Result<PagedCollection<Hyperlink>, TicketingError>;

    async fn queue(&self, queue_id: &str) -> Result<Queue, TicketingError>;

    async fn create_ticket(&self, queue: &Queue, subject: &str) -> Result<Ticket, TicketingError>;

    async fn ticket(&self, link: &Hyperlink) -> Result<Ticket, TicketingError>;

    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), TicketingError>;

    async fn add_comment(
        &self,
        ticket: &Ticket,
        comment: NewComment,
    ) -> Result<(), TicketingError>;

    async fn ticket_history(
        &self,
        ticket: &Ticket,
    ) -> Result<PagedCollection<Hyperlink>, TicketingError>;

    async fn next_page(
        &self,
        page: &PagedCollection<Hyperlink>,
    ) -> Result<Option<PagedCollection<Hyperlink>>, TicketingError>;
}

/// Session-cookie client for an RT-style REST 2.0 endpoint. Login is
/// lazy: the first call that needs a session performs it.
pub struct RtClient {
    http: Client,
    endpoint: String,
    username: String,
    password: String,
    cookie: Mutex<Option<String>>,
}

fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

impl RtClient {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            cookie: Mutex::new(None),
        }
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/REST/2.0{}", self.endpoint, path)
    }

    async fn login(&self) -> Result<String, TicketingError> {
        tracing::debug!(endpoint = self.endpoint.as_str(), "ticketing login");
        let response = self
            .http
            .post(&self.endpoint)
            .form(&[
                ("user", self.username.as_str()),
                ("pass", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|error| TicketingError::Network(error.to_string()))?;
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
            .ok_or(TicketingError::LoginFailed)?;
        Ok(cookie)
    }

    async fn session_cookie(&self) -> Result<String, TicketingError> {
        let mut guard = self.cookie.lock().await;
        if let Some(cookie) = guard.as_ref() {
            return Ok(cookie.clone());
        }
        let cookie = self.login().await?;
        *guard = Some(cookie.clone());
        Ok(cookie)
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TicketingError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TicketingError::Api {
                status: status.as_u16(),
                body: truncate_for_error(&body),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|error| TicketingError::InvalidResponse(error.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TicketingError> {
        let cookie = self.session_cookie().await?;
        tracing::debug!(url, "ticketing request");
        let response = self
            .http
            .get(url)
            .header(reqwest::header::COOKIE, cookie)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| TicketingError::Network(error.to_string()))?;
        Self::decode(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: serde_json::Value,
    ) -> Result<T, TicketingError> {
        let cookie = self.session_cookie().await?;
        tracing::debug!(url, "ticketing request");
        let response = self
            .http
            .request(method, url)
            .header(reqwest::header::COOKIE, cookie)
            .json(&body)
            .send()
            .await
            .map_err(|error| TicketingError::Network(error.to_string()))?;
        Self::decode(response).await
    }
}

#[async_trait]
impl TicketingApi for RtClient {
    async fn queues(&self) -> Result<PagedCollection<Hyperlink>, TicketingError> {
        self.get_json(&self.rest_url("/queues/all")).await
    }

    async fn queue(&self, queue_id: &str) -> Result<Queue, TicketingError> {
        self.get_json(&self.rest_url(&format!("/queue/{queue_id}")))
            .await
    }

    async fn create_ticket(&self, queue: &Queue, subject: &str) -> Result<Ticket, TicketingError> {
        let create = queue.create_hyperlink()?;
        let created: Hyperlink = self
            .send_json(
                reqwest::Method::POST,
                &create.url,
                json!({ "Subject": subject }),
            )
            .await?;
        self.ticket(&created).await
    }

    async fn ticket(&self, link: &Hyperlink) -> Result<Ticket, TicketingError> {
        if let Some(kind) = link.kind.as_deref() {
            if kind != "ticket" {
                return Err(TicketingError::WrongHyperlinkType {
                    expected: "ticket",
                    actual: kind.to_string(),
                });
            }
        }
        self.get_json(&link.url).await
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), TicketingError> {
        let link = ticket.hyperlink(HYPERLINK_REF_SELF)?;
        let _: serde_json::Value = self
            .send_json(
                reqwest::Method::PUT,
                &link.url,
                json!({ "Status": ticket.status }),
            )
            .await?;
        Ok(())
    }

    async fn add_comment(
        &self,
        ticket: &Ticket,
        comment: NewComment,
    ) -> Result<(), TicketingError> {
        let link = ticket.hyperlink(HYPERLINK_REF_COMMENT)?;
        let _: serde_json::Value = self
            .send_json(
                reqwest::Method::POST,
                &link.url,
                json!({
                    "Subject": comment.subject,
                    "Content": comment.content,
                    "ContentType": comment.content_type,
                    "TimeTaken": "1",
                }),
            )
            .await?;
        Ok(())
    }

    async fn ticket_history(
        &self,
        ticket: &Ticket,
    ) -> Result<PagedCollection<Hyperlink>, TicketingError> {
        let link = ticket.hyperlink(HYPERLINK_REF_HISTORY)?;
        self.get_json(&link.url).await
    }

    async fn next_page(
        &self,
        page: &PagedCollection<Hyperlink>,
    ) -> Result<Option<PagedCollection<Hyperlink>>, TicketingError> {
        match page.next_page.as_deref() {
            Some(next) => Ok(Some(self.get_json(next).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_with_links() -> Ticket {
        Ticket {
            id: "416115".to_string(),
            subject: "Printer broken".to_string(),
            status: None,
            queue: None,
            hyperlinks: vec![
                Hyperlink {
                    link_ref: Some(HYPERLINK_REF_SELF.to_string()),
                    url: "https://tickets.example.com/REST/2.0/ticket/416115".to_string(),
                    kind: Some("ticket".to_string()),
                    id: Some("416115".to_string()),
                    name: None,
                },
                Hyperlink {
                    link_ref: Some(HYPERLINK_REF_COMMENT.to_string()),
                    url: "https://tickets.example.com/REST/2.0/ticket/416115/comment".to_string(),
                    kind: None,
                    id: None,
                    name: None,
                },
            ],
        }
    }

    #[test]
    fn resolves_hyperlinks_by_ref() {
        let ticket = ticket_with_links();
        assert!(ticket.hyperlink(HYPERLINK_REF_COMMENT).is_ok());
        assert!(matches!(
            ticket.hyperlink(HYPERLINK_REF_HISTORY),
            Err(TicketingError::MissingHyperlink(HYPERLINK_REF_HISTORY))
        ));
    }

    #[test]
    fn parses_queue_with_capitalized_fields() {
        let raw = r#"{
            "id": "1",
            "Name": "General",
            "_hyperlinks": [
                { "ref": "create", "_url": "https://tickets.example.com/REST/2.0/ticket?Queue=1" }
            ]
        }"#;
        let queue: Queue = serde_json::from_str(raw).expect("queue");
        assert_eq!(queue.name, "General");
        assert!(queue.create_hyperlink().is_ok());
    }
}
