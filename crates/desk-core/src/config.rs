//! Runtime configuration shared across the workspace.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/beta";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Bot, directory, and ticketing settings. Every field has an
/// environment-variable source so deployments configure without files.
pub struct DeskConfig {
    pub bot_id: String,
    pub bot_password: String,
    pub bot_connection_name: String,
    pub bot_domain: String,
    pub tenant_id: String,
    pub graph_base_url: String,
    pub ticketing_endpoint: String,
    pub ticketing_username: String,
    pub ticketing_password: String,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl DeskConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bot_id: required("BOT_ID")?,
            bot_password: required("BOT_PASSWORD")?,
            bot_connection_name: required("BOT_CONNECTION_NAME")?,
            bot_domain: optional("BOT_DOMAIN", ""),
            tenant_id: optional("AAD_APP_TENANT_ID", ""),
            graph_base_url: optional("GRAPH_BASE_URL", DEFAULT_GRAPH_BASE_URL),
            ticketing_endpoint: required("TICKETING_ENDPOINT")?,
            ticketing_username: required("TICKETING_USERNAME")?,
            ticketing_password: required("TICKETING_PASSWORD")?,
        })
    }

    /// Human-facing display URL for a created ticket.
    pub fn ticket_display_url(&self, ticket_id: &str) -> String {
        format!(
            "{}/Ticket/Display.html?id={}",
            self.ticketing_endpoint.trim_end_matches('/'),
            ticket_id
        )
    }
}
