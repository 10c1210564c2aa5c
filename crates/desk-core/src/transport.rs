//! Abstract outbound channel the bot replies through.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::activity::Activity;

pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport api error: status={status} message={message}")]
    Api { status: u16, message: String },
    #[error("transport network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// A card attachment on an outgoing message.
pub struct CardAttachment {
    pub content_type: String,
    pub content: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Outgoing message content: plain text, a card, or both.
pub struct OutboundActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<CardAttachment>,
}

impl OutboundActivity {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    pub fn adaptive_card(content: Value) -> Self {
        Self {
            text: None,
            attachments: vec![CardAttachment {
                content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_string(),
                content,
            }],
        }
    }
}

/// Trait contract for the conversational transport's outbound surface.
/// Production wires a connector client; tests record sent activities.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Sends a new activity into the conversation and returns its id.
    async fn send_activity(
        &self,
        conversation_id: &str,
        content: OutboundActivity,
    ) -> Result<String, TransportError>;

    async fn update_activity(
        &self,
        conversation_id: &str,
        activity_id: &str,
        content: OutboundActivity,
    ) -> Result<(), TransportError>;

    async fn delete_activity(
        &self,
        conversation_id: &str,
        activity_id: &str,
    ) -> Result<(), TransportError>;
}

#[derive(Clone)]
/// One inbound activity paired with the channel it arrived on. Every
/// handler and dialog step works through this.
pub struct TurnContext {
    pub activity: Activity,
    channel: Arc<dyn ConversationApi>,
}

impl TurnContext {
    pub fn new(activity: Activity, channel: Arc<dyn ConversationApi>) -> Self {
        Self { activity, channel }
    }

    pub fn conversation_id(&self) -> &str {
        &self.activity.conversation.id
    }

    pub async fn send_activity(
        &self,
        content: OutboundActivity,
    ) -> Result<String, TransportError> {
        tracing::debug!(
            conversation = self.conversation_id(),
            attachments = content.attachments.len(),
            "sending activity"
        );
        self.channel
            .send_activity(self.conversation_id(), content)
            .await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<String, TransportError> {
        self.channel
            .send_activity(self.conversation_id(), OutboundActivity::text(text))
            .await
    }

    pub async fn send_card(&self, content: Value) -> Result<String, TransportError> {
        self.channel
            .send_activity(
                self.conversation_id(),
                OutboundActivity::adaptive_card(content),
            )
            .await
    }

    pub async fn update_card(
        &self,
        activity_id: &str,
        content: Value,
    ) -> Result<(), TransportError> {
        tracing::debug!(
            conversation = self.conversation_id(),
            activity_id,
            "updating activity"
        );
        self.channel
            .update_activity(
                self.conversation_id(),
                activity_id,
                OutboundActivity::adaptive_card(content),
            )
            .await
    }

    pub async fn delete_activity(&self, activity_id: &str) -> Result<(), TransportError> {
        tracing::debug!(
            conversation = self.conversation_id(),
            activity_id,
            "deleting activity"
        );
        self.channel
            .delete_activity(self.conversation_id(), activity_id)
            .await
    }

    /// Deletes the activity this turn replies to, when there is one.
    /// Used to retire the sign-in card once the flow confirms.
    pub async fn delete_reply_target(&self) -> Result<(), TransportError> {
        if let Some(reply_to) = self.activity.reply_to_id.clone() {
            self.delete_activity(&reply_to).await?;
        }
        Ok(())
    }
}
