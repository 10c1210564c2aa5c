//! Persisted dialog session record and the payload shapes it carries.

use desk_core::Activity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Waterfall position. The persisted step is the one that will consume
/// the next inbound turn.
pub enum DialogStep {
    Prompt,
    Dedup,
    Dispatch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
/// The originating command and its opaque data bag, carried from Prompt
/// through to Dispatch.
pub struct DialogOptions {
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DialogOptions {
    pub fn for_command(command: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            command: command.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Per-conversation dialog record. One active session per conversation;
/// created on the first turn lacking one, mutated once per step, deleted
/// on cancellation or when Dispatch ends the dialog.
pub struct DialogSession {
    pub step: DialogStep,
    pub options: DialogOptions,
    pub expires_unix_ms: i64,
}

impl DialogSession {
    /// Session state after a successfully issued credential prompt: the
    /// next turn lands on the Dedup step.
    pub fn awaiting_confirmation(options: DialogOptions, prompt_timeout_ms: i64) -> Self {
        Self {
            step: DialogStep::Dedup,
            options,
            expires_unix_ms: chrono::Utc::now().timestamp_millis() + prompt_timeout_ms,
        }
    }
}

/// Storage key owning the conversation's single active session.
pub fn session_key(activity: &Activity) -> String {
    format!(
        "dialog/{}/{}",
        activity.channel_id, activity.conversation.id
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_group_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSeed {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Typed shape of the auth-refresh payload a card action carries into
/// the dialog; validated at the dispatch boundary.
pub struct AuthRefreshData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationSeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<desk_core::Account>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One selectable queue on the ticket card.
pub struct QueueChoice {
    pub title: String,
    pub value: String,
}
