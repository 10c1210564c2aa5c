//! Remote thread message model and chronological linearization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::GraphApi;

pub const APPLICATION_IDENTITY_TYPE_BOT: &str = "bot";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageUser {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageFrom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<MessageUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttachment {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MentionedApplication {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub application_identity_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Mentioned {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<MessageUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<MentionedApplication>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMention {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub mention_text: String,
    #[serde(default)]
    pub mentioned: Mentioned,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// One message in a remote conversation thread.
pub struct ThreadMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<MessageFrom>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<MessageAttachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<MessageMention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

impl ThreadMessage {
    pub fn author_name(&self) -> Option<&str> {
        self.from
            .as_ref()
            .and_then(|from| from.user.as_ref())
            .map(|user| user.display_name.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
/// One page of replies; the source delivers pages newest-first with a
/// continuation link when more remain.
pub struct MessagePage {
    #[serde(default, rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(default)]
    pub value: Vec<ThreadMessage>,
}

/// Extracts the thread message id from a group-conversation id of the
/// form `19:...@thread.tacv2;messageid=1234567890`.
pub fn thread_id_from_conversation_id(conversation_id: &str) -> Option<String> {
    let (_, tail) = conversation_id.split_once(';')?;
    let id = tail.strip_prefix("messageid=").unwrap_or(tail).trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Builds the chronological transcript: one synthetic seed message
/// carrying the user-typed description (attributed to the root author),
/// then the root, then the replies oldest to newest. `replies` is the
/// accumulated reply list in source order (newest first) and is reversed
/// as a whole.
pub fn linearize_thread(
    root: ThreadMessage,
    mut replies: Vec<ThreadMessage>,
    description: &str,
) -> Vec<ThreadMessage> {
    replies.reverse();
    let seed = ThreadMessage {
        body: MessageBody {
            content: description.to_string(),
            content_type: "text/html".to_string(),
        },
        from: root.from.clone(),
        created_date_time: root.created_date_time,
        ..ThreadMessage::default()
    };
    let mut linearized = Vec::with_capacity(replies.len() + 2);
    linearized.push(seed);
    linearized.push(root);
    linearized.extend(replies);
    linearized
}

/// Fetches the root message and every reply page, then linearizes. Any
/// failed fetch aborts the reconstruction; no partial thread is returned.
pub async fn reconstruct_thread(
    client: &dyn GraphApi,
    team_aad_group_id: &str,
    channel_id: &str,
    thread_id: &str,
    description: &str,
) -> anyhow::Result<Vec<ThreadMessage>> {
    let root = client
        .channel_message(team_aad_group_id, channel_id, thread_id)
        .await?;
    let mut page = client
        .channel_message_replies(team_aad_group_id, channel_id, thread_id)
        .await?;
    let mut replies = std::mem::take(&mut page.value);
    let mut next_link = page.next_link;
    while let Some(link) = next_link {
        let mut next = client.next_page(&link).await?;
        replies.append(&mut next.value);
        next_link = next.next_link;
    }
    tracing::debug!(
        thread_id,
        replies = replies.len(),
        "thread reconstruction complete"
    );
    Ok(linearize_thread(root, replies, description))
}
