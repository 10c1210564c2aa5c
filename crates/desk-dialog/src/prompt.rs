//! Credential prompt collaborator.

use async_trait::async_trait;
use desk_core::{CardAttachment, OutboundActivity, TurnContext};
use serde_json::json;

const OAUTH_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.oauth";

/// Issues the sign-in request to the user. The OAuth protocol itself is
/// an external capability; the dialog only needs the request sent.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn request_credential(&self, ctx: &TurnContext) -> anyhow::Result<()>;
}

/// Sends an OAuth card bound to the bot's token connection. The
/// transport completes the flow and delivers the confirmation invokes
/// on later turns.
pub struct OAuthCardPrompt {
    connection_name: String,
    title: String,
    text: String,
}

impl OAuthCardPrompt {
    pub fn new(connection_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            title: "Sign in".to_string(),
            text: "Please review and accept the consent flow to continue.".to_string(),
        }
    }
}

#[async_trait]
impl CredentialPrompt for OAuthCardPrompt {
    async fn request_credential(&self, ctx: &TurnContext) -> anyhow::Result<()> {
        let card = OutboundActivity {
            text: None,
            attachments: vec![CardAttachment {
                content_type: OAUTH_CARD_CONTENT_TYPE.to_string(),
                content: json!({
                    "text": self.text,
                    "connectionName": self.connection_name,
                    "buttons": [
                        { "type": "signin", "title": self.title, "value": "" }
                    ],
                }),
            }],
        };
        ctx.send_activity(card).await?;
        Ok(())
    }
}
