//! Inbound activity model for the transport boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SIGNIN_VERIFY_STATE_NAME: &str = "signin/verifyState";
pub const SIGNIN_TOKEN_EXCHANGE_NAME: &str = "signin/tokenExchange";
pub const ADAPTIVE_CARD_ACTION_NAME: &str = "adaptiveCard/action";
pub const TOKEN_RESPONSE_EVENT_NAME: &str = "tokens/response";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Enumerates the activity types the turn loop routes on.
pub enum ActivityType {
    Message,
    Invoke,
    Event,
    ConversationUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Conversation coordinates carried on every activity.
pub struct ConversationRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// A channel account: the sender or the bot itself.
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// One typed inbound event delivered by the conversational transport.
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub channel_id: String,
    pub conversation: ConversationRef,
    pub from: Account,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Account>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// `adaptiveCard/action` invoke payload: a verb plus an opaque data bag
/// that handlers validate into their own typed shapes.
pub struct CardActionValue {
    pub verb: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
/// Sign-in confirmation payload shared by the verify-state and
/// token-exchange invokes.
pub struct SignInStateQuery {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Bearer credential yielded by a completed sign-in flow.
pub struct TokenResponse {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl Activity {
    pub fn is_invoke_named(&self, name: &str) -> bool {
        self.activity_type == ActivityType::Invoke && self.name.as_deref() == Some(name)
    }

    pub fn is_signin_verify_state(&self) -> bool {
        self.is_invoke_named(SIGNIN_VERIFY_STATE_NAME)
    }

    pub fn is_signin_token_exchange(&self) -> bool {
        self.is_invoke_named(SIGNIN_TOKEN_EXCHANGE_NAME)
    }

    pub fn is_signin_confirmation(&self) -> bool {
        self.is_signin_verify_state() || self.is_signin_token_exchange()
    }

    /// Parses the `adaptiveCard/action` envelope from the activity value.
    pub fn card_action(&self) -> Option<CardActionValue> {
        if !self.is_invoke_named(ADAPTIVE_CARD_ACTION_NAME) {
            return None;
        }
        let action = self.value.as_ref()?.get("action")?;
        serde_json::from_value(action.clone()).ok()
    }

    pub fn signin_state_query(&self) -> Option<SignInStateQuery> {
        if !self.is_signin_confirmation() {
            return None;
        }
        serde_json::from_value(self.value.clone()?).ok()
    }

    /// Extracts a credential carried on this turn, either from a
    /// token-exchange invoke value or from a `tokens/response` event.
    pub fn token_response(&self) -> Option<TokenResponse> {
        if self.is_signin_token_exchange() {
            let token = self.signin_state_query()?.token?;
            if token.trim().is_empty() {
                return None;
            }
            return Some(TokenResponse {
                token,
                connection_name: None,
                expiration: None,
            });
        }
        if self.activity_type == ActivityType::Event
            && self.name.as_deref() == Some(TOKEN_RESPONSE_EVENT_NAME)
        {
            return serde_json::from_value(self.value.clone()?).ok();
        }
        None
    }

    /// Activity text with the bot @mention stripped, lowercased, line
    /// breaks removed, and whitespace trimmed. Commands are matched on
    /// this normalized form.
    pub fn normalized_text(&self) -> Option<String> {
        let raw = self.text.as_deref()?;
        let mut text = raw.to_string();
        if let Some(recipient) = &self.recipient {
            if !recipient.name.is_empty() {
                let tag = format!("<at>{}</at>", recipient.name);
                text = text.replace(&tag, "");
                let at = format!("@{}", recipient.name);
                text = text.replace(&at, "");
            }
        }
        let normalized = text
            .to_lowercase()
            .replace(['\n', '\r'], "")
            .trim()
            .to_string();
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}
