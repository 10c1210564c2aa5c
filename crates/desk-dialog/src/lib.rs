//! Auth dialog state machine: a persisted per-conversation waterfall of
//! Prompt, Dedup, and Dispatch steps that survives across turns.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use thiserror::Error;

use desk_core::{render_card, TokenResponse, TurnContext, CREATE_TICKET_CARD_TEMPLATE};
use desk_graph::{thread_id_from_conversation_id, GraphApi};
use desk_store::{StateStore, StoreError};

mod dedup;
mod prompt;
mod session;

pub use dedup::dedup_key;
pub use prompt::{CredentialPrompt, OAuthCardPrompt};
pub use session::{
    AuthRefreshData, ChannelRef, ConversationSeed, DialogOptions, DialogSession, DialogStep,
    QueueChoice, TeamRef,
};

use session::session_key;

const SIGN_IN_FAILED_MESSAGE: &str =
    "Unable to sign you in, or the authentication flow was declined.";
const DISPATCH_FAILED_MESSAGE: &str =
    "Something went wrong while preparing the ticket form. Please try again.";

#[derive(Debug, Error)]
pub enum DialogError {
    /// Contract violation: a dedup key was requested for an activity
    /// that is not one of the two sign-in confirmation kinds. Loudly
    /// distinct from a storage conflict.
    #[error(
        "cannot derive dedup key: activity '{activity}' is not a sign-in confirmation invoke"
    )]
    DedupKeyUnavailable { activity: String },
    #[error("cannot derive dedup key: confirmation activity value is missing its id")]
    DedupKeyMissingId,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("persisted dialog session is corrupt: {0}")]
    CorruptSession(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of driving the dialog for one turn.
pub enum TurnStatus {
    /// The dialog suspended and awaits a later inbound event.
    Waiting,
    /// The dialog ran to completion (or ended without a session).
    Complete,
}

/// Builds a graph client bound to the credential the dialog obtained.
pub trait GraphApiFactory: Send + Sync {
    fn for_token(&self, token: &str) -> Arc<dyn GraphApi>;
}

#[derive(Debug, Clone)]
pub struct DialogSettings {
    /// Queue choices offered on the ticket card, resolved at startup.
    pub queue_choices: Vec<QueueChoice>,
    pub prompt_timeout_ms: i64,
}

impl Default for DialogSettings {
    fn default() -> Self {
        Self {
            queue_choices: Vec::new(),
            prompt_timeout_ms: desk_store::DEFAULT_CLAIM_TTL_MS,
        }
    }
}

/// The persisted waterfall. `run` resumes an active session at its
/// current step or starts a fresh one at Prompt; `stop` abandons it.
pub struct AuthDialog {
    store: Arc<dyn StateStore>,
    prompt: Arc<dyn CredentialPrompt>,
    graph_factory: Arc<dyn GraphApiFactory>,
    settings: DialogSettings,
}

impl AuthDialog {
    pub fn new(
        store: Arc<dyn StateStore>,
        prompt: Arc<dyn CredentialPrompt>,
        graph_factory: Arc<dyn GraphApiFactory>,
        settings: DialogSettings,
    ) -> Self {
        Self {
            store,
            prompt,
            graph_factory,
            settings,
        }
    }

    /// Drives the conversation's dialog for this turn. With no active
    /// session a new one starts at Prompt, seeded with `options`; with
    /// one, the turn resumes at the session's current step.
    pub async fn run(
        &self,
        ctx: &TurnContext,
        options: Option<DialogOptions>,
    ) -> Result<TurnStatus> {
        let key = session_key(&ctx.activity);
        match self.load_session(&key).await? {
            Some(session) => self.resume(ctx, &key, session).await,
            None => {
                let options = options.unwrap_or_default();
                self.begin(ctx, &key, options).await
            }
        }
    }

    /// Resumes an active session if there is one; does nothing otherwise.
    /// Confirmation turns land here when no command seeded the dialog.
    pub async fn continue_dialog(&self, ctx: &TurnContext) -> Result<TurnStatus> {
        let key = session_key(&ctx.activity);
        match self.load_session(&key).await? {
            Some(session) => self.resume(ctx, &key, session).await,
            None => Ok(TurnStatus::Complete),
        }
    }

    /// Explicit cancellation: clears persisted state without running
    /// the Dispatch step.
    pub async fn stop(&self, ctx: &TurnContext) -> Result<()> {
        let key = session_key(&ctx.activity);
        self.store.delete(&key).await.map_err(DialogError::Store)?;
        tracing::debug!(key = key.as_str(), "dialog cancelled");
        Ok(())
    }

    async fn load_session(&self, key: &str) -> Result<Option<DialogSession>, DialogError> {
        match self.store.get(key).await? {
            Some(value) => {
                let session = serde_json::from_value(value)
                    .map_err(|error| DialogError::CorruptSession(error.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Prompt step. A failure to issue the credential request is
    /// non-fatal: the dialog falls through to Dedup in the same turn
    /// with an empty credential, which Dispatch reports to the user.
    async fn begin(
        &self,
        ctx: &TurnContext,
        key: &str,
        options: DialogOptions,
    ) -> Result<TurnStatus> {
        tracing::debug!(
            key,
            command = options.command.as_str(),
            "dialog prompt step"
        );
        if let Err(error) = self.prompt.request_credential(ctx).await {
            tracing::error!(key, %error, "failed to issue credential prompt");
            return self.dedup_step(ctx, key, options, None).await;
        }
        let session = DialogSession::awaiting_confirmation(options, self.settings.prompt_timeout_ms);
        self.store
            .put(key, serde_json::to_value(&session).map_err(to_store_error)?)
            .await
            .map_err(DialogError::Store)?;
        Ok(TurnStatus::Waiting)
    }

    async fn resume(
        &self,
        ctx: &TurnContext,
        key: &str,
        session: DialogSession,
    ) -> Result<TurnStatus> {
        tracing::debug!(key, step = ?session.step, "dialog resume");
        let token = ctx.activity.token_response();
        match session.step {
            DialogStep::Prompt => {
                // A session persisted at Prompt never completed issuing
                // the request; start over with the stored options.
                self.store.delete(key).await.map_err(DialogError::Store)?;
                self.begin(ctx, key, session.options).await
            }
            DialogStep::Dedup => self.dedup_step(ctx, key, session.options, token).await,
            DialogStep::Dispatch => {
                self.dispatch_step(ctx, key, session.options, token).await
            }
        }
    }

    /// Dedup step. Runs only after the prompt so every signed-in client
    /// has received the sign-in request; the first confirmation claims
    /// the event id and proceeds, the rest end their turn silently.
    async fn dedup_step(
        &self,
        ctx: &TurnContext,
        key: &str,
        options: DialogOptions,
        token: Option<TokenResponse>,
    ) -> Result<TurnStatus> {
        if token.is_some() && self.is_duplicate_confirmation(ctx).await? {
            tracing::debug!(key, "duplicate sign-in confirmation, ending turn");
            return Ok(TurnStatus::Waiting);
        }
        self.dispatch_step(ctx, key, options, token).await
    }

    /// Claims the confirmation's event id. Non-confirmation turns never
    /// dedup; a missing claim means this delivery proceeds.
    async fn is_duplicate_confirmation(&self, ctx: &TurnContext) -> Result<bool, DialogError> {
        let activity = &ctx.activity;
        if !activity.is_signin_confirmation() {
            return Ok(false);
        }
        let Some(event_id) = dedup::confirmation_event_id(activity) else {
            return Ok(false);
        };
        let claim_key = dedup_key(activity)?;
        let claimed = self.store.try_claim(&claim_key, &event_id).await?;
        Ok(!claimed)
    }

    /// Terminal step: performs the authenticated action and ends the
    /// dialog. Without a credential it reports the failure instead.
    async fn dispatch_step(
        &self,
        ctx: &TurnContext,
        key: &str,
        options: DialogOptions,
        token: Option<TokenResponse>,
    ) -> Result<TurnStatus> {
        self.store.delete(key).await.map_err(DialogError::Store)?;
        let Some(token) = token else {
            ctx.send_text(SIGN_IN_FAILED_MESSAGE).await?;
            return Ok(TurnStatus::Complete);
        };
        if let Err(error) = self.authenticated_dispatch(ctx, &options, &token).await {
            tracing::error!(key, %error, "dialog dispatch failed");
            ctx.send_text(DISPATCH_FAILED_MESSAGE).await?;
        }
        Ok(TurnStatus::Complete)
    }

    async fn authenticated_dispatch(
        &self,
        ctx: &TurnContext,
        options: &DialogOptions,
        token: &TokenResponse,
    ) -> Result<()> {
        let graph = self.graph_factory.for_token(&token.token);
        let profile = graph.me().await?;

        // Validate the opaque payload carried since Prompt into its
        // typed shape before acting on it.
        let data: AuthRefreshData = match &options.data {
            Some(value) => serde_json::from_value(value.clone())?,
            None => AuthRefreshData::default(),
        };

        let mut channel_name = data
            .channel
            .as_ref()
            .map(|channel| channel.name.clone())
            .unwrap_or_default();
        let mut thread_id = None;
        let mut thread_subject = None;
        if let (Some(team), Some(channel)) = (&data.team, &data.channel) {
            if let Some(aad_group_id) = &team.aad_group_id {
                let channel_info = graph.team_channel(aad_group_id, &channel.id).await?;
                channel_name = channel_info.display_name;
                if let Some(conversation) = &data.conversation {
                    if let Some(message_id) = thread_id_from_conversation_id(&conversation.id) {
                        let message = graph
                            .channel_message(aad_group_id, &channel.id, &message_id)
                            .await?;
                        thread_subject = message.subject;
                        thread_id = Some(message_id);
                    }
                }
            }
        }

        let card_data = json!({
            "command": options.command,
            "team": {
                "id": data.team.as_ref().map(|team| team.id.clone()).unwrap_or_default(),
                "name": data.team.as_ref().map(|team| team.name.clone()).unwrap_or_default(),
                "aadGroupId": data
                    .team
                    .as_ref()
                    .and_then(|team| team.aad_group_id.clone())
                    .unwrap_or_default(),
            },
            "channel": {
                "id": data.channel.as_ref().map(|channel| channel.id.clone()).unwrap_or_default(),
                "name": channel_name,
            },
            "conversation": {
                "id": thread_id.unwrap_or_default(),
                "message": thread_subject.unwrap_or_default(),
            },
            "from": {
                "id": data.from.as_ref().map(|from| from.id.clone()).unwrap_or_default(),
                "name": data.from.as_ref().map(|from| from.name.clone()).unwrap_or_default(),
                "email": profile.mail.unwrap_or_default(),
            },
            "createdUtc": chrono::Utc::now().to_rfc2822(),
            "token": token.token,
            "queues": self.settings.queue_choices,
            "showButtons": true,
        });
        let card = render_card(CREATE_TICKET_CARD_TEMPLATE, &card_data)?;
        ctx.send_card(card).await?;
        Ok(())
    }
}

fn to_store_error(error: serde_json::Error) -> DialogError {
    DialogError::Store(StoreError::Serialization(error.to_string()))
}
