//! Per-turn activity routing.

use std::sync::Arc;

use desk_commands::HandlerRegistry;
use desk_core::{ActivityType, TurnContext, ADAPTIVE_CARD_ACTION_NAME, TOKEN_RESPONSE_EVENT_NAME};
use desk_dialog::AuthDialog;

const SIGNIN_CANCELLED_STATE: &str = "CancelledByUser";
const SIGNIN_CANCELLED_MESSAGE: &str = "The sign-in flow was cancelled.";

/// The conversation turn loop. One inbound activity is one turn; errors
/// inside a turn are logged and contained so the loop never crashes.
pub struct DeskBot {
    registry: Arc<HandlerRegistry>,
    dialog: Arc<AuthDialog>,
}

impl DeskBot {
    pub fn new(registry: Arc<HandlerRegistry>, dialog: Arc<AuthDialog>) -> Self {
        Self { registry, dialog }
    }

    /// Entry point for every inbound activity. Never propagates an
    /// error to the transport layer.
    pub async fn process(&self, ctx: &TurnContext) {
        if let Err(error) = self.process_turn(ctx).await {
            tracing::error!(
                conversation = ctx.conversation_id(),
                %error,
                "turn processing failed"
            );
        }
    }

    async fn process_turn(&self, ctx: &TurnContext) -> anyhow::Result<()> {
        let activity = &ctx.activity;
        match activity.activity_type {
            ActivityType::Message => self.handle_message(ctx).await,
            ActivityType::Invoke if activity.is_signin_confirmation() => {
                self.handle_signin_confirmation(ctx).await
            }
            ActivityType::Invoke
                if activity.name.as_deref() == Some(ADAPTIVE_CARD_ACTION_NAME) =>
            {
                self.handle_card_action(ctx).await
            }
            ActivityType::Event
                if activity.name.as_deref() == Some(TOKEN_RESPONSE_EVENT_NAME) =>
            {
                self.handle_token_response(ctx).await
            }
            _ => {
                tracing::debug!(
                    activity_type = ?activity.activity_type,
                    name = activity.name.as_deref().unwrap_or(""),
                    "ignoring activity"
                );
                Ok(())
            }
        }
    }

    async fn handle_message(&self, ctx: &TurnContext) -> anyhow::Result<()> {
        let Some(text) = ctx.activity.normalized_text() else {
            return Ok(());
        };
        tracing::debug!(text = text.as_str(), "message turn");
        // Unregistered text is expected traffic; the outcome is ignored.
        self.registry.dispatch_command(ctx, &text).await;
        Ok(())
    }

    async fn handle_card_action(&self, ctx: &TurnContext) -> anyhow::Result<()> {
        let Some(action) = ctx.activity.card_action() else {
            tracing::debug!("card action invoke without a parsable action envelope");
            return Ok(());
        };
        tracing::debug!(verb = action.verb.as_str(), "card action turn");
        self.registry
            .dispatch_action(ctx, &action.verb, action.data)
            .await;
        Ok(())
    }

    /// Sign-in confirmation turns retire the sign-in card, then either
    /// cancel the dialog (user declined) or continue it so the Dedup
    /// step runs.
    async fn handle_signin_confirmation(&self, ctx: &TurnContext) -> anyhow::Result<()> {
        if let Err(error) = ctx.delete_reply_target().await {
            tracing::warn!(%error, "failed to delete sign-in card");
        }
        let cancelled = ctx
            .activity
            .signin_state_query()
            .and_then(|query| query.state)
            .map(|state| state.contains(SIGNIN_CANCELLED_STATE))
            .unwrap_or(false);
        if cancelled {
            ctx.send_text(SIGNIN_CANCELLED_MESSAGE).await?;
            self.dialog.stop(ctx).await?;
            return Ok(());
        }
        self.dialog.continue_dialog(ctx).await?;
        Ok(())
    }

    async fn handle_token_response(&self, ctx: &TurnContext) -> anyhow::Result<()> {
        if let Err(error) = ctx.delete_reply_target().await {
            tracing::warn!(%error, "failed to delete sign-in card");
        }
        self.dialog.continue_dialog(ctx).await?;
        Ok(())
    }
}
