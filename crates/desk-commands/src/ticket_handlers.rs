//! The registered command and card-action handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use desk_core::{
    render_card, Account, DeskConfig, TurnContext, TICKET_CARD_TEMPLATE,
};
use desk_dialog::{
    AuthDialog, AuthRefreshData, ChannelRef, DialogOptions, GraphApiFactory, TeamRef,
};
use desk_graph::reconstruct_thread;
use desk_ticketing::{create_ticket_from_thread, TicketingApi};

use crate::{Handler, HandlerRegistry};

pub const COMMAND_NEW_TICKET: &str = "new ticket";
pub const ACTION_AUTH_REFRESH: &str = "authRefresh";
pub const ACTION_CREATE_TICKET: &str = "createTicket";
pub const ACTION_CANCEL_TICKET: &str = "cancelTicket";

const TICKET_FAILED_MESSAGE: &str = "Could not create the ticket. Please try again later.";

/// Starts the auth dialog for the "new ticket" chat command.
pub struct NewTicketCommandHandler {
    dialog: Arc<AuthDialog>,
}

impl NewTicketCommandHandler {
    pub fn new(dialog: Arc<AuthDialog>) -> Self {
        Self { dialog }
    }
}

#[async_trait]
impl Handler for NewTicketCommandHandler {
    async fn run(
        &self,
        ctx: &TurnContext,
        trigger: &str,
        _data: Option<Value>,
    ) -> anyhow::Result<()> {
        self.dialog
            .run(ctx, Some(DialogOptions::for_command(trigger, None)))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AuthRefreshActionData {
    #[serde(default)]
    command: String,
    #[serde(flatten)]
    data: AuthRefreshData,
}

/// Card `authRefresh` action: re-enters the auth dialog carrying the
/// card's team/channel/conversation context.
pub struct AuthRefreshActionHandler {
    dialog: Arc<AuthDialog>,
}

impl AuthRefreshActionHandler {
    pub fn new(dialog: Arc<AuthDialog>) -> Self {
        Self { dialog }
    }
}

#[async_trait]
impl Handler for AuthRefreshActionHandler {
    async fn run(
        &self,
        ctx: &TurnContext,
        trigger: &str,
        data: Option<Value>,
    ) -> anyhow::Result<()> {
        // Validate the payload before the dialog carries it forward.
        let parsed: AuthRefreshActionData = match data {
            Some(value) => serde_json::from_value(value)?,
            None => anyhow::bail!("authRefresh action carried no data"),
        };
        let command = if parsed.command.is_empty() {
            trigger.to_string()
        } else {
            parsed.command
        };
        let options =
            DialogOptions::for_command(command, Some(serde_json::to_value(&parsed.data)?));
        self.dialog.run(ctx, Some(options)).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationDetail {
    id: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Typed shape of the `createTicket` card submit, validated at the
/// dispatch boundary. The queue choice and description arrive as the
/// card's input fields.
struct CreateTicketActionData {
    team: TeamRef,
    channel: ChannelRef,
    conversation: ConversationDetail,
    from: Account,
    token: String,
    #[serde(default)]
    created_utc: String,
    ticket_queue_choice_set: String,
    #[serde(default)]
    ticket_description_input: String,
}

/// Card `createTicket` action: reconstructs the thread, creates one
/// ticket, and replays the thread as comments.
pub struct CreateTicketActionHandler {
    config: Arc<DeskConfig>,
    ticketing: Arc<dyn TicketingApi>,
    graph_factory: Arc<dyn GraphApiFactory>,
}

impl CreateTicketActionHandler {
    pub fn new(
        config: Arc<DeskConfig>,
        ticketing: Arc<dyn TicketingApi>,
        graph_factory: Arc<dyn GraphApiFactory>,
    ) -> Self {
        Self {
            config,
            ticketing,
            graph_factory,
        }
    }

    async fn execute(&self, ctx: &TurnContext, data: CreateTicketActionData) -> anyhow::Result<()> {
        // Disable the create button first so the normal UI path cannot
        // submit the same request twice while the pipeline runs.
        if let Some(reply_to) = ctx.activity.reply_to_id.clone() {
            let card_data = json!({
                "team": data.team,
                "channel": data.channel,
                "conversation": { "id": data.conversation.id, "message": data.conversation.message },
                "from": data.from,
                "ticket": {
                    "queue": data.ticket_queue_choice_set,
                    "description": data.ticket_description_input,
                },
                "token": data.token,
                "createdUtc": data.created_utc,
                "createEnabled": false,
                "cancelLabel": "Dismiss",
            });
            let card = render_card(TICKET_CARD_TEMPLATE, &card_data)?;
            if let Err(error) = ctx.update_card(&reply_to, card).await {
                tracing::warn!(%error, "failed to update ticket card");
            }
        }

        let team_group_id = data
            .team
            .aad_group_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("createTicket data is missing the team group id"))?;
        let graph = self.graph_factory.for_token(&data.token);
        let thread = reconstruct_thread(
            graph.as_ref(),
            team_group_id,
            &data.channel.id,
            &data.conversation.id,
            &data.ticket_description_input,
        )
        .await?;

        // Subject comes from the thread root; the card's snapshot of the
        // root message is the fallback.
        let subject = thread
            .get(1)
            .and_then(|root| root.subject.clone())
            .filter(|subject| !subject.trim().is_empty())
            .unwrap_or_else(|| data.conversation.message.clone());

        let (ticket, summary) = create_ticket_from_thread(
            self.ticketing.as_ref(),
            &data.ticket_queue_choice_set,
            &subject,
            &thread,
            &self.config.bot_id,
        )
        .await?;
        tracing::info!(
            ticket_id = ticket.id.as_str(),
            posted = summary.posted,
            skipped = summary.skipped,
            failed = summary.failed,
            "thread replayed onto ticket"
        );

        ctx.send_text(format!(
            "Created ticket {}. You can view it at [this link]({}).",
            ticket.id,
            self.config.ticket_display_url(&ticket.id)
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for CreateTicketActionHandler {
    async fn run(
        &self,
        ctx: &TurnContext,
        _trigger: &str,
        data: Option<Value>,
    ) -> anyhow::Result<()> {
        let parsed: CreateTicketActionData = match data {
            Some(value) => serde_json::from_value(value)?,
            None => anyhow::bail!("createTicket action carried no data"),
        };
        if let Err(error) = self.execute(ctx, parsed).await {
            tracing::error!(%error, "ticket creation failed");
            ctx.send_text(TICKET_FAILED_MESSAGE).await?;
        }
        Ok(())
    }
}

/// Card `cancelTicket` action: removes the ticket card.
pub struct CancelTicketActionHandler;

#[async_trait]
impl Handler for CancelTicketActionHandler {
    async fn run(
        &self,
        ctx: &TurnContext,
        _trigger: &str,
        _data: Option<Value>,
    ) -> anyhow::Result<()> {
        ctx.delete_reply_target().await?;
        Ok(())
    }
}

/// Builds the startup registry with every handler the bot serves.
pub fn build_registry(
    dialog: Arc<AuthDialog>,
    config: Arc<DeskConfig>,
    ticketing: Arc<dyn TicketingApi>,
    graph_factory: Arc<dyn GraphApiFactory>,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register_command(
        COMMAND_NEW_TICKET,
        Arc::new(NewTicketCommandHandler::new(Arc::clone(&dialog))),
    );
    registry.register_action(
        ACTION_AUTH_REFRESH,
        Arc::new(AuthRefreshActionHandler::new(dialog)),
    );
    registry.register_action(
        ACTION_CREATE_TICKET,
        Arc::new(CreateTicketActionHandler::new(
            config,
            ticketing,
            graph_factory,
        )),
    );
    registry.register_action(ACTION_CANCEL_TICKET, Arc::new(CancelTicketActionHandler));
    registry
}
