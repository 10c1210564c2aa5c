//! Handler registry and dispatch orchestrator: routes one inbound event
//! to exactly one registered handler by exact pattern match.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use desk_core::TurnContext;

mod ticket_handlers;

pub use ticket_handlers::{
    build_registry, AuthRefreshActionHandler, CancelTicketActionHandler,
    CreateTicketActionHandler, NewTicketCommandHandler, ACTION_AUTH_REFRESH,
    ACTION_CANCEL_TICKET, ACTION_CREATE_TICKET, COMMAND_NEW_TICKET,
};

/// Trait contract for anything the registry can dispatch to. `trigger`
/// is the normalized command text or the action verb; `data` is the
/// action payload when the event carried one.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn run(&self, ctx: &TurnContext, trigger: &str, data: Option<Value>)
        -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Dispatch result. `NoHandler` is expected traffic, not a fault.
pub enum DispatchOutcome {
    Handled,
    NoHandler,
}

/// Static pattern-to-handler mapping, built once at startup and passed
/// by reference to the turn loop.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<String, Arc<dyn Handler>>,
    actions: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_command(&mut self, pattern: impl Into<String>, handler: Arc<dyn Handler>) {
        self.commands.insert(pattern.into(), handler);
    }

    pub fn register_action(&mut self, verb: impl Into<String>, handler: Arc<dyn Handler>) {
        self.actions.insert(verb.into(), handler);
    }

    pub fn resolve_command(&self, pattern: &str) -> Option<Arc<dyn Handler>> {
        self.commands.get(pattern).cloned()
    }

    pub fn resolve_action(&self, verb: &str) -> Option<Arc<dyn Handler>> {
        self.actions.get(verb).cloned()
    }

    /// Routes a normalized command. Handler errors are caught and
    /// logged here so one misbehaving handler cannot crash the
    /// conversation loop.
    pub async fn dispatch_command(&self, ctx: &TurnContext, text: &str) -> DispatchOutcome {
        match self.resolve_command(text) {
            Some(handler) => {
                if let Err(error) = handler.run(ctx, text, None).await {
                    tracing::error!(command = text, %error, "command handler failed");
                }
                DispatchOutcome::Handled
            }
            None => {
                tracing::debug!(command = text, "no handler registered");
                DispatchOutcome::NoHandler
            }
        }
    }

    /// Routes a card action verb with its payload; same containment as
    /// `dispatch_command`.
    pub async fn dispatch_action(
        &self,
        ctx: &TurnContext,
        verb: &str,
        data: Option<Value>,
    ) -> DispatchOutcome {
        match self.resolve_action(verb) {
            Some(handler) => {
                if let Err(error) = handler.run(ctx, verb, data).await {
                    tracing::error!(verb, %error, "action handler failed");
                }
                DispatchOutcome::Handled
            }
            None => {
                tracing::debug!(verb, "no handler registered");
                DispatchOutcome::NoHandler
            }
        }
    }
}
