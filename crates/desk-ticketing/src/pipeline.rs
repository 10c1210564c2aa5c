//! Replays a linearized thread as ticket comments.
//!
//! Comments are posted sequentially in thread order; the ticketing
//! system's comment list is a user-visible transcript and must match the
//! conversation. One failed comment is contained to that message;
//! failing to create the ticket aborts the whole operation.

use anyhow::{Context, Result};
use desk_graph::{ThreadMessage, APPLICATION_IDENTITY_TYPE_BOT};

use crate::client::{NewComment, Ticket, TicketingApi};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub posted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// True when the message's only mention target is the bot itself. Such
/// messages are the bot's own prompt-for-context turns and must not
/// become ticket comments.
fn mentions_only_the_bot(message: &ThreadMessage, bot_app_id: &str) -> bool {
    if message.mentions.len() != 1 {
        return false;
    }
    match &message.mentions[0].mentioned.application {
        Some(application) => {
            application.application_identity_type == APPLICATION_IDENTITY_TYPE_BOT
                && application.id == bot_app_id
        }
        None => false,
    }
}

fn should_skip(message: &ThreadMessage, bot_app_id: &str) -> bool {
    if message.body.content.trim().is_empty() {
        return true;
    }
    if message
        .from
        .as_ref()
        .and_then(|from| from.user.as_ref())
        .is_none()
    {
        return true;
    }
    mentions_only_the_bot(message, bot_app_id)
}

/// Builds the comment for one thread message. Attachment links are
/// appended to the body; binary content is not re-uploaded.
fn comment_for_message(message: &ThreadMessage) -> NewComment {
    let author = message.author_name().unwrap_or("unknown");
    let mut content = message.body.content.clone();
    if !message.attachments.is_empty() {
        content.push_str("<br><br>Attachments:<br>");
        for attachment in &message.attachments {
            let name = attachment.name.as_deref().unwrap_or(&attachment.id);
            match attachment.content_url.as_deref() {
                Some(url) => {
                    content.push_str(&format!("<a href=\"{url}\">{name}</a><br>"));
                }
                None => {
                    content.push_str(&format!("{name}<br>"));
                }
            }
        }
    }
    NewComment {
        subject: format!("Reply from {author}"),
        content,
        content_type: "text/html".to_string(),
    }
}

/// Posts one comment per replayable message, in order. Per-comment
/// failures are logged and the loop continues: a partially-commented
/// ticket beats no ticket at all.
pub async fn replay_thread(
    client: &dyn TicketingApi,
    ticket: &Ticket,
    thread: &[ThreadMessage],
    bot_app_id: &str,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for message in thread {
        if should_skip(message, bot_app_id) {
            tracing::debug!(
                message_id = message.id.as_deref().unwrap_or("seed"),
                "skipping thread message"
            );
            summary.skipped += 1;
            continue;
        }
        let comment = comment_for_message(message);
        match client.add_comment(ticket, comment).await {
            Ok(()) => summary.posted += 1,
            Err(error) => {
                tracing::warn!(
                    ticket_id = ticket.id.as_str(),
                    message_id = message.id.as_deref().unwrap_or("seed"),
                    %error,
                    "failed to post ticket comment"
                );
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Resolves the queue, creates exactly one ticket with the given
/// subject, and replays the thread as comments.
pub async fn create_ticket_from_thread(
    client: &dyn TicketingApi,
    queue_id: &str,
    subject: &str,
    thread: &[ThreadMessage],
    bot_app_id: &str,
) -> Result<(Ticket, ReplaySummary)> {
    let queue = client
        .queue(queue_id)
        .await
        .with_context(|| format!("resolving queue {queue_id}"))?;
    let ticket = client
        .create_ticket(&queue, subject)
        .await
        .with_context(|| format!("creating ticket in queue {queue_id}"))?;
    tracing::info!(
        ticket_id = ticket.id.as_str(),
        queue = queue.name.as_str(),
        "ticket created"
    );
    let summary = replay_thread(client, &ticket, thread, bot_app_id).await;
    Ok((ticket, summary))
}
