//! End-to-end ticket creation: card submit, paged thread reconstruction,
//! and the comment replay onto the new ticket.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use desk_commands::{build_registry, DispatchOutcome, ACTION_CREATE_TICKET};
use desk_core::{
    Account, Activity, ActivityType, ConversationApi, ConversationRef, DeskConfig,
    OutboundActivity, TransportError, TurnContext, ADAPTIVE_CARD_ACTION_NAME,
};
use desk_dialog::{AuthDialog, CredentialPrompt, DialogSettings, GraphApiFactory};
use desk_graph::{
    ChannelInfo, GraphApi, GraphError, MentionedApplication, MessageBody, MessageFrom,
    MessageMention, MessagePage, MessageUser, Mentioned, ThreadMessage, UserProfile,
    APPLICATION_IDENTITY_TYPE_BOT,
};
use desk_store::MemoryStateStore;
use desk_ticketing::{
    Hyperlink, NewComment, PagedCollection, Queue, Ticket, TicketingApi, TicketingError,
};

const BOT_ID: &str = "bot-app-1";

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<OutboundActivity>>,
    updated: Mutex<Vec<String>>,
}

#[async_trait]
impl ConversationApi for RecordingChannel {
    async fn send_activity(
        &self,
        _conversation_id: &str,
        content: OutboundActivity,
    ) -> Result<String, TransportError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(content);
        Ok(format!("sent-{}", sent.len()))
    }

    async fn update_activity(
        &self,
        _conversation_id: &str,
        activity_id: &str,
        _content: OutboundActivity,
    ) -> Result<(), TransportError> {
        self.updated.lock().unwrap().push(activity_id.to_string());
        Ok(())
    }

    async fn delete_activity(
        &self,
        _conversation_id: &str,
        _activity_id: &str,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

struct StubPrompt;

#[async_trait]
impl CredentialPrompt for StubPrompt {
    async fn request_credential(&self, _ctx: &TurnContext) -> anyhow::Result<()> {
        Ok(())
    }
}

fn reply(id: &str, author: &str, body: &str) -> ThreadMessage {
    ThreadMessage {
        id: Some(id.to_string()),
        body: MessageBody {
            content: body.to_string(),
            content_type: "text/html".to_string(),
        },
        from: Some(MessageFrom {
            user: Some(MessageUser {
                id: format!("user-{author}"),
                display_name: author.to_string(),
            }),
        }),
        ..ThreadMessage::default()
    }
}

/// Two reply pages, delivered newest-first as the remote API does. One
/// reply is blank and one mentions only the bot.
struct PagingGraph;

#[async_trait]
impl GraphApi for PagingGraph {
    async fn me(&self) -> Result<UserProfile, GraphError> {
        Ok(UserProfile {
            id: "user-1".to_string(),
            display_name: "Ada".to_string(),
            mail: None,
            user_principal_name: None,
        })
    }

    async fn team_channel(
        &self,
        _team: &str,
        channel_id: &str,
    ) -> Result<ChannelInfo, GraphError> {
        Ok(ChannelInfo {
            id: channel_id.to_string(),
            display_name: "Helpdesk".to_string(),
        })
    }

    async fn channel_message(
        &self,
        _team: &str,
        _channel: &str,
        message_id: &str,
    ) -> Result<ThreadMessage, GraphError> {
        let mut root = reply(message_id, "ada", "root body");
        root.subject = Some("Printer broken".to_string());
        Ok(root)
    }

    async fn channel_message_replies(
        &self,
        _team: &str,
        _channel: &str,
        _message_id: &str,
    ) -> Result<MessagePage, GraphError> {
        let mut bot_ping = reply("r3", "ada", "<at>DeskBot</at> take a look");
        bot_ping.mentions = vec![MessageMention {
            id: 0,
            mention_text: "DeskBot".to_string(),
            mentioned: Mentioned {
                user: None,
                application: Some(MentionedApplication {
                    id: BOT_ID.to_string(),
                    display_name: "DeskBot".to_string(),
                    application_identity_type: APPLICATION_IDENTITY_TYPE_BOT.to_string(),
                }),
            },
        }];
        Ok(MessagePage {
            next_link: Some("https://graph.example.com/replies?page=2".to_string()),
            value: vec![reply("r5", "bob", "fifth"), reply("r4", "ada", "fourth"), bot_ping],
        })
    }

    async fn next_page(&self, next_link: &str) -> Result<MessagePage, GraphError> {
        assert!(next_link.contains("page=2"));
        Ok(MessagePage {
            next_link: None,
            value: vec![reply("r2", "bob", "   "), reply("r1", "ada", "first")],
        })
    }
}

struct PagingGraphFactory;

impl GraphApiFactory for PagingGraphFactory {
    fn for_token(&self, _token: &str) -> Arc<dyn GraphApi> {
        Arc::new(PagingGraph)
    }
}

#[derive(Default)]
struct RecordingTicketing {
    created: Mutex<Vec<String>>,
    comments: Mutex<Vec<NewComment>>,
}

#[async_trait]
impl TicketingApi for RecordingTicketing {
    async fn queues(&self) -> Result<PagedCollection<Hyperlink>, TicketingError> {
        Ok(PagedCollection::default())
    }

    async fn queue(&self, queue_id: &str) -> Result<Queue, TicketingError> {
        Ok(Queue {
            id: queue_id.to_string(),
            name: "General".to_string(),
            hyperlinks: Vec::new(),
        })
    }

    async fn create_ticket(&self, _queue: &Queue, subject: &str) -> Result<Ticket, TicketingError> {
        self.created.lock().unwrap().push(subject.to_string());
        Ok(Ticket {
            id: "416115".to_string(),
            subject: subject.to_string(),
            status: None,
            queue: None,
            hyperlinks: Vec::new(),
        })
    }

    async fn ticket(&self, _link: &Hyperlink) -> Result<Ticket, TicketingError> {
        unimplemented!("not used in this test")
    }

    async fn update_ticket(&self, _ticket: &Ticket) -> Result<(), TicketingError> {
        Ok(())
    }

    async fn add_comment(
        &self,
        _ticket: &Ticket,
        comment: NewComment,
    ) -> Result<(), TicketingError> {
        self.comments.lock().unwrap().push(comment);
        Ok(())
    }

    async fn ticket_history(
        &self,
        _ticket: &Ticket,
    ) -> Result<PagedCollection<Hyperlink>, TicketingError> {
        Ok(PagedCollection::default())
    }

    async fn next_page(
        &self,
        _page: &PagedCollection<Hyperlink>,
    ) -> Result<Option<PagedCollection<Hyperlink>>, TicketingError> {
        Ok(None)
    }
}

fn config() -> Arc<DeskConfig> {
    Arc::new(DeskConfig {
        bot_id: BOT_ID.to_string(),
        bot_password: "pw".to_string(),
        bot_connection_name: "conn".to_string(),
        bot_domain: String::new(),
        tenant_id: String::new(),
        graph_base_url: "https://graph.example.com/beta".to_string(),
        ticketing_endpoint: "https://tickets.example.com".to_string(),
        ticketing_username: "svc".to_string(),
        ticketing_password: "secret".to_string(),
    })
}

fn create_ticket_submit() -> Value {
    json!({
        "team": { "id": "team-1", "name": "Support", "aadGroupId": "aad-1" },
        "channel": { "id": "chan-1", "name": "Helpdesk" },
        "conversation": { "id": "1700000000", "message": "Printer broken" },
        "from": { "id": "user-1", "name": "Ada" },
        "token": "tok",
        "createdUtc": "Mon, 01 Jan 2026 00:00:00 GMT",
        "ticketQueueChoiceSet": "1",
        "ticketDescriptionInput": "It is broken",
    })
}

fn card_submit_turn(channel: &Arc<RecordingChannel>) -> TurnContext {
    let activity = Activity {
        activity_type: ActivityType::Invoke,
        id: Some("act-1".to_string()),
        name: Some(ADAPTIVE_CARD_ACTION_NAME.to_string()),
        text: None,
        value: None,
        channel_id: "msteams".to_string(),
        conversation: ConversationRef {
            id: "conv-1".to_string(),
            conversation_type: Some("channel".to_string()),
            tenant_id: None,
        },
        from: Account {
            id: "user-1".to_string(),
            name: "Ada".to_string(),
            aad_object_id: None,
        },
        recipient: None,
        reply_to_id: Some("ticket-card".to_string()),
        service_url: None,
    };
    TurnContext::new(activity, Arc::clone(channel) as Arc<dyn ConversationApi>)
}

#[tokio::test]
async fn card_submit_creates_one_ticket_and_replays_the_paged_thread() {
    let ticketing = Arc::new(RecordingTicketing::default());
    let dialog = Arc::new(AuthDialog::new(
        Arc::new(MemoryStateStore::new()),
        Arc::new(StubPrompt),
        Arc::new(PagingGraphFactory),
        DialogSettings::default(),
    ));
    let registry = build_registry(
        dialog,
        config(),
        Arc::clone(&ticketing) as Arc<dyn TicketingApi>,
        Arc::new(PagingGraphFactory),
    );

    let channel = Arc::new(RecordingChannel::default());
    let ctx = card_submit_turn(&channel);
    let outcome = registry
        .dispatch_action(&ctx, ACTION_CREATE_TICKET, Some(create_ticket_submit()))
        .await;
    assert_eq!(outcome, DispatchOutcome::Handled);

    // The card is retired before the pipeline runs.
    assert_eq!(*channel.updated.lock().unwrap(), vec!["ticket-card".to_string()]);

    // Exactly one ticket, subject from the thread root.
    assert_eq!(*ticketing.created.lock().unwrap(), vec!["Printer broken".to_string()]);

    // Chronological replay: description seed, root, then the replies
    // oldest to newest. The blank reply and the bot-only mention are
    // not posted.
    let comments = ticketing.comments.lock().unwrap();
    let order: Vec<_> = comments.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(order, vec!["It is broken", "root body", "first", "fourth", "fifth"]);

    // And the confirmation message links the new ticket.
    let sent = channel.sent.lock().unwrap();
    let text = sent.last().and_then(|a| a.text.as_deref()).unwrap();
    assert!(text.contains("416115"));
}
