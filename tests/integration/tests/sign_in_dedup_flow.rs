//! End-to-end sign-in flow: command, credential prompt, confirmation
//! dedup, and the single dispatched ticket card.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use desk_core::{
    Account, Activity, ActivityType, ConversationApi, ConversationRef, OutboundActivity,
    TransportError, TurnContext, SIGNIN_TOKEN_EXCHANGE_NAME,
};
use desk_dialog::{
    AuthDialog, CredentialPrompt, DialogOptions, DialogSettings, GraphApiFactory, QueueChoice,
    TurnStatus,
};
use desk_graph::{ChannelInfo, GraphApi, GraphError, MessagePage, ThreadMessage, UserProfile};
use desk_store::MemoryStateStore;

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<OutboundActivity>>,
}

impl RecordingChannel {
    fn cards_sent(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|activity| !activity.attachments.is_empty())
            .count()
    }
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
        _activity_id: &str,
        _content: OutboundActivity,
    ) -> Result<(), TransportError> {
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
    async fn request_credential(&self, ctx: &TurnContext) -> anyhow::Result<()> {
        ctx.send_text("sign in please").await?;
        Ok(())
    }
}

struct StubGraph;

#[async_trait]
impl GraphApi for StubGraph {
    async fn me(&self) -> Result<UserProfile, GraphError> {
        Ok(UserProfile {
            id: "user-1".to_string(),
            display_name: "Ada".to_string(),
            mail: Some("ada@example.com".to_string()),
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
        _message_id: &str,
    ) -> Result<ThreadMessage, GraphError> {
        Ok(ThreadMessage::default())
    }

    async fn channel_message_replies(
        &self,
        _team: &str,
        _channel: &str,
        _message_id: &str,
    ) -> Result<MessagePage, GraphError> {
        Ok(MessagePage::default())
    }

    async fn next_page(&self, _next_link: &str) -> Result<MessagePage, GraphError> {
        Ok(MessagePage::default())
    }
}

struct StubGraphFactory;

impl GraphApiFactory for StubGraphFactory {
    fn for_token(&self, _token: &str) -> Arc<dyn GraphApi> {
        Arc::new(StubGraph)
    }
}

fn dialog() -> Arc<AuthDialog> {
    Arc::new(AuthDialog::new(
        Arc::new(MemoryStateStore::new()),
        Arc::new(StubPrompt),
        Arc::new(StubGraphFactory),
        DialogSettings {
            queue_choices: vec![QueueChoice {
                title: "General".to_string(),
                value: "1".to_string(),
            }],
            ..DialogSettings::default()
        },
    ))
}

fn base_activity(activity_type: ActivityType) -> Activity {
    Activity {
        activity_type,
        id: Some("act-1".to_string()),
        name: None,
        text: None,
        value: None,
        channel_id: "msteams".to_string(),
        conversation: ConversationRef {
            id: "conv-1".to_string(),
            conversation_type: Some("personal".to_string()),
            tenant_id: None,
        },
        from: Account {
            id: "user-1".to_string(),
            name: "Ada".to_string(),
            aad_object_id: None,
        },
        recipient: None,
        reply_to_id: None,
        service_url: None,
    }
}

fn token_exchange(event_id: &str) -> Activity {
    let mut activity = base_activity(ActivityType::Invoke);
    activity.name = Some(SIGNIN_TOKEN_EXCHANGE_NAME.to_string());
    activity.value = Some(json!({ "id": event_id, "token": "tok" }));
    activity
}

fn turn(channel: &Arc<RecordingChannel>, activity: Activity) -> TurnContext {
    TurnContext::new(activity, Arc::clone(channel) as Arc<dyn ConversationApi>)
}

#[tokio::test]
async fn command_prompts_then_one_confirmation_yields_one_card() {
    let dialog = dialog();
    let channel = Arc::new(RecordingChannel::default());

    let command = turn(&channel, base_activity(ActivityType::Message));
    let status = dialog
        .run(&command, Some(DialogOptions::for_command("new ticket", None)))
        .await
        .expect("command turn");
    assert_eq!(status, TurnStatus::Waiting);
    assert_eq!(
        channel.sent.lock().unwrap()[0].text.as_deref(),
        Some("sign in please")
    );

    let exchange = turn(&channel, token_exchange("ex-1"));
    let status = dialog.continue_dialog(&exchange).await.expect("exchange");
    assert_eq!(status, TurnStatus::Complete);
    assert_eq!(channel.cards_sent(), 1);
}

#[tokio::test]
async fn concurrent_duplicate_confirmations_dispatch_exactly_once() {
    let dialog = dialog();
    let channel = Arc::new(RecordingChannel::default());

    let command = turn(&channel, base_activity(ActivityType::Message));
    dialog
        .run(&command, Some(DialogOptions::for_command("new ticket", None)))
        .await
        .expect("command turn");

    // The transport can deliver the same confirmation to every signed-in
    // client. Race two copies of the same event through the dialog.
    let first = turn(&channel, token_exchange("ex-1"));
    let second = turn(&channel, token_exchange("ex-1"));
    let (a, b) = tokio::join!(dialog.continue_dialog(&first), dialog.continue_dialog(&second));
    a.expect("first delivery");
    b.expect("second delivery");
    assert_eq!(channel.cards_sent(), 1);

    // A late replay of the same event finds no session and sends nothing.
    let replay = turn(&channel, token_exchange("ex-1"));
    let status = dialog.continue_dialog(&replay).await.expect("replay");
    assert_eq!(status, TurnStatus::Complete);
    assert_eq!(channel.cards_sent(), 1);
}

#[tokio::test]
async fn distinct_confirmation_events_are_not_cross_deduplicated() {
    let dialog = dialog();
    let channel = Arc::new(RecordingChannel::default());

    let command = turn(&channel, base_activity(ActivityType::Message));
    dialog
        .run(&command, Some(DialogOptions::for_command("new ticket", None)))
        .await
        .expect("command turn");
    let exchange = turn(&channel, token_exchange("ex-1"));
    dialog.continue_dialog(&exchange).await.expect("exchange");

    // A second full flow with a fresh event id dispatches again.
    let command = turn(&channel, base_activity(ActivityType::Message));
    dialog
        .run(&command, Some(DialogOptions::for_command("new ticket", None)))
        .await
        .expect("second command turn");
    let exchange = turn(&channel, token_exchange("ex-2"));
    dialog.continue_dialog(&exchange).await.expect("exchange");
    assert_eq!(channel.cards_sent(), 2);
}
