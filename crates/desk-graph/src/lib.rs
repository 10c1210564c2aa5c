//! Directory/graph collaborator: user profile lookup, paginated thread
//! fetch, and chronological thread linearization.

mod client;
mod thread;

pub use client::{ChannelInfo, GraphApi, GraphClient, GraphError, UserProfile};
pub use thread::{
    linearize_thread, reconstruct_thread, thread_id_from_conversation_id, MessageAttachment,
    MessageBody, MessageFrom, MessageMention, MessagePage, MessageUser, Mentioned,
    MentionedApplication, ThreadMessage, APPLICATION_IDENTITY_TYPE_BOT,
};
