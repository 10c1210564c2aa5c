//! Ticketing collaborator: hyperlink-driven REST client and the
//! thread-to-comments replay pipeline.

mod client;
mod pipeline;

pub use client::{
    Hyperlink, NewComment, PagedCollection, Queue, RtClient, Ticket, TicketingApi, TicketingError,
    HYPERLINK_REF_COMMENT, HYPERLINK_REF_CREATE, HYPERLINK_REF_HISTORY, HYPERLINK_REF_SELF,
};
pub use pipeline::{create_ticket_from_thread, replay_thread, ReplaySummary};
