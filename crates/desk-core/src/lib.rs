//! Shared activity model, transport seam, configuration, and card
//! rendering for the deskbot workspace.

mod activity;
mod cards;
mod config;
mod transport;

pub use activity::{
    Account, Activity, ActivityType, CardActionValue, ConversationRef, SignInStateQuery,
    TokenResponse, ADAPTIVE_CARD_ACTION_NAME, SIGNIN_TOKEN_EXCHANGE_NAME,
    SIGNIN_VERIFY_STATE_NAME, TOKEN_RESPONSE_EVENT_NAME,
};
pub use cards::{render_card, CardError, CREATE_TICKET_CARD_TEMPLATE, TICKET_CARD_TEMPLATE};
pub use config::DeskConfig;
pub use transport::{
    CardAttachment, ConversationApi, OutboundActivity, TransportError, TurnContext,
    ADAPTIVE_CARD_CONTENT_TYPE,
};
