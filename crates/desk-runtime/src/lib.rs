//! Bot runtime: routes inbound activities through the registry and the
//! auth dialog, and hosts the transport ingress.

mod bot;
mod connector;
mod server;

pub use bot::DeskBot;
pub use connector::{ChannelFactory, ConnectorChannelFactory, HttpConnectorChannel, LiveGraphFactory};
pub use server::{run_server, AppState};
