//! deskbot entrypoint: wires config, state, clients, and the ingress.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use desk_commands::build_registry;
use desk_core::DeskConfig;
use desk_dialog::{AuthDialog, DialogSettings, OAuthCardPrompt, QueueChoice};
use desk_runtime::{ConnectorChannelFactory, DeskBot, LiveGraphFactory};
use desk_store::{MemoryStateStore, SqliteStateStore, StateStore};
use desk_ticketing::{RtClient, TicketingApi};

const DEFAULT_SERVICE_URL: &str = "https://smba.trafficmanager.net/emea/";

#[derive(Debug, Parser)]
#[command(name = "deskbot", about = "Conversational helpdesk bot")]
struct Cli {
    /// Address the ingress server binds.
    #[arg(long, env = "DESKBOT_BIND", default_value = "0.0.0.0:3978")]
    bind: SocketAddr,
    /// SQLite file for dialog and dedup state. Omit for in-memory state.
    #[arg(long, env = "DESKBOT_STATE_PATH")]
    state_path: Option<PathBuf>,
}

/// Resolves every ticket queue once at startup. Queue membership changes
/// rarely enough that a restart picking them up is acceptable.
async fn load_queue_choices(ticketing: &dyn TicketingApi) -> anyhow::Result<Vec<QueueChoice>> {
    let mut choices = Vec::new();
    let mut page = ticketing
        .queues()
        .await
        .context("failed to list ticket queues")?;
    loop {
        for link in &page.items {
            if let (Some(id), Some(name)) = (&link.id, &link.name) {
                choices.push(QueueChoice {
                    title: name.clone(),
                    value: id.clone(),
                });
            }
        }
        match ticketing
            .next_page(&page)
            .await
            .context("failed to page ticket queues")?
        {
            Some(next) => page = next,
            None => break,
        }
    }
    Ok(choices)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    let config = Arc::new(DeskConfig::from_env()?);

    let store: Arc<dyn StateStore> = match &cli.state_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using sqlite state store");
            Arc::new(SqliteStateStore::open(path)?)
        }
        None => {
            tracing::warn!("no state path configured, dialog state will not survive restarts");
            Arc::new(MemoryStateStore::new())
        }
    };

    let ticketing: Arc<dyn TicketingApi> = Arc::new(RtClient::new(
        &config.ticketing_endpoint,
        &config.ticketing_username,
        &config.ticketing_password,
    ));
    let queue_choices = load_queue_choices(ticketing.as_ref()).await?;
    tracing::info!(count = queue_choices.len(), "loaded ticket queues");

    let graph_factory = Arc::new(LiveGraphFactory::new(&config.graph_base_url));
    let prompt = Arc::new(OAuthCardPrompt::new(&config.bot_connection_name));
    let dialog = Arc::new(AuthDialog::new(
        store,
        prompt,
        Arc::clone(&graph_factory) as Arc<dyn desk_dialog::GraphApiFactory>,
        DialogSettings {
            queue_choices,
            ..DialogSettings::default()
        },
    ));

    let registry = Arc::new(build_registry(
        Arc::clone(&dialog),
        Arc::clone(&config),
        ticketing,
        graph_factory,
    ));
    let bot = Arc::new(DeskBot::new(registry, dialog));
    let channels = Arc::new(ConnectorChannelFactory::new(&config, DEFAULT_SERVICE_URL));

    desk_runtime::run_server(
        cli.bind,
        desk_runtime::AppState {
            bot,
            channels,
        },
    )
    .await
}
