//! Irori relay hub.
//!
//! Serves the host endpoint and the guest endpoint, relays chat between the
//! connected clients and drives the AI participant.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin irori-server
//! cargo run --bin irori-server -- --host-port 8181 --guest-port 8182 --data-dir public
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use irori_server::{
    domain::{ApiRecord, ChatRepository, ConfigRepository, FileRepository, MessagePusher},
    infrastructure::{
        files::FsFileRepository, inference::HttpCompletionProvider,
        message_pusher::WebSocketMessagePusher,
        repository::{InMemoryChatRepository, JsonConfigRepository},
        secrets::load_secrets,
    },
    ui::Server,
    usecase::{
        AiResponseUseCase, Broadcaster, ConnectParticipantUseCase, ConnectionRegistry,
        DisconnectParticipantUseCase, Router, RouterDeps, SessionState, StreamAggregator,
        SubmitKeyUseCase,
    },
};
use irori_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "irori-server")]
#[command(about = "Relay hub for a multiplayer AI chat room", long_about = None)]
struct Args {
    /// Host address to bind both endpoints to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port of the endpoint that grants the host role
    #[arg(long, default_value = "8181")]
    host_port: u16,

    /// Port of the endpoint that grants the guest role
    #[arg(long, default_value = "8182")]
    guest_port: u16,

    /// Directory holding characters, presets and instruct formats
    #[arg(long, default_value = "public")]
    data_dir: PathBuf,

    /// Session configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Chat store snapshot (users, roles, chats and APIs)
    #[arg(long, default_value = "store.json")]
    store: PathBuf,

    /// Secrets file with the host, mod and API keys
    #[arg(long, default_value = "secrets.json")]
    secrets: PathBuf,

    /// Default log level, overridden by RUST_LOG
    #[arg(long, default_value = "debug")]
    log_level: String,

    /// Timeout for a single inference request in seconds
    #[arg(long, default_value = "120")]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    if let Err(e) = run(args).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize dependencies in order:
    // 1. Secrets
    // 2. Repositories and session configuration
    // 3. MessagePusher, registry and broadcaster
    // 4. Inference provider
    // 5. UseCases
    // 6. Server

    // 1. Load or generate the access keys
    let secrets = load_secrets(&args.secrets).await?;
    tracing::info!("Host key: {}", secrets.keys.host());
    tracing::info!("Mod key: {}", secrets.keys.moderator());

    // 2. Create Repositories
    let files = Arc::new(FsFileRepository::new(&args.data_dir));
    files.ensure_layout().await?;
    let files: Arc<dyn FileRepository> = files;

    let repository: Arc<dyn ChatRepository> =
        Arc::new(InMemoryChatRepository::open(&args.store).await?);
    if let Some(api_key) = secrets.api_key
        && let Some(mut default_api) = repository.get_api(ApiRecord::DEFAULT_NAME).await?
    {
        default_api.key = api_key;
        repository.upsert_api(default_api).await?;
        tracing::info!("Applied the API key from the secrets file to the Default API");
    }

    let config_store: Arc<dyn ConfigRepository> =
        Arc::new(JsonConfigRepository::new(&args.config));
    let session = Arc::new(SessionState::load(config_store).await?);
    session.hydrate_catalog_values(files.as_ref()).await;

    // 3. Create MessagePusher (WebSocket implementation)
    let message_pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());
    let registry = Arc::new(ConnectionRegistry::new(message_pusher.clone()));
    let broadcaster = Arc::new(Broadcaster::new(registry.clone(), message_pusher));

    // 4. Create the inference provider
    let provider = Arc::new(HttpCompletionProvider::new(Duration::from_secs(
        args.request_timeout_secs,
    ))?);

    // 5. Create UseCases
    let aggregator = Arc::new(StreamAggregator::new(
        broadcaster.clone(),
        repository.clone(),
    ));
    let ai_response = Arc::new(AiResponseUseCase::new(
        session.clone(),
        repository.clone(),
        provider.clone(),
        broadcaster.clone(),
        aggregator,
    ));
    let submit_key = Arc::new(SubmitKeyUseCase::new(
        secrets.keys,
        repository.clone(),
        registry.clone(),
        broadcaster.clone(),
    ));
    let connect_participant_usecase = Arc::new(ConnectParticipantUseCase::new(
        repository.clone(),
        files.clone(),
        session.clone(),
        registry.clone(),
        broadcaster.clone(),
    ));
    let disconnect_participant_usecase = Arc::new(DisconnectParticipantUseCase::new(
        registry.clone(),
        broadcaster.clone(),
    ));
    let router = Arc::new(Router::new(RouterDeps {
        session,
        repository,
        files,
        provider,
        registry: registry.clone(),
        broadcaster: broadcaster.clone(),
        ai_response,
        submit_key,
    }));

    // 6. Create and run the server
    let server = Server::new(
        connect_participant_usecase,
        disconnect_participant_usecase,
        router,
        registry,
        broadcaster,
    );
    server
        .run(&args.host, args.host_port, args.guest_port)
        .await
}
