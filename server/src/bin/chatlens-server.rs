use chatlens_core::client::{CompletionBackend, CompletionClient};
use chatlens_server::config::ServerConfig;
use chatlens_server::http_server::{self, AppState};
use chatlens_server::session::{InMemorySessionStore, SessionStoreRef};
use chatlens_server::storage::{ObjectSink, S3Sink};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chatlens-server", about = "Chat-log analysis web service")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP server address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Directory uploads are written to
    #[arg(short, long)]
    uploads_dir: Option<PathBuf>,

    /// Completion model to use
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Completion API key
    #[arg(short = 'k', long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Skip copying uploads to object storage even when configured
    #[arg(long)]
    no_storage: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatlens_server=debug")),
        )
        .init();

    info!("Starting chatlens server");

    let args = Args::parse();

    let mut config = match &args.config {
        Some(config_path) => ServerConfig::load_from_file(config_path).map_err(|e| {
            error!("Failed to load configuration from {}: {}", config_path.display(), e);
            anyhow::anyhow!("Configuration error: {}", e)
        })?,
        None => ServerConfig::load_from_default().map_err(|e| {
            error!("Failed to load configuration: {}", e);
            anyhow::anyhow!("Configuration error: {}", e)
        })?,
    };
    config.apply_env()?;

    // Update config from CLI args
    if let Some(addr) = args.http_addr {
        config.http_addr = addr;
    }
    if let Some(dir) = args.uploads_dir {
        config.uploads_dir = dir;
    }
    if let Some(model) = args.model {
        config.completion.model_name = Some(model);
    }
    if let Some(api_key) = args.api_key {
        config.completion.api_key = Some(api_key);
    }

    let client = CompletionClient::new(&config.completion).map_err(|e| {
        error!(error = %e, "Failed to initialize completion client");
        anyhow::anyhow!("Failed to initialize completion client: {}", e)
    })?;
    info!(model = client.model_name(), "Initialized completion client");

    let object_sink: Option<Arc<dyn ObjectSink>> = if args.no_storage {
        None
    } else if config.storage.is_complete() {
        let sink = S3Sink::from_config(&config.storage).await?;
        info!(bucket = ?config.storage.bucket, "Uploads will be copied to object storage");
        Some(Arc::new(sink) as Arc<dyn ObjectSink>)
    } else {
        warn!("Object storage not configured; uploads stay on local disk only");
        None
    };

    let sessions: SessionStoreRef = Arc::new(InMemorySessionStore::new());
    http_server::spawn_session_sweeper(sessions.clone(), Duration::from_secs(60));

    let addr = config.http_addr;
    let state = AppState::new(config, Arc::new(client), object_sink, sessions);
    http_server::run_server(state, addr).await?;

    info!("chatlens server shutting down");
    Ok(())
}
