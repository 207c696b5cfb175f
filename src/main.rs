use chat_relay::auth::CredentialCache;
use chat_relay::models::ModelCatalog;
use chat_relay::{build_router, AppState, RelayConfig, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chat-relay",
    about = "OpenAI-compatible relay for an incompatible upstream chat backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log file path
    #[arg(long, default_value = "chat-relay.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = RelayConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }

    let logger = SharedLogger::new(&cli.log_file)?;
    let client = config.http_client()?;

    info!("chat-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:  {}", config.base_url());
    info!("  Port:      {}", config.port);
    info!(
        "  Retry:     {} attempts, {}ms initial delay, x{} backoff",
        config.retry.max_attempts, config.retry.initial_delay_ms, config.retry.backoff_factor
    );
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting chat-relay upstream={} port={}",
            config.base_url(),
            config.port
        ),
    );

    let state = Arc::new(AppState {
        credentials: Arc::new(CredentialCache::new(&config, client.clone())),
        catalog: Arc::new(ModelCatalog::new(&config, client.clone())),
        config: config.clone(),
        client,
        logger: logger.clone(),
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
