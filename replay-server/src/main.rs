use clap::Parser;
use replay_server::api;
use replay_server::api::state::AppState;
use replay_server::cache::FrameCache;
use replay_server::providers::FixtureProvider;
use replay_server::session::load::LoadOptions;
use replay_server::session::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "replay-server")]
#[command(about = "Telemetry replay server - turns session telemetry into frames and streams them to browser clients")]
struct Args {
    /// HTTP/WebSocket server port
    #[arg(long, default_value = "3002")]
    port: u16,

    /// Directory holding raw session fixtures ({year}_{round}_{type}.json)
    #[arg(long, default_value = "session-data")]
    data_dir: String,

    /// Directory for processed-session cache files
    #[arg(long, default_value = "replay-cache")]
    cache_dir: String,

    /// Wall-clock bound on one session load, seconds
    #[arg(long, default_value = "300")]
    load_timeout_secs: u64,

    /// Frame sequences up to this size are pre-encoded at load time
    #[arg(long, default_value = "50000")]
    preencode_limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let state = AppState::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(FixtureProvider::new(&args.data_dir)),
        Arc::new(FrameCache::new(&args.cache_dir)),
        LoadOptions {
            timeout: Duration::from_secs(args.load_timeout_secs),
            preencode_limit: args.preencode_limit,
        },
    );

    let app = api::router(state);
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;

    info!(
        port = %args.port,
        data_dir = %args.data_dir,
        cache_dir = %args.cache_dir,
        "Server listening"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
