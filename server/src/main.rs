use clap::Parser;
use log::{error, info};
use server::game::GameEngine;
use server::network::{Server, ServerConfig};
use server::settings::{seed_players, MediaLibrary};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Folder holding game-settings.yaml, the activities file and the media
    #[clap(short, long, env = "MEDIA_HOME")]
    media_home: PathBuf,
    /// URL the media folder is served under
    #[clap(long)]
    media_url: Option<String>,
    /// Heartbeat interval in milliseconds
    #[clap(
        long,
        default_value_t = shared::HEARTBEAT_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    heartbeat_ms: u64,
}

/// Main-method of the application.
/// Loads the settings and activities from the media home, then runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("-- TriviaKit server --");
    info!("Media root directory is at {}", args.media_home.display());

    let media_url = args
        .media_url
        .unwrap_or_else(|| format!("http://{}:{}/media/", args.host, args.port));
    let library = MediaLibrary::new(&args.media_home, media_url);

    let settings = library.load_settings()?;
    let activities = library.load_activities(&settings.game.activities)?;

    let mut engine = GameEngine::new(Arc::new(activities));
    seed_players(&mut engine, &settings, &library);

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        heartbeat_interval: Duration::from_millis(args.heartbeat_ms),
    };
    let server = Server::bind(config, engine).await?;
    info!("WebSocket endpoint at ws://{}{}", server.local_addr()?, shared::WS_PATH);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
