use clap::Parser;
use client::game::ClientGame;
use client::input::{Input, InputParser, HELP};
use client::network::{ClientConfig, ConnectionManager};
use client::rendering::Renderer;
use log::{info, warn};
use shared::PlayerId;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8334/ws")]
    server: String,

    /// Player id this console buzzes for
    #[arg(short = 'p', long)]
    player: Option<u32>,

    /// Heartbeat timeout in milliseconds
    #[arg(long, default_value_t = shared::HEARTBEAT_TIMEOUT_MS)]
    heartbeat_timeout_ms: u64,

    /// Print the activity catalog with every update
    #[arg(long)]
    catalog: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let player_id = args.player.map(PlayerId);

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let config = ClientConfig {
        url: args.server,
        heartbeat_timeout: Duration::from_millis(args.heartbeat_timeout_ms),
        ..ClientConfig::default()
    };
    let manager = ConnectionManager::new(config);
    let mut events = manager.subscribe();
    let handle = manager.start();

    let parser = InputParser::new(player_id);
    let renderer = Renderer {
        show_catalog: args.catalog,
    };
    let mut game = ClientGame::new(player_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", HELP);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if game.apply(event) {
                        println!("{}", renderer.render(&game));
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parser.parse(&line) {
                    Ok(Input::Send(command)) => {
                        if !manager.send_command(&command).await? {
                            println!("Not connected, {} dropped", command.name());
                        }
                    }
                    Ok(Input::Help) => println!("{}", HELP),
                    Ok(Input::Quit) => break,
                    Ok(Input::Empty) => {}
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    manager.close();
    handle.await?;
    info!("Client shut down");
    Ok(())
}
