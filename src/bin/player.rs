// ABOUTME: Command-line player
// ABOUTME: Joins a stream server and plays synchronized audio on the default output device

use clap::Parser;
use snapsync::audio::output::CpalBackend;
use snapsync::session::{FileIdentityStore, IdentityStore};
use snapsync::{ClientConfig, ConnectionState, SessionController};
use std::path::PathBuf;
use std::sync::Arc;

/// Synchronized stream player
#[derive(Parser, Debug)]
#[command(name = "player")]
#[command(about = "Connect to a stream server and play audio in sync", long_about = None)]
struct Args {
    /// WebSocket URL of the stream endpoint
    #[arg(short, long, env = "SNAPSYNC_SERVER")]
    server: Option<String>,

    /// Client name
    #[arg(short, long)]
    name: Option<String>,

    /// Instance number when running several players on one host
    #[arg(short, long)]
    instance: Option<u32>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial volume percent, applied once playback starts
    #[arg(long)]
    volume: Option<u8>,

    /// Start muted
    #[arg(long)]
    muted: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(server) = args.server {
        config.server_url = server;
    }
    if let Some(name) = args.name {
        config.client_name = name;
    }
    if let Some(instance) = args.instance {
        config.instance = instance;
    }

    let identity: Arc<dyn IdentityStore> = match &config.identity_path {
        Some(path) => Arc::new(FileIdentityStore::new(path)),
        None => Arc::new(FileIdentityStore::in_data_dir()?),
    };

    println!("Connecting to {}...", config.server_url);
    let mut controller = SessionController::new(config, identity, Arc::new(CpalBackend));
    println!("Client id: {}", controller.client_id()?);
    controller.start()?;

    let mut state = controller.subscribe();
    let initial_volume = args.volume.map(|v| (v, args.muted)).or(args.muted.then_some((100, true)));

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("State: {:?}", current);
                match current {
                    ConnectionState::Active => {
                        if let Some((percent, muted)) = initial_volume {
                            controller.set_volume(percent, muted);
                        }
                    }
                    ConnectionState::Disconnected => {
                        if let Some(error) = controller.fatal_error() {
                            eprintln!("Playback failed: {}", error);
                        }
                        break;
                    }
                    ConnectionState::Connecting => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping...");
                controller.stop();
                break;
            }
        }
    }

    Ok(())
}
