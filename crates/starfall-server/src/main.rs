//! Starfall server
//!
//! - `starfall-server serve` - run the room host, reading client envelopes as JSON lines on stdin
//! - `starfall-server simulate` - headless bot games

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use starfall_core::{run_selfplay, SelfPlayConfig};
use starfall_protocol::wire::{from_json, state_hash, to_json};
use starfall_protocol::{ClientId, MapSize};
use starfall_server::{ChannelOutbox, ClientMessage, RoomStore, ServerConfig, ServerMessage};

#[derive(Parser)]
#[command(name = "starfall-server")]
#[command(about = "Starfall room host", version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop and a JSON-lines session driver on stdin/stdout
    Serve,

    /// Play bot-vs-bot games and print a summary per game
    Simulate {
        #[arg(long, default_value_t = 2)]
        players: u8,

        #[arg(long, default_value = "small", value_parser = parse_map_size)]
        map_size: MapSize,

        #[arg(long, default_value_t = 20)]
        turns: u32,

        #[arg(long, default_value = "selfplay")]
        seed: String,

        /// Number of games; game `i` uses seed `{seed}-{i}` when more than one
        #[arg(long, default_value_t = 1)]
        games: u32,
    },
}

/// One stdin line: a message from a numbered client.
#[derive(Debug, Deserialize)]
struct Inbound {
    client: ClientId,
    message: ClientMessage,
}

/// One stdout line.
#[derive(Debug, Serialize)]
struct Outbound<'a> {
    client: ClientId,
    message: &'a ServerMessage,
}

#[derive(Debug, Serialize)]
struct GameSummary {
    seed: String,
    winner: Option<u8>,
    turns_played: u32,
    total_battles: u32,
    territory: Vec<(u8, u32)>,
    state_hash: u64,
}

fn parse_map_size(value: &str) -> Result<MapSize, String> {
    match value.to_ascii_lowercase().as_str() {
        "small" => Ok(MapSize::Small),
        "medium" => Ok(MapSize::Medium),
        "large" => Ok(MapSize::Large),
        "massive" => Ok(MapSize::Massive),
        other => Err(format!("unknown map size '{other}' (small, medium, large, massive)")),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("starfall_server=debug,starfall_core=debug")
    } else {
        EnvFilter::new("starfall_server=info,starfall_core=info")
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Simulate {
            players,
            map_size,
            turns,
            seed,
            games,
        } => simulate(players, map_size, turns, &seed, games),
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let tick_every = Duration::from_millis(config.tick_interval_ms.max(1));
    let (outbox, mut outgoing) = ChannelOutbox::new();
    let store = RoomStore::new(config, Box::new(outbox));

    info!("Starfall server started (tick every {:?})", tick_every);

    tokio::spawn(async move {
        while let Some((client, message)) = outgoing.recv().await {
            emit(client, &message);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(tick_every);
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fired = store.tick(now_ms());
                if fired > 0 {
                    debug!("Fired {} timers", fired);
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match from_json::<Inbound>(&line) {
                        Ok(inbound) => {
                            let reply = store.handle_message(inbound.client, inbound.message, now_ms());
                            emit(inbound.client, &reply);
                        }
                        Err(e) => warn!("Ignoring malformed line: {}", e),
                    },
                    None => {
                        info!("stdin closed; timers keep running until Ctrl-C");
                        stdin_open = false;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down ({} rooms live)", store.room_count());
                return Ok(());
            }
        }
    }
}

fn emit(client: ClientId, message: &ServerMessage) {
    match to_json(&Outbound { client, message }) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Failed to encode message for client {}: {}", client, e),
    }
}

fn simulate(players: u8, map_size: MapSize, turns: u32, seed: &str, games: u32) -> Result<()> {
    for game in 0..games.max(1) {
        let seed = if games > 1 {
            format!("{seed}-{game}")
        } else {
            seed.to_string()
        };
        let config = SelfPlayConfig {
            players,
            map_size,
            max_turns: turns,
            seed: seed.clone(),
        };
        let result = run_selfplay(&config).with_context(|| format!("Self-play failed for seed {seed}"))?;

        let summary = GameSummary {
            seed,
            winner: result.winner.map(|p| p.0),
            turns_played: result.turns_played,
            total_battles: result.total_battles,
            territory: result.territory.iter().map(|(p, n)| (p.0, *n)).collect(),
            state_hash: state_hash(&result.final_state)?,
        };
        println!("{}", to_json(&summary)?);
    }
    Ok(())
}
