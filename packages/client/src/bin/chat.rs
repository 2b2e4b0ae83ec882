//! Interactive chat client.
//!
//! Joins a room over STOMP, prints its history, live messages and roster, and
//! sends what you type. Reconnects every 5 seconds (configurable) after a
//! connection loss and re-joins automatically.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin nagare-chat -- --user alice --room general
//! NAGARE_WS_URL=ws://chat.example.com/ws/websocket cargo run --bin nagare-chat -- -u bob
//! ```

use std::time::Duration;

use clap::Parser;

use nagare_client::config::{ConnectionConfig, DEFAULT_API_URL, DEFAULT_WS_URL, HeartbeatConfig};
use nagare_client::runner::{ChatOptions, run_chat};
use nagare_client::sync::{DedupPolicy, ReconnectPolicy};
use nagare_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "nagare-chat")]
#[command(about = "Chat room client with live presence and automatic reconnect", long_about = None)]
struct Args {
    /// Name shown to other participants
    #[arg(short = 'u', long, env = "NAGARE_USER")]
    user: String,

    /// Room to join
    #[arg(short = 'r', long, env = "NAGARE_ROOM", default_value = "general")]
    room: String,

    /// STOMP WebSocket endpoint
    #[arg(long, env = "NAGARE_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,

    /// REST API base used for the history baseline
    #[arg(long, env = "NAGARE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Delay before each reconnect attempt
    #[arg(long, env = "NAGARE_RECONNECT_DELAY_MS", default_value_t = 5000)]
    reconnect_delay_ms: u64,

    /// Stay disconnected after a connection loss
    #[arg(long)]
    no_reconnect: bool,

    /// Hide live messages already listed in the history baseline
    #[arg(long)]
    dedup_by_id: bool,

    /// Heart-beat interval requested in both directions (0 disables)
    #[arg(long, env = "NAGARE_HEARTBEAT_MS", default_value_t = 4000)]
    heartbeat_ms: u64,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logger(&["nagare_client", env!("CARGO_BIN_NAME")], &args.log_level);

    let reconnect = if args.no_reconnect {
        ReconnectPolicy::disabled()
    } else {
        ReconnectPolicy::fixed(Duration::from_millis(args.reconnect_delay_ms))
    };
    let connection = ConnectionConfig::new(args.ws_url)
        .with_heartbeat(HeartbeatConfig::symmetric(Duration::from_millis(args.heartbeat_ms)))
        .with_reconnect(reconnect);

    let options = ChatOptions {
        room_id: args.room,
        user_name: args.user,
        api_url: args.api_url,
        dedup: if args.dedup_by_id { DedupPolicy::ById } else { DedupPolicy::KeepAll },
        connection,
    };

    if let Err(e) = run_chat(options).await {
        tracing::error!("Chat client error: {}", e);
        std::process::exit(1);
    }
}
