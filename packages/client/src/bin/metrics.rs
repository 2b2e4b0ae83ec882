//! Metrics dashboard in the terminal.
//!
//! Seeds from `GET {api}/metrics`, then follows the server-sent event stream at
//! `{api}/metrics/stream`, printing one line per snapshot and a rolling summary.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin nagare-metrics
//! cargo run --bin nagare-metrics -- --api-url http://localhost:8080/api --summary-every 10
//! ```

use std::time::Duration;

use clap::Parser;

use nagare_client::config::{
    ConnectionConfig, DEFAULT_API_URL, HeartbeatConfig, metrics_stream_url,
};
use nagare_client::runner::{MetricsOptions, run_metrics};
use nagare_client::sync::ReconnectPolicy;
use nagare_client::sync::window::DEFAULT_WINDOW_CAPACITY;
use nagare_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "nagare-metrics")]
#[command(about = "Live metrics feed with a rolling window", long_about = None)]
struct Args {
    /// REST API base; the stream is read from `{api}/metrics/stream`
    #[arg(long, env = "NAGARE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Snapshots kept in the rolling window
    #[arg(long, default_value_t = DEFAULT_WINDOW_CAPACITY)]
    window: usize,

    /// Print a window summary every N snapshots (0 disables)
    #[arg(long, default_value_t = 10)]
    summary_every: usize,

    /// Delay before each reconnect attempt
    #[arg(long, env = "NAGARE_RECONNECT_DELAY_MS", default_value_t = 5000)]
    reconnect_delay_ms: u64,

    /// Treat the stream as dead after this long without data, times 2 (0 disables)
    #[arg(long, env = "NAGARE_STREAM_IDLE_MS", default_value_t = 0)]
    stream_idle_ms: u64,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logger(&["nagare_client", env!("CARGO_BIN_NAME")], &args.log_level);

    let heartbeat = HeartbeatConfig {
        outgoing: Duration::ZERO,
        incoming: Duration::from_millis(args.stream_idle_ms),
        ..HeartbeatConfig::default()
    };
    let connection = ConnectionConfig::event_stream(metrics_stream_url(&args.api_url))
        .with_heartbeat(heartbeat)
        .with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(
            args.reconnect_delay_ms,
        )));

    let options = MetricsOptions {
        api_url: args.api_url,
        window: args.window,
        summary_every: args.summary_every,
        connection,
    };

    if let Err(e) = run_metrics(options).await {
        tracing::error!("Metrics client error: {}", e);
        std::process::exit(1);
    }
}
