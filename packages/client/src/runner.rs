//! Event loops behind the two binaries.
//!
//! Each loop owns its synchronizer and multiplexes three sources on one task:
//! synchronizer events, the one-shot baseline fetch, and user input. The fetch
//! runs concurrently with live frames; neither waits for the other.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::baseline::{BaselineSource, HttpBaselineSource};
use crate::chat::{ChatEvent, ChatRoom};
use crate::config::ConnectionConfig;
use crate::error::SyncError;
use crate::formatter::{MessageFormatter, MetricsFormatter};
use crate::metrics::{MetricsEvent, MetricsFeed};
use crate::sync::{ConnectionState, DedupPolicy};
use crate::transport::{SseTransport, StompTransport};
use crate::types::{ChatMessage, MetricsSnapshot};
use crate::ui::{redisplay_prompt, spawn_line_reader};

const QUIT_COMMAND: &str = "/quit";
const WHO_COMMAND: &str = "/who";

/// Settings for [`run_chat`]
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub room_id: String,
    pub user_name: String,
    pub api_url: String,
    /// Overlap handling between the history baseline and live messages
    pub dedup: DedupPolicy,
    pub connection: ConnectionConfig,
}

/// Settings for [`run_metrics`]
#[derive(Debug, Clone)]
pub struct MetricsOptions {
    pub api_url: String,
    pub window: usize,
    /// Print a window summary every this many snapshots (0 disables)
    pub summary_every: usize,
    pub connection: ConnectionConfig,
}

/// Resolve an optional in-flight future, or never.
async fn in_flight<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

/// Run the interactive chat view until the user quits.
pub async fn run_chat(options: ChatOptions) -> Result<(), SyncError> {
    let transport = StompTransport::new(&options.connection.url, options.connection.heartbeat);
    let mut room =
        ChatRoom::new(&options.room_id, transport, &options.connection).with_dedup(options.dedup);
    let baseline: Arc<dyn BaselineSource> = Arc::new(HttpBaselineSource::new(&options.api_url));
    run_chat_room(&mut room, baseline, &options.user_name).await
}

async fn run_chat_room(
    room: &mut ChatRoom<StompTransport>,
    baseline: Arc<dyn BaselineSource>,
    user_name: &str,
) -> Result<(), SyncError> {
    room.connect()?;
    room.join(user_name).await?;

    println!(
        "\nYou are '{}' in #{}. Type messages and press Enter to send. {} lists who is online, {} or Ctrl+C exits.\n",
        user_name,
        room.room_id(),
        WHO_COMMAND,
        QUIT_COMMAND
    );

    let mut input_rx = spawn_line_reader(user_name);
    let mut fetch: Option<BoxFuture<'static, Result<Vec<ChatMessage>, SyncError>>> = None;
    let mut refetch_on_connect = false;

    loop {
        if fetch.is_none()
            && let Some(room_id) = room.baseline_request()
        {
            let source = Arc::clone(&baseline);
            fetch = Some(async move { source.chat_history(&room_id).await }.boxed());
        }

        tokio::select! {
            event = room.next_event() => {
                let Some(event) = event else {
                    tracing::info!("Chat session ended");
                    break;
                };
                match event {
                    ChatEvent::StateChanged(state) => {
                        if state == ConnectionState::Connected && refetch_on_connect {
                            refetch_on_connect = false;
                            room.baseline_failed();
                        }
                        print!("{}", MessageFormatter::format_state_change(state));
                    }
                    ChatEvent::Message(message) => {
                        print!("{}", MessageFormatter::format_chat_message(&message));
                    }
                    ChatEvent::Presence(snapshot) => {
                        print!("{}", MessageFormatter::format_presence(&snapshot, room.identity()));
                    }
                }
                redisplay_prompt(user_name);
            }
            result = in_flight(&mut fetch) => {
                fetch = None;
                match result {
                    Ok(history) => {
                        print!("{}", MessageFormatter::format_history(room.room_id(), &history));
                        room.seed(history);
                    }
                    Err(e) => {
                        tracing::warn!("History unavailable, retrying after next connect: {}", e);
                        refetch_on_connect = true;
                    }
                }
                redisplay_prompt(user_name);
            }
            line = input_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                match line.as_str() {
                    QUIT_COMMAND => break,
                    WHO_COMMAND => {
                        print!("{}", MessageFormatter::format_presence(room.presence(), room.identity()));
                    }
                    text => match room.send_message(text).await {
                        Ok(()) => {}
                        Err(SyncError::OperationRejected(reason)) => {
                            print!("{}", MessageFormatter::format_rejection(reason));
                        }
                        Err(e) => tracing::warn!("Failed to send message: {}", e),
                    },
                }
                redisplay_prompt(user_name);
            }
        }
    }

    room.disconnect().await;
    Ok(())
}

/// Stream metrics to stdout until Ctrl+C.
pub async fn run_metrics(options: MetricsOptions) -> Result<(), SyncError> {
    let transport = SseTransport::new(
        &options.connection.url,
        options.connection.heartbeat.incoming,
    );
    let mut feed = MetricsFeed::with_capacity(transport, &options.connection, options.window);
    feed.connect()?;

    let baseline = HttpBaselineSource::new(&options.api_url);
    let mut fetch: Option<BoxFuture<'static, Result<MetricsSnapshot, SyncError>>> =
        Some(async move { baseline.metrics().await }.boxed());
    let mut received = 0usize;

    loop {
        tokio::select! {
            event = feed.next_event() => match event {
                Some(MetricsEvent::Snapshot(snapshot)) => {
                    println!("{}", MetricsFormatter::format_snapshot(&snapshot));
                    received += 1;
                    if options.summary_every > 0 && received % options.summary_every == 0 {
                        println!("{}", MetricsFormatter::format_window_summary(feed.history()));
                    }
                }
                Some(MetricsEvent::StateChanged(state)) => {
                    print!("{}", MessageFormatter::format_state_change(state));
                }
                None => break,
            },
            result = in_flight(&mut fetch) => {
                fetch = None;
                match result {
                    Ok(snapshot) => {
                        if feed.seed(snapshot.clone()) {
                            println!("{} (baseline)", MetricsFormatter::format_snapshot(&snapshot));
                        }
                    }
                    Err(e) => tracing::warn!("Metrics baseline unavailable: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    feed.disconnect().await;
    Ok(())
}
