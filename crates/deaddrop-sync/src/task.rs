//! Background task driving the engine: a poll interval plus a command
//! channel, multiplexed with `select!`. The task owns the engine; callers
//! keep only the command sender and the event receiver.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use deaddrop_remote::RemoteStore;

use crate::engine::SyncEngine;
use crate::error::SyncError;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Requests the UI layer sends into the sync task.
#[derive(Debug)]
pub enum SyncCommand {
    SendText {
        body: String,
    },
    SendFile {
        original_name: String,
        mime_type: String,
        content: Vec<u8>,
    },
    /// Poll immediately instead of waiting for the next interval.
    SyncNow,
    Shutdown,
}

/// Spawn the sync loop. Dropping the returned sender shuts the task down.
pub fn spawn<S: RemoteStore + 'static>(
    mut engine: SyncEngine<S>,
) -> (mpsc::Sender<SyncCommand>, JoinHandle<()>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(engine.config().poll_interval_ms));
        // Slow store calls must not cause a burst of catch-up polls.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(channel = %engine.channel(), "sync task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    report_tick(engine.poll_tick().await);
                }
                command = cmd_rx.recv() => {
                    match command {
                        Some(SyncCommand::SendText { body }) => {
                            // Failures surface as SendFailed events; nothing
                            // further to do here.
                            if let Err(e) = engine.send_text(&body).await {
                                debug!(error = %e, "send_text failed");
                            }
                        }
                        Some(SyncCommand::SendFile { original_name, mime_type, content }) => {
                            if let Err(e) = engine.send_file(&original_name, &mime_type, &content).await {
                                debug!(error = %e, "send_file failed");
                            }
                        }
                        Some(SyncCommand::SyncNow) => {
                            report_tick(engine.poll_tick().await);
                        }
                        Some(SyncCommand::Shutdown) | None => break,
                    }
                }
            }
        }

        info!(channel = %engine.channel(), "sync task stopped");
    });

    (cmd_tx, handle)
}

fn report_tick(result: Result<crate::engine::TickSummary, SyncError>) {
    match result {
        Ok(summary) if summary.ingested > 0 => {
            debug!(ingested = summary.ingested, "tick ingested new messages");
        }
        Ok(_) => {}
        // The store being briefly unreachable is expected operation, not an
        // incident; the next tick retries.
        Err(e) if e.is_transient() => warn!(error = %e, "poll tick failed, will retry"),
        Err(e) => error!(error = %e, "poll tick failed"),
    }
}
