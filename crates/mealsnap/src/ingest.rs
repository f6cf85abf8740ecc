//! Ingestion controller: decides webhook vs long-poll delivery at startup,
//! owns the single long-poll loop, and tears it down on shutdown.
//!
//! The two modes are mutually exclusive for the process lifetime; the mode is
//! decided once here and read-only afterwards.

use crate::channels::{TelegramBot, TelegramUpdate};
use crate::processor::UpdateProcessor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Sleep after a failed poll before retrying.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// How updates are delivered for the lifetime of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// No bot token configured; ingestion is a no-op.
    Unconfigured,
    /// Telegram POSTs updates to our registered public URL.
    Webhook,
    /// We long-poll getUpdates from a background task.
    LongPoll,
}

/// Offset into the update stream. Owned exclusively by the poll loop; at most
/// one active loop exists per process.
#[derive(Debug, Default)]
struct PollCursor {
    next_offset: Option<i64>,
}

impl PollCursor {
    fn offset(&self) -> Option<i64> {
        self.next_offset
    }

    /// Acknowledge `update_id`: the next poll asks for `update_id + 1`.
    /// Never moves backwards.
    fn advance(&mut self, update_id: i64) {
        let next = update_id + 1;
        if self.next_offset.map_or(true, |current| next > current) {
            self.next_offset = Some(next);
        }
    }
}

/// Handle to the ingestion subsystem. Created once at startup; `shutdown` is
/// idempotent and safe to call even when no poll task was ever spawned.
pub struct IngestController {
    mode: DeliveryMode,
    bot: Option<Arc<TelegramBot>>,
    cancel_tx: Option<watch::Sender<bool>>,
    poll_task: Option<JoinHandle<()>>,
}

impl IngestController {
    /// Controller for a process with no messaging credential: permanent no-op.
    pub fn disabled() -> Self {
        Self {
            mode: DeliveryMode::Unconfigured,
            bot: None,
            cancel_tx: None,
            poll_task: None,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Negotiate the delivery mode and start ingestion.
    ///
    /// `webhook_target` is the already-resolved candidate URL (explicit config
    /// or tunnel bootstrap result). When registration succeeds we run in
    /// webhook mode and spawn nothing; any registration failure degrades to
    /// polling — it never aborts startup.
    pub async fn start(
        bot: Option<Arc<TelegramBot>>,
        processor: Arc<UpdateProcessor>,
        webhook_target: Option<String>,
        webhook_secret: Option<&str>,
    ) -> Self {
        let Some(bot) = bot else {
            log::info!("telegram ingestion disabled (no bot token configured)");
            return Self::disabled();
        };

        if let Some(ref url) = webhook_target {
            match bot.set_webhook(url, webhook_secret).await {
                Ok(()) => {
                    log::info!("telegram ingestion active (webhook mode): {}", url);
                    return Self {
                        mode: DeliveryMode::Webhook,
                        bot: Some(bot),
                        cancel_tx: None,
                        poll_task: None,
                    };
                }
                Err(e) => {
                    log::warn!(
                        "webhook registration failed, falling back to long-poll: {}",
                        e
                    );
                }
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let poll_bot = bot.clone();
        let poll_task = tokio::spawn(async move {
            run_poll_loop(poll_bot, processor, cancel_rx).await;
        });
        log::info!("telegram ingestion active (long-poll mode)");
        Self {
            mode: DeliveryMode::LongPoll,
            bot: Some(bot),
            cancel_tx: Some(cancel_tx),
            poll_task: Some(poll_task),
        }
    }

    /// True while the poll task has not finished (long-poll mode only).
    pub fn polling(&self) -> bool {
        self.poll_task
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Signal cancellation, await the poll loop, and deregister the webhook
    /// (best-effort) if one was registered. Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(true);
        }
        if let Some(task) = self.poll_task.take() {
            let _ = task.await;
        }
        if self.mode == DeliveryMode::Webhook {
            if let Some(ref bot) = self.bot {
                if let Err(e) = bot.delete_webhook().await {
                    log::debug!("delete_webhook on shutdown: {}", e);
                }
            }
        }
        if self.mode != DeliveryMode::Unconfigured {
            log::info!("telegram ingestion stopped");
        }
    }
}

/// The long-poll loop: getUpdates, advance the cursor, process sequentially.
///
/// The cursor is advanced *before* dispatching each update, so an update whose
/// processing fails is dropped rather than redelivered (at-most-once). Drops
/// are logged with the update id. Cancellation is observed at the in-flight
/// getUpdates call or the error backoff sleep.
async fn run_poll_loop(
    bot: Arc<TelegramBot>,
    processor: Arc<UpdateProcessor>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    log::info!("getUpdates long-poll loop started");
    let mut cursor = PollCursor::default();
    loop {
        let batch: Result<Vec<TelegramUpdate>, _> = tokio::select! {
            _ = cancel_rx.changed() => break,
            res = bot.get_updates(cursor.offset()) => res,
        };
        match batch {
            Ok(updates) => {
                for update in updates {
                    cursor.advance(update.update_id);
                    let outcome = processor.process(&update).await;
                    if let Some(err) = outcome.error {
                        log::warn!(
                            "update {} dropped after processing failure: {}",
                            update.update_id,
                            err
                        );
                    }
                }
            }
            Err(e) => {
                log::debug!("getUpdates error: {}", e);
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                }
            }
        }
    }
    log::info!("getUpdates long-poll loop stopped");
}
