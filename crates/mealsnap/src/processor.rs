//! Update processor: turn one inbound platform update into an analysis
//! request, drive the external workflow, and reply to the user.
//!
//! Holds no mutable state beyond its shared collaborators, so it is safe to
//! invoke re-entrantly (webhook deliveries have no ordering guarantee).

use crate::channels::{BotApi, InboundUpdate, TelegramUpdate};
use crate::error::Error;
use crate::image;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::workflow::AnalysisWorkflow;
use crate::workflow::NutritionAnalysis;
use serde_json::json;
use std::sync::Arc;

const PROMPT_REPLY: &str = "please send a photo of your meal and I'll estimate its nutrition";
const ACK_REPLY: &str = "got it, analyzing your photo...";
const GENERIC_FAILURE_REPLY: &str =
    "something went wrong analyzing your photo. please try again later.";

/// Result of processing one update. `body` is safe to return to the platform;
/// `error` carries the internal failure (if any) for the caller to log.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub handled: bool,
    pub status: u16,
    pub body: serde_json::Value,
    pub error: Option<String>,
}

impl ProcessOutcome {
    fn ignored() -> Self {
        Self {
            handled: false,
            status: 200,
            body: json!({ "ok": true, "handled": false }),
            error: None,
        }
    }

    fn replied(status: u16) -> Self {
        Self {
            handled: true,
            status,
            body: json!({ "ok": status < 400, "handled": true, "status": status }),
            error: None,
        }
    }
}

/// Processes inbound updates: photo lookup, normalization, analysis workflow,
/// user-facing replies. Platform and workflow I/O goes through the retry
/// adapter.
pub struct UpdateProcessor {
    bot: Arc<dyn BotApi>,
    workflow: Arc<dyn AnalysisWorkflow>,
    retry: RetryPolicy,
    max_image_bytes: usize,
}

impl UpdateProcessor {
    pub fn new(
        bot: Arc<dyn BotApi>,
        workflow: Arc<dyn AnalysisWorkflow>,
        retry: RetryPolicy,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            bot,
            workflow,
            retry,
            max_image_bytes,
        }
    }

    /// Process one update. Never returns an error: failures become structured
    /// outcomes so neither the poll loop nor the webhook endpoint can break.
    pub async fn process(&self, update: &TelegramUpdate) -> ProcessOutcome {
        let Some(inbound) = InboundUpdate::from_update(update) else {
            // No message payload or no chat to reply to; ignore, not an error.
            return ProcessOutcome::ignored();
        };

        let Some(ref file_id) = inbound.photo_file_id else {
            self.reply(inbound.chat_id, PROMPT_REPLY).await;
            return ProcessOutcome::replied(200);
        };

        // Best-effort acknowledgment before the (slow) analysis starts.
        if let Err(e) = self.bot.send_message(inbound.chat_id, ACK_REPLY).await {
            log::debug!("processing ack for chat {} failed: {}", inbound.chat_id, e);
        }

        match self.analyze_photo(&inbound, file_id).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_validation() => {
                self.reply(inbound.chat_id, &e.to_string()).await;
                let mut outcome = ProcessOutcome::replied(400);
                outcome.error = Some(e.to_string());
                outcome
            }
            Err(e) => {
                self.reply(inbound.chat_id, GENERIC_FAILURE_REPLY).await;
                let mut outcome = ProcessOutcome::replied(500);
                outcome.error = Some(e.to_string());
                outcome
            }
        }
    }

    /// Fetch, normalize, analyze, upload, persist, and reply with the summary.
    async fn analyze_photo(
        &self,
        inbound: &InboundUpdate,
        file_id: &str,
    ) -> Result<ProcessOutcome, Error> {
        let (raw, filename) =
            run_with_retry(&self.retry, || self.bot.fetch_file(file_id)).await?;

        let prepared = image::normalize(&raw, self.max_image_bytes)?;

        let nutrition =
            run_with_retry(&self.retry, || self.workflow.analyze(&prepared, &filename))
                .await
                .map_err(Error::Workflow)?;

        let stored = run_with_retry(&self.retry, || {
            self.workflow
                .upload(&prepared.bytes, &filename, prepared.content_type)
        })
        .await
        .map_err(Error::Workflow)?;

        let record = run_with_retry(&self.retry, || {
            self.workflow.persist(&stored.path, &nutrition)
        })
        .await
        .map_err(Error::Workflow)?;

        log::info!(
            "analysis completed: update {} chat {} record {}",
            inbound.update_id,
            inbound.chat_id,
            record.id
        );
        self.reply(inbound.chat_id, &format_summary(&nutrition)).await;

        Ok(ProcessOutcome {
            handled: true,
            status: 200,
            body: json!({
                "ok": true,
                "handled": true,
                "status": 200,
                "analysisId": record.id,
                "imageUrl": stored.url,
                "createdAt": record.created_at,
            }),
            error: None,
        })
    }

    /// Send a reply through the retry adapter; a reply that still fails after
    /// retries is logged, not surfaced.
    async fn reply(&self, chat_id: i64, text: &str) {
        let result = run_with_retry(&self.retry, || self.bot.send_message(chat_id, text)).await;
        if let Err(e) = result {
            log::warn!("reply to chat {} failed: {}", chat_id, e);
        }
    }
}

/// User-facing nutrition summary.
fn format_summary(n: &NutritionAnalysis) -> String {
    format!(
        "{}\ncalories: {:.0} kcal\nsugar: {:.1} g\nprotein: {:.1} g\n{}",
        n.food_name, n.calories, n.sugar, n.protein, n.others
    )
}
