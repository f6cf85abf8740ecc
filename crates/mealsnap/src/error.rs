//! Crate error taxonomy: validation, transient remote, configuration, unexpected.

use crate::channels::TelegramError;
use crate::image::ImageError;

/// Top-level error for ingestion and processing paths.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input (oversized, corrupt, or unsupported image). Surfaced to the
    /// user with its specific message; never retried.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Telegram Bot API failure (network or non-ok payload). Retried by the
    /// retry adapter up to policy limits, then surfaced.
    #[error(transparent)]
    Telegram(#[from] TelegramError),

    /// A required setting is missing. Raised at the point of use so unrelated
    /// functionality keeps working.
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// Anything else (analysis, storage, persistence). Logged with context by
    /// the caller; users only ever see a generic message.
    #[error(transparent)]
    Workflow(#[from] anyhow::Error),
}

impl Error {
    /// True when the error should be reported back to the user verbatim
    /// (validation failures), as opposed to a generic failure message.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Image(_))
    }
}
