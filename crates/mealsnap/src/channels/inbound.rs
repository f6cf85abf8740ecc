//! Inbound update: the one value type the processor accepts, regardless of
//! whether the update arrived via webhook POST or a getUpdates poll batch.

use crate::channels::telegram::TelegramUpdate;

/// One platform update reduced to what processing needs. Transient —
/// constructed per received update, discarded after processing.
#[derive(Debug, Clone)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub chat_id: i64,
    /// Caption when a photo is attached, message text otherwise.
    pub text: Option<String>,
    /// file_id of the highest-resolution photo variant, when a photo is attached.
    pub photo_file_id: Option<String>,
}

impl InboundUpdate {
    /// Reduce a wire update to an [`InboundUpdate`].
    ///
    /// Returns `None` for updates with no message payload (e.g. channel posts)
    /// or with a missing chat — both are ignored, not errors. Edited messages
    /// are treated like new ones. Telegram orders photo variants ascending by
    /// size, so the last entry is the highest resolution.
    pub fn from_update(update: &TelegramUpdate) -> Option<Self> {
        let message = update.message.as_ref().or(update.edited_message.as_ref())?;
        let chat = message.chat.as_ref()?;
        let photo_file_id = message
            .photo
            .as_ref()
            .and_then(|sizes| sizes.last())
            .map(|p| p.file_id.clone());
        let text = message.caption.clone().or_else(|| message.text.clone());
        Some(Self {
            update_id: update.update_id,
            chat_id: chat.id,
            text,
            photo_file_id,
        })
    }
}
