//! Telegram media relay for Immich Album Watcher
//!
//! [`MediaRelay`] takes a [`RelayRequest`] (chat, ordered photo/video URLs,
//! caption) and republishes the media through the Bot API, batching into
//! media groups and applying Telegram's photo limits. The HTTP surfaces sit
//! behind [`TelegramApi`] and [`MediaDownloader`]; image decoding behind
//! [`ImageInspector`].

pub mod api;
pub mod bot;
pub mod download;
pub mod error;
pub mod inspect;
pub mod relay;
pub mod request;

#[cfg(test)]
mod testing;

pub use api::{Extras, GroupMedia, MediaKind, MediaSource, MessageTarget, SentMessage, TelegramApi, Upload};
pub use bot::{BotApiClient, TELEGRAM_API_BASE};
pub use download::{HttpDownloader, MediaDownloader};
pub use error::{RelayError, RelayResult};
pub use inspect::{ImageCrateInspector, ImageInspector, PhotoLimits, SizeOnlyInspector};
pub use relay::MediaRelay;
pub use request::{
    MediaItem, OversizedPhotoPolicy, RelayReport, RelayRequest, RelayStatus, DEFAULT_MESSAGE_TEXT,
    DEFAULT_PARSE_MODE, MAX_GROUP_SIZE,
};
