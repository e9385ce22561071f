//! Packaging of the downloaded media into Telegram messages

use super::LocalMedia;
use crate::prelude::*;
use crate::provider::MediaKind;
use crate::tg::ChatTransport;
use std::path::PathBuf;
use std::time::Instant;
use teloxide::types::ChatId;

/// Telegram doesn't allow more items in a single album
pub(crate) const MAX_MEDIA_GROUP_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutgoingMedia {
    pub(crate) kind: MediaKind,
    pub(crate) file: PathBuf,

    /// Empty caption means no caption at all
    pub(crate) caption: String,
}

/// Unit of sending. Every batch is a single request to Telegram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Batch {
    Single(OutgoingMedia),
    Group(Vec<OutgoingMedia>),
}

#[derive(Debug)]
pub(crate) enum Delivery {
    Delivered {
        batches: usize,
    },
    PartiallyDelivered {
        delivered_batches: usize,
        error: crate::Error,
    },
    Failed(DeliveryFailure),
}

#[derive(Debug)]
pub(crate) enum DeliveryFailure {
    EmptyContent,
    Transport(crate::Error),
}

/// Splits the media into batches of at most [`MAX_MEDIA_GROUP_SIZE`] items
/// keeping the original order. The caption goes to the first item only.
/// Telegram rejects albums of one item, so such batches become a single
/// photo or video.
pub(crate) fn plan(items: &[LocalMedia], caption: &str) -> Vec<Batch> {
    items
        .chunks(MAX_MEDIA_GROUP_SIZE)
        .enumerate()
        .map(|(batch_index, chunk)| {
            let mut media = chunk.iter().enumerate().map(|(i, item)| OutgoingMedia {
                kind: item.kind,
                file: item.path.clone(),
                caption: if batch_index == 0 && i == 0 {
                    caption.to_owned()
                } else {
                    String::new()
                },
            });

            match (media.next(), chunk.len()) {
                (Some(single), 1) => Batch::Single(single),
                (first, _) => Batch::Group(first.into_iter().chain(media).collect()),
            }
        })
        .collect()
}

/// Sends the media to the chat. Stops at the first failed batch, because
/// the rest of the post would arrive out of order otherwise.
#[instrument(skip_all, fields(chat = %chat, items = items.len()))]
pub(crate) async fn deliver(
    transport: &dyn ChatTransport,
    chat: ChatId,
    items: &[LocalMedia],
    caption: &str,
) -> Delivery {
    let batches = plan(items, caption);

    if batches.is_empty() {
        return Delivery::Failed(DeliveryFailure::EmptyContent);
    }

    let start = Instant::now();
    let total = batches.len();

    for (delivered_batches, batch) in batches.into_iter().enumerate() {
        let result = match batch {
            Batch::Single(media) => match media.kind {
                MediaKind::Image => transport.send_photo(chat, &media.file, &media.caption).await,
                MediaKind::Video => transport.send_video(chat, &media.file, &media.caption).await,
            },
            Batch::Group(media) => transport.send_media_group(chat, media).await,
        };

        let Err(error) = result else {
            continue;
        };

        warn!(
            err = tracing_err(&error),
            delivered_batches, total, "Failed to send a batch of media"
        );

        if delivered_batches == 0 {
            return Delivery::Failed(DeliveryFailure::Transport(error));
        }

        return Delivery::PartiallyDelivered {
            delivered_batches,
            error,
        };
    }

    metrics::register_histogram!("reelgate_delivery_duration_seconds").record(start.elapsed());

    Delivery::Delivered { batches: total }
}
