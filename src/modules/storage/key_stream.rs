use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ObjectStorage;
use crate::core::error::Result;
use crate::shared::constants::STREAM_BUFFER_PAGES;

/// Page through every key under `prefix`, pushing keys into a bounded channel.
///
/// The producer stops when the listing has no continuation token, when the
/// batch is cancelled, or when every receiver is gone. The handle resolves to
/// the number of keys delivered.
pub fn stream_keys(
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
    page_size: usize,
    cancel: CancellationToken,
) -> (mpsc::Receiver<String>, JoinHandle<Result<usize>>) {
    let page_size = page_size.max(1);
    let (tx, rx) = mpsc::channel(page_size * STREAM_BUFFER_PAGES);

    let handle = tokio::spawn(async move {
        let mut token: Option<String> = None;
        let mut delivered = 0usize;
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let page = storage.list_keys_page(&prefix, token.take(), page_size).await?;
            pages += 1;
            debug!(
                "Listed page {} under '{}': {} keys",
                pages,
                prefix,
                page.keys.len()
            );

            for key in page.keys {
                // Directory placeholders carry no content
                if key.ends_with('/') {
                    continue;
                }
                if tx.send(key).await.is_err() {
                    return Ok(delivered);
                }
                delivered += 1;
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        info!(
            "Object listing under '{}' finished: {} keys in {} pages",
            prefix, delivered, pages
        );
        Ok(delivered)
    });

    (rx, handle)
}
