//! Throttled image preloading
//!
//! After history loads, image attachments of the new records are warmed up
//! in fixed-size batches: at most `batch_size` loads run at once and each
//! batch finishes before the next starts. Failures are logged and counted,
//! never propagated.

use crate::{storage::message::MessageRecord, Result};
use std::{future::Future, sync::Arc};
use tokio::task::JoinSet;

/// Fetches an image so later rendering hits a warm cache
pub trait ImageLoader: Send + Sync + 'static {
    /// Load the image at `url`
    fn load(&self, url: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Outcome of a preload run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Images attempted
    pub attempted: usize,
    /// Images loaded
    pub loaded: usize,
    /// Images that failed to load
    pub failed: usize,
}

/// URLs of image attachments, in record order
pub fn image_urls(records: &[MessageRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.attachment.as_ref())
        .filter(|attachment| attachment.is_image() && !attachment.local_preview)
        .filter_map(|attachment| attachment.display_url())
        .collect()
}

/// Preload the images attached to `records`, `batch_size` at a time
pub async fn preload_images<L: ImageLoader>(
    loader: Arc<L>,
    records: &[MessageRecord],
    batch_size: usize,
) -> PreloadReport {
    let urls = image_urls(records);
    let mut report = PreloadReport {
        attempted: urls.len(),
        ..PreloadReport::default()
    };

    for batch in urls.chunks(batch_size.max(1)) {
        let mut set = JoinSet::new();
        for url in batch {
            let loader = Arc::clone(&loader);
            let url = url.clone();
            set.spawn(async move {
                let result = loader.load(&url).await;
                (url, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.loaded += 1,
                Ok((url, Err(e))) => {
                    tracing::warn!("Failed to preload image {}: {}", url, e);
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!("Image preload task failed: {}", e);
                    report.failed += 1;
                }
            }
        }
    }

    tracing::debug!(
        "Preloaded {}/{} images ({} failed)",
        report.loaded,
        report.attempted,
        report.failed
    );
    report
}
