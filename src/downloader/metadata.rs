// Metadata fetching for previews and playlist listings
//
// `MetadataFetcher` is the plain async API. `PreviewFetcher` adds the
// latest-request-wins rule the UI needs: the URL field re-fetches on every
// change, and a slow answer for an old URL must never overwrite the preview
// of a newer one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::classifier::classify;
use super::errors::FetchError;
use super::models::{
    CollectionMember, CollectionMetadata, ItemMetadata, ItemPreview, UrlClassification,
};
use super::thumbnail::ThumbnailLoader;
use super::traits::{DownloadEngine, ExtractedCollection, ExtractedInfo, ExtractionDepth};
use super::ui::UiContext;

pub struct MetadataFetcher {
    engine: Arc<dyn DownloadEngine>,
    thumbnails: Arc<dyn ThumbnailLoader>,
}

impl MetadataFetcher {
    pub fn new(engine: Arc<dyn DownloadEngine>, thumbnails: Arc<dyn ThumbnailLoader>) -> Self {
        Self { engine, thumbnails }
    }

    /// Metadata and best-effort thumbnail for a single item
    pub async fn fetch_item(&self, url: &str) -> Result<ItemPreview, FetchError> {
        expect_kind(url, UrlClassification::SingleItem)?;

        debug!(engine = self.engine.name(), url, "fetching item metadata");
        let metadata = match self.engine.extract(url, ExtractionDepth::Full).await? {
            ExtractedInfo::Item(metadata) => metadata,
            ExtractedInfo::Collection(_) => {
                return Err(FetchError::KindMismatch {
                    url: url.to_string(),
                    expected: UrlClassification::SingleItem,
                    actual: UrlClassification::Collection,
                })
            }
        };

        let thumbnail = match &metadata.thumbnail_url {
            Some(thumb_url) if !thumb_url.is_empty() => {
                match self.thumbnails.load(thumb_url).await {
                    Ok(t) => Some(t),
                    Err(e) => {
                        warn!(url = %thumb_url, error = %e, "thumbnail unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(ItemPreview {
            metadata,
            thumbnail,
        })
    }

    /// Playlist title, owner and available members
    pub async fn fetch_collection(&self, url: &str) -> Result<CollectionMetadata, FetchError> {
        expect_kind(url, UrlClassification::Collection)?;

        debug!(engine = self.engine.name(), url, "fetching playlist metadata");
        match self.engine.extract(url, ExtractionDepth::Full).await? {
            ExtractedInfo::Collection(collection) => {
                let listed = collection.entries.len();
                let metadata = collection_from(collection);
                info!(
                    title = %metadata.title,
                    available = metadata.members.len(),
                    listed,
                    "playlist fetched"
                );
                Ok(metadata)
            }
            ExtractedInfo::Item(_) => Err(FetchError::NotACollection(url.to_string())),
        }
    }
}

fn expect_kind(url: &str, expected: UrlClassification) -> Result<(), FetchError> {
    match classify(url) {
        UrlClassification::Invalid => Err(FetchError::InvalidUrl(url.to_string())),
        actual if actual != expected => Err(FetchError::KindMismatch {
            url: url.to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

/// Drop unavailable entries; survivors keep their original 1-based position
pub fn collection_from(extracted: ExtractedCollection) -> CollectionMetadata {
    let members = extracted
        .entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let entry = entry?;
            let mut metadata: ItemMetadata = entry.metadata;
            if metadata.title.is_empty() {
                metadata.title = format!("Video {}", i + 1);
            }
            Some(CollectionMember {
                metadata,
                source_url: entry.url,
                index_in_collection: i as u32 + 1,
            })
        })
        .collect();

    CollectionMetadata {
        title: extracted.title,
        uploader: extracted.uploader,
        members,
    }
}

/// Latest-request-wins wrapper around [`MetadataFetcher`].
///
/// Results are delivered on the UI context. A request is stale as soon as a
/// newer one for the same slot is issued (or the slot is invalidated); stale
/// results are dropped both on the worker and again right before delivery,
/// since a newer request may be issued while the old result sits in the UI
/// queue. The engine call itself is not aborted.
pub struct PreviewFetcher {
    fetcher: Arc<MetadataFetcher>,
    ui: Arc<dyn UiContext>,
    item_slot: Arc<AtomicU64>,
    collection_slot: Arc<AtomicU64>,
}

impl PreviewFetcher {
    pub fn new(fetcher: Arc<MetadataFetcher>, ui: Arc<dyn UiContext>) -> Self {
        Self {
            fetcher,
            ui,
            item_slot: Arc::new(AtomicU64::new(0)),
            collection_slot: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fetch an item preview on a worker. Must be called inside a tokio runtime.
    pub fn request_item<F>(&self, url: impl Into<String>, deliver: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<ItemPreview, FetchError>) + Send + 'static,
    {
        let url = url.into();
        let fetcher = Arc::clone(&self.fetcher);
        spawn_latest(
            Arc::clone(&self.item_slot),
            Arc::clone(&self.ui),
            async move { fetcher.fetch_item(&url).await },
            deliver,
        )
    }

    /// Fetch a playlist listing on a worker. Independent of item requests.
    pub fn request_collection<F>(&self, url: impl Into<String>, deliver: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<CollectionMetadata, FetchError>) + Send + 'static,
    {
        let url = url.into();
        let fetcher = Arc::clone(&self.fetcher);
        spawn_latest(
            Arc::clone(&self.collection_slot),
            Arc::clone(&self.ui),
            async move { fetcher.fetch_collection(&url).await },
            deliver,
        )
    }

    /// Discard any in-flight item result (e.g. the URL became invalid)
    pub fn invalidate(&self) {
        self.item_slot.fetch_add(1, Ordering::SeqCst);
    }

    /// Discard any in-flight playlist result
    pub fn invalidate_collection(&self) {
        self.collection_slot.fetch_add(1, Ordering::SeqCst);
    }
}

fn spawn_latest<T, Fut, F>(
    slot: Arc<AtomicU64>,
    ui: Arc<dyn UiContext>,
    fetch: Fut,
    deliver: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    F: FnOnce(Result<T, FetchError>) + Send + 'static,
{
    let generation = slot.fetch_add(1, Ordering::SeqCst) + 1;

    tokio::spawn(async move {
        let result = match tokio::spawn(fetch).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "metadata worker failed");
                Err(FetchError::WorkerPanicked)
            }
        };

        if slot.load(Ordering::SeqCst) != generation {
            debug!(generation, "dropping superseded metadata result");
            return;
        }

        ui.dispatch(Box::new(move || {
            if slot.load(Ordering::SeqCst) == generation {
                deliver(result);
            }
        }));
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, url: &str) -> Option<super::super::traits::CollectionEntry> {
        Some(super::super::traits::CollectionEntry {
            metadata: ItemMetadata {
                title: title.to_string(),
                ..ItemMetadata::default()
            },
            url: url.to_string(),
        })
    }

    #[test]
    fn test_unavailable_members_dropped() {
        let extracted = ExtractedCollection {
            title: "Mix".to_string(),
            uploader: Some("Someone".to_string()),
            entries: vec![entry("One", "u1"), None, entry("Three", "u3"), None],
        };

        let collection = collection_from(extracted);

        assert_eq!(collection.members.len(), 2);
        assert_eq!(collection.members[0].index_in_collection, 1);
        assert_eq!(collection.members[1].index_in_collection, 3);
        assert_eq!(collection.members[1].metadata.title, "Three");
        assert_eq!(collection.members[1].source_url, "u3");
    }

    #[test]
    fn test_untitled_member_gets_placeholder() {
        let extracted = ExtractedCollection {
            title: "Mix".to_string(),
            uploader: None,
            entries: vec![None, entry("", "u2")],
        };

        let collection = collection_from(extracted);
        assert_eq!(collection.members[0].metadata.title, "Video 2");
    }

    #[test]
    fn test_expect_kind() {
        assert!(expect_kind("https://youtu.be/dQw4w9WgXcQ", UrlClassification::SingleItem).is_ok());
        assert_eq!(
            expect_kind("", UrlClassification::SingleItem),
            Err(FetchError::InvalidUrl(String::new()))
        );
        assert!(matches!(
            expect_kind("https://x.com/playlist?list=XYZ", UrlClassification::SingleItem),
            Err(FetchError::KindMismatch {
                actual: UrlClassification::Collection,
                ..
            })
        ));
    }
}
