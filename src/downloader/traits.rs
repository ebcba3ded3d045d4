// Engine collaborator trait and the sink plumbing around it

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::errors::EngineError;
use super::models::{FormatDirective, ItemMetadata, ProgressEvent, RawProgress};
use super::ui::UiContext;

/// How much the engine should resolve during metadata-only extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionDepth {
    /// Full per-item metadata
    Full,
    /// Shallow listing of collection members (cheap, for counting)
    Flat,
}

/// Collection member as listed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    pub metadata: ItemMetadata,
    pub url: String,
}

/// Collection as listed by the engine; `None` entries are unavailable members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCollection {
    pub title: String,
    pub uploader: Option<String>,
    pub entries: Vec<Option<CollectionEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedInfo {
    Item(ItemMetadata),
    Collection(ExtractedCollection),
}

/// Directive bundle for one engine download call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    pub directive: FormatDirective,
    /// Output path with engine placeholders, e.g. `/dl/%(title)s.%(ext)s`
    pub output_template: String,
    /// Download every member when the URL is a collection
    pub playlist: bool,
}

/// Download engine: extraction, downloading and post-processing
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Metadata only, nothing is downloaded
    async fn extract(&self, url: &str, depth: ExtractionDepth) -> Result<ExtractedInfo, EngineError>;

    /// Download `url`, reporting progress zero or more times
    async fn download(
        &self,
        url: &str,
        request: &EngineRequest,
        progress: UnboundedSender<RawProgress>,
    ) -> Result<(), EngineError>;
}

pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
pub type StatusSink = Arc<dyn Fn(String) + Send + Sync>;

/// Presentation callbacks for one download job
#[derive(Clone)]
pub struct JobSinks {
    pub progress: ProgressSink,
    pub status: StatusSink,
}

impl JobSinks {
    pub fn new<P, S>(progress: P, status: S) -> Self
    where
        P: Fn(ProgressEvent) + Send + Sync + 'static,
        S: Fn(String) + Send + Sync + 'static,
    {
        Self {
            progress: Arc::new(progress),
            status: Arc::new(status),
        }
    }

    /// Sinks that drop every event
    pub fn noop() -> Self {
        Self::new(|_| {}, |_| {})
    }
}

/// Delivers sink calls on the UI context
#[derive(Clone)]
pub struct ProgressEmitter {
    ui: Arc<dyn UiContext>,
    sinks: JobSinks,
}

impl ProgressEmitter {
    pub fn new(ui: Arc<dyn UiContext>, sinks: JobSinks) -> Self {
        Self { ui, sinks }
    }

    pub fn progress(&self, event: ProgressEvent) {
        let sink = Arc::clone(&self.sinks.progress);
        self.ui.dispatch(Box::new(move || sink(event)));
    }

    pub fn status(&self, status: impl Into<String>) {
        let sink = Arc::clone(&self.sinks.status);
        let status = status.into();
        self.ui.dispatch(Box::new(move || sink(status)));
    }
}
