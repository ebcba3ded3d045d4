// Downloader module - orchestration core around an external download engine

pub mod backends;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod format_selector;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod thumbnail;
pub mod traits;
pub mod ui;
pub mod utils;

pub use backends::YtDlpEngine;
pub use classifier::classify;
pub use config::AppConfig;
pub use errors::{DownloadError, EngineError, FetchError, ValidationError};
pub use format_selector::FormatSelector;
pub use metadata::{MetadataFetcher, PreviewFetcher};
pub use models::*;
pub use orchestrator::DownloadOrchestrator;
pub use progress::ProgressReporter;
pub use retry::RetryPolicy;
pub use thumbnail::{HttpThumbnailLoader, ThumbnailLoader};
pub use traits::{DownloadEngine, EngineRequest, JobSinks, ProgressEmitter};
pub use ui::{ChannelUiContext, UiContext, UiLoop};
