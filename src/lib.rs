pub mod downloader;

pub use downloader::{
    classify, AppConfig, ChannelUiContext, DownloadEngine, DownloadError, DownloadOrchestrator,
    FormatSelector, HttpThumbnailLoader, JobSinks, MetadataFetcher, PreviewFetcher, RetryPolicy,
    UiContext, UiLoop, YtDlpEngine,
};
