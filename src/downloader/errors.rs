// Error types for the orchestration core

use std::path::PathBuf;

use thiserror::Error;

use super::models::{DownloadIntent, UrlClassification};

/// Classified failure reported by the download engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Network timeout while talking to the site
    #[error("Network timeout: the site is not responding")]
    NetworkTimeout,

    /// The site refused the request (429, bot detection, 403)
    #[error("The site is throttling or blocking requests: {0}")]
    Blocked(String),

    /// Removed, private or otherwise unavailable media
    #[error("Media unavailable: {0}")]
    Unavailable(String),

    /// yt-dlp (or another engine executable) is missing
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The engine produced output we could not understand
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The engine process could not be run or exited abnormally
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("{0}")]
    Unknown(String),
}

impl EngineError {
    /// Short hint for the user, when there is something actionable.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NetworkTimeout => Some("Check your connection or configure a proxy"),
            Self::Blocked(_) => Some("Wait a while, use a proxy, or try a different network"),
            Self::ToolNotFound(_) => Some("Install yt-dlp or set YTDLP_PATH"),
            _ => None,
        }
    }
}

// Raw stderr text from the engine is classified by keyword.
impl From<String> for EngineError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("429")
            || lower.contains("403")
            || lower.contains("too many requests")
            || lower.contains("confirm you're not a bot")
            || lower.contains("blocked")
        {
            return Self::Blocked(last_error_line(&s));
        }

        if lower.contains("video unavailable")
            || lower.contains("private video")
            || lower.contains("has been removed")
            || lower.contains("not available")
        {
            return Self::Unavailable(last_error_line(&s));
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("json") || lower.contains("parse") {
            return Self::ParseError(s);
        }

        Self::Unknown(last_error_line(&s))
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

/// yt-dlp prints warnings before the real failure; keep the line that matters.
fn last_error_line(s: &str) -> String {
    s.lines()
        .rev()
        .find(|l| l.trim_start().starts_with("ERROR"))
        .or_else(|| s.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or(s)
        .trim()
        .to_string()
}

/// Selection string outside the recognized preset set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported quality/format selection: {0}")]
pub struct UnsupportedSelection(pub String);

/// Problems detected before any work starts. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a URL.")]
    EmptyUrl,

    #[error("Invalid URL format: {0}. Please enter a valid video or playlist URL.")]
    InvalidUrl(String),

    #[error("Please select a download location.")]
    EmptyDestination,

    #[error("Download location does not exist: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error("You selected '{declared}' but the URL is a {actual} URL.")]
    IntentMismatch {
        declared: DownloadIntent,
        actual: UrlClassification,
    },

    #[error("Please select at least one item to download.")]
    EmptySelection,

    /// A selected playlist member carries no URL (holds the member title)
    #[error("Selected item '{0}' has no URL.")]
    EmptyMemberUrl(String),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedSelection),
}

/// Metadata retrieval failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("expected a {expected} URL but {url} is a {actual} URL")]
    KindMismatch {
        url: String,
        expected: UrlClassification,
        actual: UrlClassification,
    },

    #[error("URL is not a playlist: {0}")]
    NotACollection(String),

    #[error("could not fetch information: {0}")]
    Engine(#[from] EngineError),

    #[error("metadata worker stopped unexpectedly")]
    WorkerPanicked,
}

impl FetchError {
    /// User-facing failure reason.
    pub fn reason(&self) -> String {
        match self {
            Self::Engine(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

/// Terminal failure of a download job.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A job is already running on this orchestrator
    #[error("A download is already in progress.")]
    Busy,

    #[error("Download failed after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: EngineError },

    #[error("Could not prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download worker stopped unexpectedly")]
    WorkerPanicked,
}
