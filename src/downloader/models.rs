// Common data models for the orchestration core

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::utils::{format_duration, format_upload_date, format_view_count};

/// Result of classifying a user-supplied URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlClassification {
    Invalid,
    SingleItem,
    Collection,
}

impl fmt::Display for UrlClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid"),
            Self::SingleItem => write!(f, "single video"),
            Self::Collection => write!(f, "playlist"),
        }
    }
}

/// What the user said they want to download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadIntent {
    SingleItem,
    Collection,
}

impl DownloadIntent {
    /// Classification a URL must have to satisfy this intent
    pub fn expected(&self) -> UrlClassification {
        match self {
            Self::SingleItem => UrlClassification::SingleItem,
            Self::Collection => UrlClassification::Collection,
        }
    }
}

impl fmt::Display for DownloadIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleItem => write!(f, "Single Video"),
            Self::Collection => write!(f, "Playlist"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    AudioOnly,
}

/// Media type and quality/format label as read from the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSelection {
    pub kind: MediaKind,
    pub quality_or_format: String,
}

impl MediaSelection {
    pub fn video(quality: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            quality_or_format: quality.into(),
        }
    }

    pub fn audio(format: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::AudioOnly,
            quality_or_format: format.into(),
        }
    }
}

/// Post-processing requested from the engine after the download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostProcessingStep {
    /// Extract the audio track and convert it to `codec`
    ExtractAudio {
        codec: String,
        bitrate_kbps: Option<u32>,
    },
    /// Merge separate video/audio streams into `container`
    MergeInto { container: String },
}

/// Engine-facing description of the desired output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDirective {
    /// yt-dlp format selection expression (e.g. "bestaudio/best")
    pub format_expression: String,
    /// Preference order handed to the engine's format sorter
    pub format_sort: Vec<String>,
    /// Extension of the final file
    pub output_extension: String,
    pub post_processing: Vec<PostProcessingStep>,
}

impl FormatDirective {
    pub fn is_audio(&self) -> bool {
        self.post_processing
            .iter()
            .any(|p| matches!(p, PostProcessingStep::ExtractAudio { .. }))
    }
}

/// Descriptive metadata for a single item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: String,
    pub title: String,
    pub duration_seconds: Option<u64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub thumbnail_url: Option<String>,
    /// Upload date as reported by the engine (YYYYMMDD)
    pub upload_date: Option<String>,
}

impl ItemMetadata {
    pub fn duration_label(&self) -> String {
        format_duration(self.duration_seconds)
    }

    pub fn view_count_label(&self) -> String {
        format_view_count(self.view_count)
    }

    pub fn upload_date_label(&self) -> Option<String> {
        self.upload_date.as_deref().and_then(format_upload_date)
    }
}

/// One available member of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMember {
    pub metadata: ItemMetadata,
    pub source_url: String,
    /// 1-based position in the original collection
    pub index_in_collection: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub title: String,
    pub uploader: Option<String>,
    pub members: Vec<CollectionMember>,
}

/// Decoded, resized thumbnail ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixels, row-major
    pub rgba: Vec<u8>,
}

/// Metadata plus the optional thumbnail for a preview panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPreview {
    pub metadata: ItemMetadata,
    pub thumbnail: Option<Thumbnail>,
}

/// What a download job operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// A URL downloaded as-is, either one item or the whole collection
    Url { url: String, intent: DownloadIntent },
    /// A pre-selected subset of collection members
    Members(Vec<CollectionMember>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub target: DownloadTarget,
    pub destination: PathBuf,
    pub selection: MediaSelection,
}

/// Live bookkeeping for the running job
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub targets: Vec<String>,
    pub destination: PathBuf,
    pub directive: FormatDirective,
    pub attempt_count: u32,
    pub current_item_index: u32,
    pub total_item_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    FetchingMetadata,
    Downloading,
    Retrying,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::FetchingMetadata | Self::Downloading | Self::Retrying
        )
    }
}

/// Status values the engine reports through its progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    Started,
    Downloading,
    Finished,
}

/// Low-level progress event as emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProgress {
    pub status: EngineStatus,
    pub bytes_downloaded: u64,
    pub bytes_total: Option<u64>,
    pub bytes_total_estimate: Option<u64>,
    /// 1-based index within a collection, when the engine knows it
    pub item_index: Option<u32>,
}

impl RawProgress {
    pub fn started() -> Self {
        Self {
            status: EngineStatus::Started,
            bytes_downloaded: 0,
            bytes_total: None,
            bytes_total_estimate: None,
            item_index: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            status: EngineStatus::Finished,
            ..Self::started()
        }
    }
}

/// Normalized progress delivered to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub fraction_complete: f32,
    pub bytes_downloaded: u64,
    pub bytes_total: Option<u64>,
    pub current_item_index: u32,
    pub total_item_count: u32,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFailure {
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    PartialCollectionFailure,
}

/// Final report of a finished job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSummary {
    pub destination: PathBuf,
    pub total: u32,
    pub succeeded: u32,
    pub failures: Vec<MemberFailure>,
    /// Member-by-member accounting (subset downloads)
    pub itemized: bool,
}

impl DownloadSummary {
    pub fn outcome(&self) -> JobOutcome {
        if self.failures.is_empty() {
            JobOutcome::Completed
        } else {
            JobOutcome::PartialCollectionFailure
        }
    }

    /// Human-readable summary for the completion dialog
    pub fn message(&self) -> String {
        if !self.itemized {
            return format!("Downloaded to:\n{}", self.destination.display());
        }

        let mut msg = format!("Downloaded: {} / {}", self.succeeded, self.total);
        if !self.failures.is_empty() {
            msg.push_str(&format!("\nFailed: {}", self.failures.len()));
            for failure in &self.failures {
                msg.push_str(&format!("\n{} - {}", failure.title, failure.reason));
            }
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_message_lists_failures() {
        let summary = DownloadSummary {
            destination: PathBuf::from("/tmp/Playlist_Download"),
            total: 5,
            succeeded: 4,
            failures: vec![MemberFailure {
                title: "Third".into(),
                reason: "gone".into(),
            }],
            itemized: true,
        };

        assert_eq!(summary.outcome(), JobOutcome::PartialCollectionFailure);
        assert_eq!(summary.message(), "Downloaded: 4 / 5\nFailed: 1\nThird - gone");
    }

    #[test]
    fn test_single_summary_names_destination() {
        let summary = DownloadSummary {
            destination: PathBuf::from("/tmp/out"),
            total: 1,
            succeeded: 1,
            failures: Vec::new(),
            itemized: false,
        };

        assert_eq!(summary.outcome(), JobOutcome::Completed);
        assert_eq!(summary.message(), "Downloaded to:\n/tmp/out");
    }

    #[test]
    fn test_active_states() {
        assert!(JobState::Retrying.is_active());
        assert!(!JobState::Completed.is_active());
        assert!(!JobState::Idle.is_active());
    }
}
