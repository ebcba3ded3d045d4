// Progress reporting: engine byte counters -> fraction + status text

use super::models::{EngineStatus, MediaKind, ProgressEvent, RawProgress};
use super::utils::format_bytes;

/// Marker that starts every machine-readable progress line we ask yt-dlp for
pub const PROGRESS_MARKER: &str = "[progress]";

/// `--progress-template` value matching [`parse_progress_line`]
pub const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s \
     %(progress.downloaded_bytes)s %(progress.total_bytes)s \
     %(progress.total_bytes_estimate)s %(info.playlist_index)s";

/// Turns raw engine events into UI-ready progress for one job.
///
/// Keeps the item index of multi-item jobs: engine events without an index
/// reuse the last known one, and the index never moves backwards.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    media_kind: MediaKind,
    current_item: u32,
    total_items: u32,
}

impl ProgressReporter {
    pub fn new(media_kind: MediaKind, total_items: u32) -> Self {
        let total_items = total_items.max(1);
        Self {
            media_kind,
            current_item: if total_items > 1 { 1 } else { 0 },
            total_items,
        }
    }

    pub fn current_item(&self) -> u32 {
        self.current_item
    }

    pub fn total_items(&self) -> u32 {
        self.total_items
    }

    /// Move to a known item (members are downloaded one URL at a time)
    pub fn set_current_item(&mut self, index: u32) {
        self.advance_to(index);
    }

    pub fn normalize(&mut self, raw: &RawProgress) -> ProgressEvent {
        if let Some(index) = raw.item_index {
            self.advance_to(index);
        }

        let total = raw.bytes_total.or(raw.bytes_total_estimate).filter(|t| *t > 0);

        let (fraction, status) = match raw.status {
            EngineStatus::Finished => {
                let status = match self.media_kind {
                    MediaKind::AudioOnly => "Converting to audio format...",
                    MediaKind::Video => "Processing and merging files...",
                };
                (1.0, status.to_string())
            }
            EngineStatus::Started => (0.0, format!("{}Starting download...", self.item_prefix())),
            EngineStatus::Downloading => {
                let fraction = match total {
                    Some(t) => (raw.bytes_downloaded as f64 / t as f64).clamp(0.0, 1.0) as f32,
                    None => 0.0,
                };
                let detail = match total {
                    Some(t) => format!("Downloaded: {:.1}% of {}", fraction * 100.0, format_bytes(t)),
                    None => format!("Downloaded: {}", format_bytes(raw.bytes_downloaded)),
                };
                (fraction, format!("{}{}", self.item_prefix(), detail))
            }
        };

        ProgressEvent {
            fraction_complete: fraction,
            bytes_downloaded: raw.bytes_downloaded,
            bytes_total: total,
            current_item_index: self.current_item,
            total_item_count: self.total_items,
            status,
        }
    }

    fn advance_to(&mut self, index: u32) {
        self.current_item = self.current_item.max(index.min(self.total_items));
    }

    fn item_prefix(&self) -> String {
        if self.total_items > 1 {
            format!(
                "Downloading item {} of {}: ",
                self.current_item.max(1),
                self.total_items
            )
        } else {
            String::new()
        }
    }
}

/// yt-dlp's notice for a file that is already on disk
const ALREADY_DOWNLOADED: &str = "has already been downloaded";

/// Parse one line of yt-dlp stdout produced with [`PROGRESS_TEMPLATE`].
///
/// Missing values show up as `NA`; byte counts may be fractional estimates.
pub fn parse_progress_line(line: &str) -> Option<RawProgress> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        let mut fields = rest.split_whitespace();
        let status = match fields.next()? {
            "downloading" => EngineStatus::Downloading,
            "finished" => EngineStatus::Finished,
            "started" => EngineStatus::Started,
            _ => return None,
        };
        let downloaded = fields.next().and_then(parse_bytes).unwrap_or(0);
        let total = fields.next().and_then(parse_bytes);
        let estimate = fields.next().and_then(parse_bytes);
        let index = fields
            .next()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|i| *i > 0);

        return Some(RawProgress {
            status,
            bytes_downloaded: downloaded,
            bytes_total: total,
            bytes_total_estimate: estimate,
            item_index: index,
        });
    }

    if line.starts_with("[download]") && line.contains(ALREADY_DOWNLOADED) {
        return Some(RawProgress::finished());
    }

    None
}

fn parse_bytes(value: &str) -> Option<u64> {
    let v: f64 = value.parse().ok()?;
    (v.is_finite() && v >= 0.0).then(|| v as u64)
}
