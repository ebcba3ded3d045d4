use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::downloader::config::EngineConfig;
use crate::downloader::errors::EngineError;
use crate::downloader::models::{ItemMetadata, PostProcessingStep, RawProgress};
use crate::downloader::progress::{parse_progress_line, PROGRESS_TEMPLATE};
use crate::downloader::traits::{
    CollectionEntry, DownloadEngine, EngineRequest, ExtractedCollection, ExtractedInfo,
    ExtractionDepth,
};
use crate::downloader::utils::{network_args, run_output_with_timeout};

/// Common install locations, checked before `which`
const COMMON_PATHS: [&str; 3] = [
    "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
    "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
    "/usr/bin/yt-dlp",
];

/// Titles yt-dlp gives playlist entries it cannot access
const UNAVAILABLE_TITLES: [&str; 2] = ["[Private video]", "[Deleted video]"];

pub struct YtDlpEngine {
    binary: String,
    config: EngineConfig,
}

impl YtDlpEngine {
    pub fn new(config: EngineConfig) -> Self {
        let binary = find_ytdlp(config.binary.as_deref());
        debug!(binary = %binary, "using yt-dlp");
        Self { binary, config }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[async_trait]
impl DownloadEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(&self, url: &str, depth: ExtractionDepth) -> Result<ExtractedInfo, EngineError> {
        let args = extract_args(&self.config, url, depth);
        debug!(binary = %self.binary, ?depth, url, "extracting metadata");

        let output = run_output_with_timeout(&self.binary, &args, self.config.info_timeout_secs)
            .await
            .map_err(EngineError::from)?;

        // With --ignore-errors a playlist with broken members still exits
        // non-zero, so only bail when nothing usable came back.
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(if stderr.trim().is_empty() {
                EngineError::ExecutionError(format!("yt-dlp exited with {}", output.status))
            } else {
                EngineError::from(stderr)
            });
        }

        parse_extracted(&output.stdout)
    }

    async fn download(
        &self,
        url: &str,
        request: &EngineRequest,
        progress: UnboundedSender<RawProgress>,
    ) -> Result<(), EngineError> {
        let args = download_args(&self.config, url, request);
        debug!(binary = %self.binary, args = ?args, "starting download");

        let mut child = TokioCommand::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::ToolNotFound(format!("{}: {}", self.binary, e))
                } else {
                    EngineError::ExecutionError(format!("Failed to start yt-dlp: {}", e))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::ExecutionError("Failed to capture stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::ExecutionError("Failed to capture stderr".into()))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected.join("\n")
        });

        let _ = progress.send(RawProgress::started());

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| EngineError::ExecutionError(format!("Failed to read output: {}", e)))?
        {
            if let Some(raw) = parse_progress_line(&line) {
                // Receiver gone only means nobody is watching any more
                let _ = progress.send(raw);
            } else if line.contains("[Merger]")
                || line.contains("[ExtractAudio]")
                || line.contains("Destination")
            {
                debug!("[yt-dlp] {}", line);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::ExecutionError(format!("Process error: {}", e)))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if status.success() {
            return Ok(());
        }
        if stderr_output.trim().is_empty() {
            return Err(EngineError::ExecutionError(format!(
                "yt-dlp exited with {}",
                status
            )));
        }
        Err(EngineError::from(stderr_output))
    }
}

/// Find yt-dlp: explicit override, common paths, `which`, then bare name
fn find_ytdlp(configured: Option<&str>) -> String {
    if let Some(path) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        return path.to_string();
    }

    for path in COMMON_PATHS {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    "yt-dlp".to_string()
}

fn extract_args(config: &EngineConfig, url: &str, depth: ExtractionDepth) -> Vec<String> {
    let mut args = vec![
        "--dump-single-json".to_string(),
        "--no-warnings".to_string(),
        "--ignore-errors".to_string(),
    ];
    if depth == ExtractionDepth::Flat {
        args.push("--flat-playlist".to_string());
    }
    args.extend(network_args(config));
    args.push(url.to_string());
    args
}

fn download_args(config: &EngineConfig, url: &str, request: &EngineRequest) -> Vec<String> {
    let directive = &request.directive;
    let mut args = vec!["-f".to_string(), directive.format_expression.clone()];

    if !directive.format_sort.is_empty() {
        args.push("-S".to_string());
        args.push(directive.format_sort.join(","));
    }

    for step in &directive.post_processing {
        match step {
            PostProcessingStep::MergeInto { container } => {
                args.push("--merge-output-format".to_string());
                args.push(container.clone());
            }
            PostProcessingStep::ExtractAudio {
                codec,
                bitrate_kbps,
            } => {
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.clone());
                if let Some(kbps) = bitrate_kbps {
                    args.push("--audio-quality".to_string());
                    args.push(format!("{}K", kbps));
                }
            }
        }
    }

    args.extend([
        "-o".to_string(),
        request.output_template.clone(),
        "--newline".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
    ]);

    if request.playlist {
        args.push("--yes-playlist".to_string());
        args.push("--ignore-errors".to_string());
    } else {
        args.push("--no-playlist".to_string());
    }

    args.extend(network_args(config));
    args.push(url.to_string());
    args
}

fn parse_extracted(stdout: &[u8]) -> Result<ExtractedInfo, EngineError> {
    let json: Value = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::ParseError(format!("JSON parse error: {}", e)))?;

    if json["_type"].as_str() != Some("playlist") {
        return Ok(ExtractedInfo::Item(parse_item(&json)));
    }

    let entries = json["entries"]
        .as_array()
        .map(|entries| entries.iter().map(parse_entry).collect())
        .unwrap_or_default();

    Ok(ExtractedInfo::Collection(ExtractedCollection {
        title: json["title"].as_str().unwrap_or("Playlist").to_string(),
        uploader: uploader_of(&json),
        entries,
    }))
}

fn parse_item(json: &Value) -> ItemMetadata {
    ItemMetadata {
        id: json["id"].as_str().unwrap_or("").to_string(),
        title: json["title"].as_str().unwrap_or("").to_string(),
        duration_seconds: json["duration"]
            .as_f64()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64),
        uploader: uploader_of(json),
        view_count: json["view_count"].as_u64(),
        thumbnail_url: thumbnail_of(json),
        upload_date: json["upload_date"].as_str().map(str::to_string),
    }
}

fn parse_entry(json: &Value) -> Option<CollectionEntry> {
    if !json.is_object() {
        return None;
    }

    let metadata = parse_item(json);
    if UNAVAILABLE_TITLES.contains(&metadata.title.as_str()) {
        return None;
    }

    let url = json["webpage_url"]
        .as_str()
        .or_else(|| json["url"].as_str())
        .map(str::to_string)
        .or_else(|| {
            (!metadata.id.is_empty())
                .then(|| format!("https://www.youtube.com/watch?v={}", metadata.id))
        })?;

    Some(CollectionEntry { metadata, url })
}

fn uploader_of(json: &Value) -> Option<String> {
    json["uploader"]
        .as_str()
        .or_else(|| json["channel"].as_str())
        .map(str::to_string)
}

/// `thumbnail`, else the last (largest) entry of `thumbnails`
fn thumbnail_of(json: &Value) -> Option<String> {
    json["thumbnail"]
        .as_str()
        .map(str::to_string)
        .or_else(|| {
            json["thumbnails"]
                .as_array()?
                .iter()
                .rev()
                .find_map(|t| t["url"].as_str())
                .map(str::to_string)
        })
}
