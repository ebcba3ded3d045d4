//! Scripted download engine and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use playlist_downloader_lib::downloader::traits::{
    CollectionEntry, ExtractedCollection, ExtractedInfo, ExtractionDepth,
};
use playlist_downloader_lib::downloader::{
    CollectionMember, DownloadEngine, EngineError, EngineRequest, EngineStatus, ItemMetadata,
    RawProgress,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

/// What one engine download call does
pub enum Step {
    /// Report the given progress, then succeed
    Succeed(Vec<RawProgress>),
    Fail(EngineError),
    /// Block until notified, then succeed
    WaitFor(Arc<Notify>),
    Panic,
}

struct ScriptedExtract {
    url: String,
    depth: ExtractionDepth,
    delay: Duration,
    result: Result<ExtractedInfo, EngineError>,
}

/// Fake engine: per-URL queues of download steps and canned extraction results.
///
/// Downloads with nothing scripted succeed with started, half-way and finished events.
#[derive(Default)]
pub struct ScriptedEngine {
    steps: Mutex<HashMap<String, VecDeque<Step>>>,
    extracts: Mutex<Vec<ScriptedExtract>>,
    downloads: Mutex<Vec<(String, EngineRequest)>>,
    extract_calls: Mutex<Vec<(String, ExtractionDepth)>>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_download(&self, url: &str, steps: Vec<Step>) {
        self.steps
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn fail_always(&self, url: &str, error: EngineError, times: usize) {
        let steps = (0..times).map(|_| Step::Fail(error.clone())).collect();
        self.on_download(url, steps);
    }

    pub fn on_extract(
        &self,
        url: &str,
        depth: ExtractionDepth,
        delay: Duration,
        result: Result<ExtractedInfo, EngineError>,
    ) {
        self.extracts.lock().unwrap().push(ScriptedExtract {
            url: url.to_string(),
            depth,
            delay,
            result,
        });
    }

    /// URLs passed to `download`, in call order
    pub fn download_urls(&self) -> Vec<String> {
        self.downloads
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn download_requests(&self) -> Vec<EngineRequest> {
        self.downloads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn extract_calls(&self) -> Vec<(String, ExtractionDepth)> {
        self.extract_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract(&self, url: &str, depth: ExtractionDepth) -> Result<ExtractedInfo, EngineError> {
        self.extract_calls
            .lock()
            .unwrap()
            .push((url.to_string(), depth));

        let scripted = self
            .extracts
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.url == url && e.depth == depth)
            .map(|e| (e.delay, e.result.clone()));

        match scripted {
            Some((delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => Err(EngineError::Unknown(format!("nothing scripted for {}", url))),
        }
    }

    async fn download(
        &self,
        url: &str,
        request: &EngineRequest,
        progress: UnboundedSender<RawProgress>,
    ) -> Result<(), EngineError> {
        self.downloads
            .lock()
            .unwrap()
            .push((url.to_string(), request.clone()));

        let step = self
            .steps
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        match step {
            None => {
                for raw in default_progress() {
                    let _ = progress.send(raw);
                    tokio::task::yield_now().await;
                }
                Ok(())
            }
            Some(Step::Succeed(events)) => {
                for raw in events {
                    let _ = progress.send(raw);
                    tokio::task::yield_now().await;
                }
                Ok(())
            }
            Some(Step::Fail(error)) => Err(error),
            Some(Step::WaitFor(gate)) => {
                gate.notified().await;
                Ok(())
            }
            Some(Step::Panic) => panic!("engine exploded"),
        }
    }
}

pub fn downloading(done: u64, total: u64, index: Option<u32>) -> RawProgress {
    RawProgress {
        status: EngineStatus::Downloading,
        bytes_downloaded: done,
        bytes_total: Some(total),
        bytes_total_estimate: None,
        item_index: index,
    }
}

fn default_progress() -> Vec<RawProgress> {
    vec![
        RawProgress::started(),
        downloading(50, 100, None),
        RawProgress::finished(),
    ]
}

pub fn item(id: &str, title: &str) -> ItemMetadata {
    ItemMetadata {
        id: id.to_string(),
        title: title.to_string(),
        duration_seconds: Some(213),
        uploader: Some("Uploader".to_string()),
        view_count: Some(1_234),
        thumbnail_url: None,
        upload_date: Some("20240131".to_string()),
    }
}

/// Collection whose entries are `None` at the given 0-based positions
pub fn collection(title: &str, size: usize, unavailable: &[usize]) -> ExtractedInfo {
    let entries = (0..size)
        .map(|i| {
            if unavailable.contains(&i) {
                None
            } else {
                let id = format!("video{:06}", i + 1);
                Some(CollectionEntry {
                    metadata: item(&id, &format!("Video {}", i + 1)),
                    url: format!("https://www.youtube.com/watch?v={}", id),
                })
            }
        })
        .collect();

    ExtractedInfo::Collection(ExtractedCollection {
        title: title.to_string(),
        uploader: Some("Owner".to_string()),
        entries,
    })
}

pub fn members(count: u32) -> Vec<CollectionMember> {
    (1..=count)
        .map(|i| CollectionMember {
            metadata: item(&format!("member{:05}", i), &format!("Member {}", i)),
            source_url: member_url(i),
            index_in_collection: i,
        })
        .collect()
}

pub fn member_url(i: u32) -> String {
    format!("https://www.youtube.com/watch?v=member{:05}", i)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, image::Rgba([10, 120, 200, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}
