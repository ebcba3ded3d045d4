// Download orchestration: validation, single-job slot, retry, member batches

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::classifier::classify;
use super::config::{AppConfig, LayoutConfig};
use super::errors::{DownloadError, EngineError, ValidationError};
use super::format_selector::FormatSelector;
use super::models::{
    CollectionMember, DownloadIntent, DownloadJob, DownloadRequest, DownloadSummary,
    DownloadTarget, FormatDirective, JobState, MediaKind, MemberFailure, UrlClassification,
};
use super::progress::ProgressReporter;
use super::retry::{RetryExhausted, RetryPolicy};
use super::traits::{
    DownloadEngine, EngineRequest, ExtractedInfo, ExtractionDepth, JobSinks, ProgressEmitter,
};
use super::ui::UiContext;

const TITLE_TEMPLATE: &str = "%(title)s.%(ext)s";
const INDEXED_TITLE_TEMPLATE: &str = "%(playlist_index)s - %(title)s.%(ext)s";
const COLLECTION_FOLDER_TEMPLATE: &str = "%(playlist)s";

/// Releases the single-job slot when the job ends, however it ends
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs one download job at a time against a [`DownloadEngine`].
pub struct DownloadOrchestrator {
    engine: Arc<dyn DownloadEngine>,
    ui: Arc<dyn UiContext>,
    retry: RetryPolicy,
    layout: LayoutConfig,
    busy: Arc<AtomicBool>,
    state: Mutex<JobState>,
    job: Mutex<Option<DownloadJob>>,
}

impl DownloadOrchestrator {
    pub fn new(
        engine: Arc<dyn DownloadEngine>,
        ui: Arc<dyn UiContext>,
        retry: RetryPolicy,
        layout: LayoutConfig,
    ) -> Self {
        Self {
            engine,
            ui,
            retry,
            layout,
            busy: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(JobState::Idle),
            job: Mutex::new(None),
        }
    }

    pub fn from_config(
        engine: Arc<dyn DownloadEngine>,
        ui: Arc<dyn UiContext>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            engine,
            ui,
            RetryPolicy::from(&config.retry),
            config.layout.clone(),
        )
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> JobState {
        *lock(&self.state)
    }

    /// Snapshot of the running job; `None` once it has finished
    pub fn current_job(&self) -> Option<DownloadJob> {
        lock(&self.job).clone()
    }

    /// Synchronous preconditions; nothing touches the engine before these pass.
    pub fn validate(&self, request: &DownloadRequest) -> Result<FormatDirective, ValidationError> {
        match &request.target {
            DownloadTarget::Url { url, intent } => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(ValidationError::EmptyUrl);
                }
                let actual = classify(url);
                if actual == UrlClassification::Invalid {
                    return Err(ValidationError::InvalidUrl(url.to_string()));
                }
                if actual != intent.expected() {
                    return Err(ValidationError::IntentMismatch {
                        declared: *intent,
                        actual,
                    });
                }
            }
            DownloadTarget::Members(members) => {
                if members.is_empty() {
                    return Err(ValidationError::EmptySelection);
                }
                if let Some(member) = members.iter().find(|m| m.source_url.trim().is_empty()) {
                    return Err(ValidationError::EmptyMemberUrl(
                        member.metadata.title.clone(),
                    ));
                }
            }
        }

        if request.destination.as_os_str().is_empty() {
            return Err(ValidationError::EmptyDestination);
        }
        if !request.destination.is_dir() {
            return Err(ValidationError::DestinationMissing(
                request.destination.clone(),
            ));
        }

        Ok(FormatSelector::resolve(&request.selection)?)
    }

    /// Validate, claim the slot and run the job to completion.
    pub async fn download(
        &self,
        request: DownloadRequest,
        sinks: JobSinks,
    ) -> Result<DownloadSummary, DownloadError> {
        let directive = self.validate(&request)?;
        let _guard = self.claim()?;
        self.execute(request, directive, sinks).await
    }

    /// Validate and claim synchronously, then run the job on a background task.
    ///
    /// `on_complete` runs exactly once, on the UI context. Errors returned
    /// here (validation, busy) mean no job was started and `on_complete` is
    /// dropped without being called.
    pub fn spawn<F>(
        self: &Arc<Self>,
        request: DownloadRequest,
        sinks: JobSinks,
        on_complete: F,
    ) -> Result<JoinHandle<()>, DownloadError>
    where
        F: FnOnce(Result<DownloadSummary, DownloadError>) + Send + 'static,
    {
        let directive = self.validate(&request)?;
        let guard = self.claim()?;

        let this = Arc::clone(self);
        let worker = tokio::spawn(async move {
            let _guard = guard;
            this.execute(request, directive, sinks).await
        });

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let result = match worker.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "download worker panicked");
                    this.end_job();
                    this.set_state(JobState::Failed);
                    Err(DownloadError::WorkerPanicked)
                }
            };
            this.ui.dispatch(Box::new(move || on_complete(result)));
        }))
    }

    fn claim(&self) -> Result<BusyGuard, DownloadError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| DownloadError::Busy)?;
        Ok(BusyGuard(Arc::clone(&self.busy)))
    }

    async fn execute(
        &self,
        request: DownloadRequest,
        directive: FormatDirective,
        sinks: JobSinks,
    ) -> Result<DownloadSummary, DownloadError> {
        let emitter = ProgressEmitter::new(Arc::clone(&self.ui), sinks);
        let kind = request.selection.kind;

        let result = match request.target {
            DownloadTarget::Url {
                url,
                intent: DownloadIntent::SingleItem,
            } => {
                self.download_single(url.trim(), &request.destination, directive, kind, &emitter)
                    .await
            }
            DownloadTarget::Url {
                url,
                intent: DownloadIntent::Collection,
            } => {
                self.download_collection(url.trim(), &request.destination, directive, kind, &emitter)
                    .await
            }
            DownloadTarget::Members(members) => {
                self.download_members(members, &request.destination, directive, kind, &emitter)
                    .await
            }
        };

        self.end_job();
        match &result {
            Ok(summary) => {
                self.set_state(JobState::Completed);
                info!(
                    succeeded = summary.succeeded,
                    failed = summary.failures.len(),
                    destination = %summary.destination.display(),
                    "download job finished"
                );
                emitter.status("Download complete!");
            }
            Err(e) => {
                self.set_state(JobState::Failed);
                error!(error = %e, "download job failed");
                emitter.status(e.to_string());
            }
        }
        result
    }

    async fn download_single(
        &self,
        url: &str,
        destination: &Path,
        directive: FormatDirective,
        kind: MediaKind,
        emitter: &ProgressEmitter,
    ) -> Result<DownloadSummary, DownloadError> {
        self.begin_job(vec![url.to_string()], destination, &directive, 1);
        info!(url, "downloading single item");

        let request = EngineRequest {
            directive,
            output_template: template_in(destination, TITLE_TEMPLATE),
            playlist: false,
        };
        let reporter = Arc::new(AsyncMutex::new(ProgressReporter::new(kind, 1)));

        self.set_state(JobState::Downloading);
        self.download_with_retry(url, &request, &reporter, emitter)
            .await
            .map_err(exhausted)?;

        Ok(DownloadSummary {
            destination: destination.to_path_buf(),
            total: 1,
            succeeded: 1,
            failures: Vec::new(),
            itemized: false,
        })
    }

    async fn download_collection(
        &self,
        url: &str,
        destination: &Path,
        directive: FormatDirective,
        kind: MediaKind,
        emitter: &ProgressEmitter,
    ) -> Result<DownloadSummary, DownloadError> {
        self.set_state(JobState::FetchingMetadata);
        emitter.status("Fetching playlist information...");
        let total = self.count_members(url).await;

        self.begin_job(vec![url.to_string()], destination, &directive, total);
        info!(url, total, "downloading playlist");

        let file_template = if self.layout.index_prefix {
            INDEXED_TITLE_TEMPLATE
        } else {
            TITLE_TEMPLATE
        };
        let request = EngineRequest {
            directive,
            output_template: template_in(
                &destination.join(COLLECTION_FOLDER_TEMPLATE),
                file_template,
            ),
            playlist: true,
        };
        let reporter = Arc::new(AsyncMutex::new(ProgressReporter::new(kind, total)));

        self.set_state(JobState::Downloading);
        self.download_with_retry(url, &request, &reporter, emitter)
            .await
            .map_err(exhausted)?;

        Ok(DownloadSummary {
            destination: destination.to_path_buf(),
            total,
            succeeded: total,
            failures: Vec::new(),
            itemized: false,
        })
    }

    async fn download_members(
        &self,
        members: Vec<CollectionMember>,
        destination: &Path,
        directive: FormatDirective,
        kind: MediaKind,
        emitter: &ProgressEmitter,
    ) -> Result<DownloadSummary, DownloadError> {
        let folder = destination.join(&self.layout.subset_folder);
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|source| DownloadError::Io {
                path: folder.clone(),
                source,
            })?;

        let total = members.len() as u32;
        let targets = members.iter().map(|m| m.source_url.clone()).collect();
        self.begin_job(targets, destination, &directive, total);
        info!(total, folder = %folder.display(), "downloading selected playlist members");

        let request = EngineRequest {
            directive,
            output_template: template_in(&folder, TITLE_TEMPLATE),
            playlist: false,
        };
        let reporter = Arc::new(AsyncMutex::new(ProgressReporter::new(kind, total)));

        let mut succeeded = 0;
        let mut failures = Vec::new();
        for (i, member) in members.iter().enumerate() {
            let position = i as u32 + 1;
            reporter.lock().await.set_current_item(position);
            self.update_job(|job| {
                job.current_item_index = position;
                job.attempt_count = 0;
            });
            self.set_state(JobState::Downloading);
            emitter.status(format!(
                "Downloading item {} of {}: {}",
                position, total, member.metadata.title
            ));

            match self
                .download_with_retry(&member.source_url, &request, &reporter, emitter)
                .await
            {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(
                        title = %member.metadata.title,
                        attempts = e.attempts,
                        error = %e.last_error,
                        "member download failed"
                    );
                    failures.push(MemberFailure {
                        title: member.metadata.title.clone(),
                        reason: e.last_error.to_string(),
                    });
                }
            }
        }

        Ok(DownloadSummary {
            destination: folder,
            total,
            succeeded,
            failures,
            itemized: true,
        })
    }

    /// Flat listing to size the progress denominator; 1 when unknown
    async fn count_members(&self, url: &str) -> u32 {
        match self.engine.extract(url, ExtractionDepth::Flat).await {
            Ok(ExtractedInfo::Collection(collection)) => (collection.entries.len() as u32).max(1),
            Ok(ExtractedInfo::Item(_)) => 1,
            Err(e) => {
                warn!(url, error = %e, "could not count playlist members, assuming 1");
                1
            }
        }
    }

    async fn download_with_retry(
        &self,
        url: &str,
        request: &EngineRequest,
        reporter: &Arc<AsyncMutex<ProgressReporter>>,
        emitter: &ProgressEmitter,
    ) -> Result<(), RetryExhausted<EngineError>> {
        let max_attempts = self.retry.max_attempts();
        self.retry
            .run(
                |attempt| {
                    self.update_job(|job| job.attempt_count = attempt);
                    self.attempt_once(url, request, Arc::clone(reporter), emitter.clone())
                },
                |next, _| {
                    self.set_state(JobState::Retrying);
                    emitter.status(format!(
                        "Retrying (attempt {} of {})...",
                        next, max_attempts
                    ));
                },
            )
            .await
    }

    /// One full engine invocation with its own progress channel
    async fn attempt_once(
        &self,
        url: &str,
        request: &EngineRequest,
        reporter: Arc<AsyncMutex<ProgressReporter>>,
        emitter: ProgressEmitter,
    ) -> Result<(), EngineError> {
        self.set_state(JobState::Downloading);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let pump = async {
            while let Some(raw) = rx.recv().await {
                let event = reporter.lock().await.normalize(&raw);
                let status = event.status.clone();
                emitter.progress(event);
                emitter.status(status);
            }
        };

        let (result, ()) = tokio::join!(self.engine.download(url, request, tx), pump);
        result
    }

    fn begin_job(
        &self,
        targets: Vec<String>,
        destination: &Path,
        directive: &FormatDirective,
        total: u32,
    ) {
        *lock(&self.job) = Some(DownloadJob {
            targets,
            destination: destination.to_path_buf(),
            directive: directive.clone(),
            attempt_count: 0,
            current_item_index: if total > 1 { 1 } else { 0 },
            total_item_count: total,
        });
    }

    fn update_job<F: FnOnce(&mut DownloadJob)>(&self, f: F) {
        if let Some(job) = lock(&self.job).as_mut() {
            f(job);
        }
    }

    fn end_job(&self) {
        *lock(&self.job) = None;
    }

    fn set_state(&self, state: JobState) {
        *lock(&self.state) = state;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn exhausted(e: RetryExhausted<EngineError>) -> DownloadError {
    DownloadError::Exhausted {
        attempts: e.attempts,
        reason: e.last_error,
    }
}

/// Engine output template inside `dir`
fn template_in(dir: &Path, file_template: &str) -> String {
    let path: PathBuf = dir.join(file_template);
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::{ItemMetadata, MediaSelection, RawProgress};
    use crate::downloader::ui::ChannelUiContext;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NeverCalled;

    #[async_trait]
    impl DownloadEngine for NeverCalled {
        fn name(&self) -> &'static str {
            "never"
        }

        async fn extract(
            &self,
            _url: &str,
            _depth: ExtractionDepth,
        ) -> Result<ExtractedInfo, EngineError> {
            panic!("validation must not reach the engine")
        }

        async fn download(
            &self,
            _url: &str,
            _request: &EngineRequest,
            _progress: mpsc::UnboundedSender<RawProgress>,
        ) -> Result<(), EngineError> {
            panic!("validation must not reach the engine")
        }
    }

    fn orchestrator() -> DownloadOrchestrator {
        let (ui, _ui_loop) = ChannelUiContext::new();
        DownloadOrchestrator::new(
            Arc::new(NeverCalled),
            ui,
            RetryPolicy::new(3, Duration::ZERO),
            LayoutConfig::default(),
        )
    }

    fn url_request(url: &str, intent: DownloadIntent, dest: &Path) -> DownloadRequest {
        DownloadRequest {
            target: DownloadTarget::Url {
                url: url.to_string(),
                intent,
            },
            destination: dest.to_path_buf(),
            selection: MediaSelection::video("1080p"),
        }
    }

    #[test]
    fn test_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator();

        let err = orch
            .validate(&url_request("  ", DownloadIntent::SingleItem, dir.path()))
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyUrl);

        let err = orch
            .validate(&url_request("not a url", DownloadIntent::SingleItem, dir.path()))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl(_)));

        let err = orch
            .validate(&url_request(
                "https://www.youtube.com/playlist?list=PL123",
                DownloadIntent::SingleItem,
                dir.path(),
            ))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::IntentMismatch {
                declared: DownloadIntent::SingleItem,
                actual: UrlClassification::Collection,
            }
        );

        let missing = dir.path().join("missing");
        let err = orch
            .validate(&url_request(
                "https://youtu.be/dQw4w9WgXcQ",
                DownloadIntent::SingleItem,
                &missing,
            ))
            .unwrap_err();
        assert_eq!(err, ValidationError::DestinationMissing(missing));

        let err = orch
            .validate(&url_request(
                "https://youtu.be/dQw4w9WgXcQ",
                DownloadIntent::SingleItem,
                Path::new(""),
            ))
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyDestination);
    }

    #[test]
    fn test_validation_selection() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator();

        let mut request = url_request(
            "https://youtu.be/dQw4w9WgXcQ",
            DownloadIntent::SingleItem,
            dir.path(),
        );
        request.selection = MediaSelection::audio("FLAC");
        assert!(matches!(
            orch.validate(&request),
            Err(ValidationError::Unsupported(_))
        ));

        request.selection = MediaSelection::audio("MP3 (320kbps)");
        let directive = orch.validate(&request).unwrap();
        assert!(directive.is_audio());

        let empty = DownloadRequest {
            target: DownloadTarget::Members(Vec::new()),
            destination: dir.path().to_path_buf(),
            selection: MediaSelection::video("720p"),
        };
        assert_eq!(
            orch.validate(&empty).unwrap_err(),
            ValidationError::EmptySelection
        );

        let members = DownloadRequest {
            target: DownloadTarget::Members(vec![CollectionMember {
                metadata: ItemMetadata::default(),
                source_url: "https://youtu.be/dQw4w9WgXcQ".into(),
                index_in_collection: 1,
            }]),
            destination: dir.path().to_path_buf(),
            selection: MediaSelection::video("720p"),
        };
        assert!(orch.validate(&members).is_ok());
    }

    #[test]
    fn test_member_without_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator();

        let member = |title: &str, url: &str| CollectionMember {
            metadata: ItemMetadata {
                title: title.to_string(),
                ..ItemMetadata::default()
            },
            source_url: url.to_string(),
            index_in_collection: 1,
        };
        let request = DownloadRequest {
            target: DownloadTarget::Members(vec![
                member("Fine", "https://youtu.be/dQw4w9WgXcQ"),
                member("Broken", "  "),
            ]),
            destination: dir.path().to_path_buf(),
            selection: MediaSelection::video("720p"),
        };

        assert_eq!(
            orch.validate(&request).unwrap_err(),
            ValidationError::EmptyMemberUrl("Broken".to_string())
        );
    }

    #[test]
    fn test_busy_slot_is_released_on_drop() {
        let orch = orchestrator();
        let guard = orch.claim().unwrap();
        assert!(orch.is_busy());
        assert!(matches!(orch.claim(), Err(DownloadError::Busy)));

        drop(guard);
        assert!(!orch.is_busy());
        assert!(orch.claim().is_ok());
    }

    #[test]
    fn test_template_in_dir() {
        let template = template_in(Path::new("/downloads"), TITLE_TEMPLATE);
        assert_eq!(template, "/downloads/%(title)s.%(ext)s");

        let template = template_in(
            &Path::new("/downloads").join(COLLECTION_FOLDER_TEMPLATE),
            INDEXED_TITLE_TEMPLATE,
        );
        assert_eq!(
            template,
            "/downloads/%(playlist)s/%(playlist_index)s - %(title)s.%(ext)s"
        );
    }

    #[test]
    fn test_initial_state() {
        let orch = orchestrator();
        assert_eq!(orch.state(), JobState::Idle);
        assert!(!orch.is_busy());
        assert!(orch.current_job().is_none());
    }
}
