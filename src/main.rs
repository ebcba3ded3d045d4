//! CLI entry point for the playlist downloader.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::Parser;
use playlist_downloader_lib::downloader::{
    classify, AppConfig, ChannelUiContext, CollectionMetadata, DownloadError, DownloadIntent,
    DownloadOrchestrator, DownloadRequest, DownloadTarget, HttpThumbnailLoader, ItemPreview,
    JobOutcome, JobSinks, MetadataFetcher, PreviewFetcher, ProgressEvent, UrlClassification,
    YtDlpEngine,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command, MediaArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = match &args.config {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        None => AppConfig::load()?,
    };

    match args.command {
        Command::Classify { url } => {
            println!("{}", classify(&url));
            Ok(())
        }
        Command::Info { url } => show_info(&config, &url).await,
        Command::Download {
            url,
            playlist,
            media,
        } => {
            let intent = if playlist {
                DownloadIntent::Collection
            } else {
                DownloadIntent::SingleItem
            };
            let target = DownloadTarget::Url { url, intent };
            run_download(&config, target, &media).await
        }
        Command::DownloadMembers { url, items, media } => {
            let fetcher = metadata_fetcher(&config);
            let collection = fetcher.fetch_collection(&url).await?;
            let members: Vec<_> = collection
                .members
                .into_iter()
                .filter(|m| items.contains(&m.index_in_collection))
                .collect();
            if members.len() < items.len() {
                warn!(
                    requested = items.len(),
                    available = members.len(),
                    "some requested positions are unavailable"
                );
            }
            if members.is_empty() {
                bail!("None of the requested playlist positions are available");
            }
            run_download(&config, DownloadTarget::Members(members), &media).await
        }
    }
}

fn metadata_fetcher(config: &AppConfig) -> MetadataFetcher {
    MetadataFetcher::new(
        Arc::new(YtDlpEngine::new(config.engine.clone())),
        Arc::new(HttpThumbnailLoader::from_config(&config.engine)),
    )
}

async fn show_info(config: &AppConfig, url: &str) -> Result<()> {
    let (ui, mut ui_loop) = ChannelUiContext::new();
    let previews = PreviewFetcher::new(Arc::new(metadata_fetcher(config)), ui);

    match classify(url) {
        UrlClassification::Collection => {
            let (tx, rx) = oneshot::channel();
            previews.request_collection(url, move |result| {
                let _ = tx.send(result);
            });
            let collection = ui_loop
                .run_until(rx)
                .await
                .context("playlist request was dropped")??;
            print_collection(&collection);
        }
        UrlClassification::SingleItem => {
            let (tx, rx) = oneshot::channel();
            previews.request_item(url, move |result| {
                let _ = tx.send(result);
            });
            let preview = ui_loop
                .run_until(rx)
                .await
                .context("preview request was dropped")??;
            print_preview(&preview);
        }
        UrlClassification::Invalid => {
            bail!("Invalid URL format. Please enter a valid video or playlist URL.")
        }
    }
    Ok(())
}

fn print_preview(preview: &ItemPreview) {
    let meta = &preview.metadata;
    println!("Title:    {}", meta.title);
    println!("Channel:  {}", meta.uploader.as_deref().unwrap_or("Unknown"));
    println!("Duration: {}", meta.duration_label());
    println!("Views:    {}", meta.view_count_label());
    if let Some(date) = meta.upload_date_label() {
        println!("Uploaded: {}", date);
    }
    if let Some(thumb) = &preview.thumbnail {
        println!("Thumbnail: {}x{}", thumb.width, thumb.height);
    }
}

fn print_collection(collection: &CollectionMetadata) {
    println!("Playlist: {}", collection.title);
    if let Some(uploader) = &collection.uploader {
        println!("Channel:  {}", uploader);
    }
    println!("Available videos: {}", collection.members.len());
    for member in &collection.members {
        println!(
            "{:>4}. {} [{}]",
            member.index_in_collection,
            member.metadata.title,
            member.metadata.duration_label()
        );
    }
}

async fn run_download(config: &AppConfig, target: DownloadTarget, media: &MediaArgs) -> Result<()> {
    let destination: PathBuf = media
        .dest
        .clone()
        .unwrap_or_else(|| config.default_destination.clone());
    let request = DownloadRequest {
        target,
        destination,
        selection: media.selection(),
    };

    let (ui, mut ui_loop) = ChannelUiContext::new();
    let engine = Arc::new(YtDlpEngine::new(config.engine.clone()));
    let orchestrator = Arc::new(DownloadOrchestrator::from_config(engine, ui, config));

    // Both sinks run on this task (via the UI loop); the fraction is kept for
    // the status line
    let fraction = Arc::new(Mutex::new(0.0f32));
    let sinks = {
        let progress_fraction = Arc::clone(&fraction);
        JobSinks::new(
            move |event: ProgressEvent| {
                if let Ok(mut f) = progress_fraction.lock() {
                    *f = event.fraction_complete;
                }
            },
            move |status: String| {
                let pct = fraction.lock().map(|f| *f * 100.0).unwrap_or(0.0);
                let mut err = std::io::stderr();
                let _ = write!(err, "\r\x1b[2K[{:>5.1}%] {}", pct, status);
                let _ = err.flush();
            },
        )
    };

    let (tx, rx) = oneshot::channel();
    orchestrator.spawn(request, sinks, move |result| {
        let _ = tx.send(result);
    })?;

    let result = ui_loop
        .run_until(rx)
        .await
        .context("download job ended without a result")?;
    eprintln!();

    match result {
        Ok(summary) => {
            println!("{}", summary.message());
            if summary.outcome() == JobOutcome::PartialCollectionFailure {
                warn!(failed = summary.failures.len(), "some playlist members failed");
            } else {
                info!("Download complete");
            }
            Ok(())
        }
        Err(e) => {
            if let DownloadError::Exhausted { reason, .. } = &e {
                if let Some(hint) = reason.hint() {
                    eprintln!("Hint: {}", hint);
                }
            }
            Err(e.into())
        }
    }
}
