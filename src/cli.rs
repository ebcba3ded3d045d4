//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use playlist_downloader_lib::downloader::{FormatSelector, MediaKind, MediaSelection};

/// Download videos, whole playlists or hand-picked playlist members with yt-dlp.
#[derive(Parser, Debug)]
#[command(name = "playlist-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file to use instead of the one in the user config dir
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tell whether a URL is a single video, a playlist, or neither
    Classify { url: String },

    /// Show video details or list playlist members
    Info { url: String },

    /// Download one video, or a whole playlist with --playlist
    Download {
        url: String,

        /// The URL is a playlist and every member should be downloaded
        #[arg(long)]
        playlist: bool,

        #[command(flatten)]
        media: MediaArgs,
    },

    /// Download selected members of a playlist by position
    DownloadMembers {
        url: String,

        /// 1-based playlist positions, comma separated (e.g. 1,3,5)
        #[arg(long, value_delimiter = ',', required = true)]
        items: Vec<u32>,

        #[command(flatten)]
        media: MediaArgs,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct MediaArgs {
    /// Extract audio instead of downloading video
    #[arg(short, long)]
    pub audio: bool,

    /// Resolution ("1080p", "2160p (4K)") or audio format ("MP3 (320kbps)", "WAV")
    #[arg(long)]
    pub quality: Option<String>,

    /// Destination directory (defaults to the configured download dir)
    #[arg(short, long)]
    pub dest: Option<PathBuf>,
}

impl MediaArgs {
    pub fn selection(&self) -> MediaSelection {
        let kind = if self.audio {
            MediaKind::AudioOnly
        } else {
            MediaKind::Video
        };
        let label = self
            .quality
            .clone()
            .unwrap_or_else(|| FormatSelector::default_option(kind).to_string());
        MediaSelection {
            kind,
            quality_or_format: label,
        }
    }
}
