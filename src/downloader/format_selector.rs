// FormatSelector - maps a UI quality/format choice to engine directives
//
// Audio presets (closed set):
// - "MP3 (128kbps)", "MP3 (320kbps)" -> mp3 at the given bitrate
// - "WAV"                             -> lossless wav
// - "M4A"                             -> m4a container
// Video labels ("2160p (4K)", "1080p", ...) cap the height and always hand
// the engine the same descending resolution preference, then merge to mp4.

use super::errors::UnsupportedSelection;
use super::models::{FormatDirective, MediaKind, MediaSelection, PostProcessingStep};

/// Audio preset: (label, codec, bitrate, extension)
const AUDIO_PRESETS: [(&str, &str, Option<u32>, &str); 4] = [
    ("MP3 (128kbps)", "mp3", Some(128), "mp3"),
    ("MP3 (320kbps)", "mp3", Some(320), "mp3"),
    ("WAV", "wav", None, "wav"),
    ("M4A", "m4a", None, "m4a"),
];

/// Recognized video labels and their maximum height
const VIDEO_RESOLUTIONS: [(&str, u32); 6] = [
    ("2160p (4K)", 2160),
    ("1440p (2K)", 1440),
    ("1080p", 1080),
    ("720p", 720),
    ("480p", 480),
    ("360p", 360),
];

/// Preference order handed to the engine's format sorter
const RESOLUTION_PREFERENCE: [&str; 5] = ["res:2160", "res:1440", "res:1080", "res:720", "fps"];

const VIDEO_CONTAINER: &str = "mp4";

pub struct FormatSelector;

impl FormatSelector {
    /// Resolve a selection into engine directives.
    pub fn resolve(selection: &MediaSelection) -> Result<FormatDirective, UnsupportedSelection> {
        let label = selection.quality_or_format.trim();
        let directive = match selection.kind {
            MediaKind::AudioOnly => Self::resolve_audio(label),
            MediaKind::Video => Self::resolve_video(label),
        };
        directive.ok_or_else(|| UnsupportedSelection(selection.quality_or_format.clone()))
    }

    /// Labels offered to the user for a media kind, best first
    pub fn options(kind: MediaKind) -> Vec<&'static str> {
        match kind {
            MediaKind::AudioOnly => AUDIO_PRESETS.iter().map(|p| p.0).collect(),
            MediaKind::Video => VIDEO_RESOLUTIONS.iter().map(|r| r.0).collect(),
        }
    }

    /// Default label for a media kind
    pub fn default_option(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::AudioOnly => "MP3 (128kbps)",
            MediaKind::Video => "1080p",
        }
    }

    fn resolve_audio(label: &str) -> Option<FormatDirective> {
        let (_, codec, bitrate, ext) = AUDIO_PRESETS
            .iter()
            .find(|(name, ..)| *name == label)?;

        Some(FormatDirective {
            format_expression: "bestaudio/best".to_string(),
            format_sort: Vec::new(),
            output_extension: ext.to_string(),
            post_processing: vec![PostProcessingStep::ExtractAudio {
                codec: codec.to_string(),
                bitrate_kbps: *bitrate,
            }],
        })
    }

    fn resolve_video(label: &str) -> Option<FormatDirective> {
        let height = Self::max_height(label)?;

        Some(FormatDirective {
            format_expression: format!("bestvideo[height<={}]+bestaudio/best", height),
            format_sort: RESOLUTION_PREFERENCE.iter().map(|s| s.to_string()).collect(),
            output_extension: VIDEO_CONTAINER.to_string(),
            post_processing: vec![PostProcessingStep::MergeInto {
                container: VIDEO_CONTAINER.to_string(),
            }],
        })
    }

    /// "2160p (4K)" and its bare "2160p" form both map to 2160; nothing else does
    fn max_height(label: &str) -> Option<u32> {
        VIDEO_RESOLUTIONS
            .iter()
            .find(|(name, _)| *name == label || name.split(' ').next() == Some(label))
            .map(|(_, h)| *h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp3_320() {
        let directive = FormatSelector::resolve(&MediaSelection::audio("MP3 (320kbps)")).unwrap();

        assert_eq!(directive.format_expression, "bestaudio/best");
        assert_eq!(directive.output_extension, "mp3");
        assert_eq!(
            directive.post_processing,
            vec![PostProcessingStep::ExtractAudio {
                codec: "mp3".to_string(),
                bitrate_kbps: Some(320),
            }]
        );
        assert!(directive.is_audio());
    }

    #[test]
    fn test_lossless_has_no_bitrate() {
        let directive = FormatSelector::resolve(&MediaSelection::audio("WAV")).unwrap();
        assert_eq!(directive.output_extension, "wav");
        assert_eq!(
            directive.post_processing,
            vec![PostProcessingStep::ExtractAudio {
                codec: "wav".to_string(),
                bitrate_kbps: None,
            }]
        );
    }

    #[test]
    fn test_video_4k() {
        let directive = FormatSelector::resolve(&MediaSelection::video("2160p (4K)")).unwrap();

        assert_eq!(directive.format_expression, "bestvideo[height<=2160]+bestaudio/best");
        assert_eq!(
            directive.format_sort,
            vec!["res:2160", "res:1440", "res:1080", "res:720", "fps"]
        );
        assert_eq!(directive.output_extension, "mp4");
        assert!(!directive.is_audio());
    }

    #[test]
    fn test_short_video_label() {
        let a = FormatSelector::resolve(&MediaSelection::video("1440p")).unwrap();
        let b = FormatSelector::resolve(&MediaSelection::video("1440p (2K)")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_preference_order_is_fixed() {
        let high = FormatSelector::resolve(&MediaSelection::video("1080p")).unwrap();
        let low = FormatSelector::resolve(&MediaSelection::video("360p")).unwrap();
        assert_eq!(high.format_sort, low.format_sort);
    }

    #[test]
    fn test_resolve_is_pure() {
        for kind in [MediaKind::Video, MediaKind::AudioOnly] {
            for label in FormatSelector::options(kind) {
                let selection = MediaSelection {
                    kind,
                    quality_or_format: label.to_string(),
                };
                assert_eq!(
                    FormatSelector::resolve(&selection),
                    FormatSelector::resolve(&selection)
                );
            }
        }
    }

    #[test]
    fn test_unsupported_selection() {
        let err = FormatSelector::resolve(&MediaSelection::audio("FLAC")).unwrap_err();
        assert_eq!(err, UnsupportedSelection("FLAC".to_string()));

        // A video label is not an audio preset and vice versa
        assert!(FormatSelector::resolve(&MediaSelection::audio("1080p")).is_err());
        assert!(FormatSelector::resolve(&MediaSelection::video("MP3 (128kbps)")).is_err());
        assert!(FormatSelector::resolve(&MediaSelection::video("")).is_err());
    }

    #[test]
    fn test_near_miss_labels_rejected() {
        for label in ["720p (4K)", "1080p bogus", "360p whatever", "1080P", "2160p (2K)"] {
            assert_eq!(
                FormatSelector::resolve(&MediaSelection::video(label)),
                Err(UnsupportedSelection(label.to_string())),
                "{}",
                label
            );
        }
        for label in ["mp3 (320KBPS)", "wav", "MP3", "MP3 (256kbps)"] {
            assert!(
                FormatSelector::resolve(&MediaSelection::audio(label)).is_err(),
                "{}",
                label
            );
        }
    }

    #[test]
    fn test_defaults_resolve() {
        for kind in [MediaKind::Video, MediaKind::AudioOnly] {
            let selection = MediaSelection {
                kind,
                quality_or_format: FormatSelector::default_option(kind).to_string(),
            };
            assert!(FormatSelector::resolve(&selection).is_ok());
        }
    }
}
