use crate::core::jobs::DownloadJob;
use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::ytdlp::{self, FormatChoice, Quality};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|m\.)?soundcloud\.com/[\w-]+/(?:sets/)?[\w-]+",
    r"^https?://on\.soundcloud\.com/\w+",
];

pub struct SoundCloud {
    descriptor: PlatformDescriptor,
}

impl Default for SoundCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundCloud {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::SoundCloud,
                PATTERNS,
                Capabilities {
                    max_quality: None,
                    supported_formats: &["mp3", "m4a", "opus"],
                    has_audio_only: true,
                    has_video_only: false,
                    has_live_streams: false,
                    requires_transcoder: false,
                    supports_trimming: true,
                    supports_playlists: true,
                },
            ),
        }
    }
}

impl Platform for SoundCloud {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    fn is_playlist_url(&self, url: &str) -> bool {
        url::Url::parse(url)
            .map(|u| u.path().contains("/sets/"))
            .unwrap_or(false)
    }

    /// Audio only, whatever kind was asked for.
    fn format_choice(&self, job: &DownloadJob, has_transcoder: bool) -> FormatChoice {
        ytdlp::audio_format_choice(Quality::parse(&job.quality), job.format.as_deref(), has_transcoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::DownloadRequest;

    #[test]
    fn recognizes_tracks_and_sets() {
        let p = SoundCloud::new();
        assert!(p.is_valid_url("https://soundcloud.com/artist/track-name"));
        assert!(p.is_valid_url("https://soundcloud.com/artist/sets/album"));
        assert!(p.is_valid_url("https://on.soundcloud.com/AbC12"));
        assert!(!p.is_valid_url("https://soundcloud.com/"));
        assert!(p.is_playlist_url("https://soundcloud.com/artist/sets/album"));
        assert!(!p.is_playlist_url("https://soundcloud.com/artist/track-name"));
    }

    #[test]
    fn video_requests_become_audio() {
        let p = SoundCloud::new();
        let job = DownloadJob::new(
            DownloadRequest::new("https://soundcloud.com/artist/track", "/tmp"),
            PlatformKind::SoundCloud,
        );
        let args = p.build_download_args(&job, Some(std::path::Path::new("ffmpeg")));
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "ba/b");
        assert!(args.contains(&"-x".to_string()));
    }
}
