use crate::core::jobs::DownloadJob;
use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::ytdlp::{self, FormatChoice, Quality};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/\w+/status/\d+",
    r"^https?://(?:www\.)?(?:twitter|x)\.com/i/(?:web/status|status)/\d+",
];

pub struct Twitter {
    descriptor: PlatformDescriptor,
}

impl Default for Twitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Twitter {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::Twitter,
                PATTERNS,
                Capabilities {
                    max_quality: Some(1080),
                    supported_formats: &["mp4", "m4a", "mp3"],
                    has_audio_only: true,
                    has_video_only: false,
                    has_live_streams: false,
                    requires_transcoder: false,
                    supports_trimming: true,
                    supports_playlists: false,
                },
            ),
        }
    }
}

impl Platform for Twitter {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    /// Variants are served pre-muxed.
    fn format_choice(&self, job: &DownloadJob, has_transcoder: bool) -> FormatChoice {
        let quality = Quality::parse(&job.quality).capped(self.capabilities().max_quality);
        ytdlp::muxed_format_choice(job.kind, quality, job.format.as_deref(), has_transcoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_both_domains() {
        let p = Twitter::new();
        assert!(p.is_valid_url("https://twitter.com/someone/status/1234567890"));
        assert!(p.is_valid_url("https://x.com/someone/status/1234567890?s=20"));
        assert!(p.is_valid_url("https://x.com/i/web/status/1234567890"));
        assert!(!p.is_valid_url("https://x.com/someone"));
    }
}
