use crate::core::jobs::DownloadJob;
use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::ytdlp::{self, FormatChoice, Quality};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|m\.)?tiktok\.com/@[\w.-]+/(?:video|photo)/\d+",
    r"^https?://(?:vm|vt)\.tiktok\.com/\w+",
    r"^https?://(?:www\.)?tiktok\.com/t/\w+",
];

pub struct TikTok {
    descriptor: PlatformDescriptor,
}

impl Default for TikTok {
    fn default() -> Self {
        Self::new()
    }
}

impl TikTok {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::TikTok,
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

impl Platform for TikTok {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    /// Every TikTok rendition already carries audio.
    fn format_choice(&self, job: &DownloadJob, has_transcoder: bool) -> FormatChoice {
        let quality = Quality::parse(&job.quality).capped(self.capabilities().max_quality);
        ytdlp::muxed_format_choice(job.kind, quality, job.format.as_deref(), has_transcoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::DownloadRequest;

    #[test]
    fn recognizes_urls() {
        let p = TikTok::new();
        assert!(p.is_valid_url("https://www.tiktok.com/@some.user/video/7234567890123456789"));
        assert!(p.is_valid_url("https://vm.tiktok.com/ZMabc123/"));
        assert!(!p.is_valid_url("https://www.tiktok.com/@some.user"));
    }

    #[test]
    fn always_picks_a_muxed_stream() {
        let p = TikTok::new();
        let job = DownloadJob::new(
            DownloadRequest::new("https://vm.tiktok.com/ZMabc123/", "/tmp"),
            PlatformKind::TikTok,
        );
        let args = p.build_download_args(&job, Some(std::path::Path::new("ffmpeg")));
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "b[height<=1080]/b");
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }
}
