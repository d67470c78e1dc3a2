use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|m\.)?bilibili\.com/video/(?:BV\w+|av\d+)",
    r"^https?://(?:www\.)?bilibili\.com/bangumi/play/(?:ep|ss)\d+",
    r"^https?://b23\.tv/\w+",
];

pub struct Bilibili {
    descriptor: PlatformDescriptor,
}

impl Default for Bilibili {
    fn default() -> Self {
        Self::new()
    }
}

impl Bilibili {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::Bilibili,
                PATTERNS,
                Capabilities {
                    max_quality: Some(2160),
                    supported_formats: &["mp4", "mkv", "flv", "m4a", "mp3"],
                    has_audio_only: true,
                    has_video_only: true,
                    has_live_streams: false,
                    requires_transcoder: true,
                    supports_trimming: true,
                    supports_playlists: false,
                },
            ),
        }
    }
}

impl Platform for Bilibili {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    /// The CDN certificates regularly fail validation.
    fn required_flags(&self) -> &'static [&'static str] {
        &["--no-check-certificates"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::{DownloadJob, DownloadRequest};

    #[test]
    fn recognizes_urls() {
        let p = Bilibili::new();
        assert!(p.is_valid_url("https://www.bilibili.com/video/BV1xx411c7mD"));
        assert!(p.is_valid_url("https://www.bilibili.com/video/av170001"));
        assert!(p.is_valid_url("https://b23.tv/abc123"));
        assert!(!p.is_valid_url("https://www.bilibili.com/"));
    }

    #[test]
    fn certificate_flag_precedes_url() {
        let p = Bilibili::new();
        let job = DownloadJob::new(
            DownloadRequest::new("https://b23.tv/abc123", "/tmp"),
            PlatformKind::Bilibili,
        );
        let args = p.build_download_args(&job, Some(std::path::Path::new("ffmpeg")));
        let flag = args.iter().position(|a| a == "--no-check-certificates").unwrap();
        let dashes = args.iter().rposition(|a| a == "--").unwrap();
        assert!(flag < dashes);
        assert!(p.capabilities().requires_transcoder);
    }
}
