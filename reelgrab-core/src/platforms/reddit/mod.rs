use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|old\.|new\.|m\.)?reddit\.com/r/\w+/(?:comments|s)/\w+",
    r"^https?://(?:www\.)?redd\.it/\w+",
    r"^https?://v\.redd\.it/\w+",
];

pub struct Reddit {
    descriptor: PlatformDescriptor,
}

impl Default for Reddit {
    fn default() -> Self {
        Self::new()
    }
}

impl Reddit {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::Reddit,
                PATTERNS,
                Capabilities {
                    max_quality: Some(1080),
                    supported_formats: &["mp4", "m4a", "mp3"],
                    has_audio_only: true,
                    has_video_only: true,
                    has_live_streams: false,
                    requires_transcoder: false,
                    supports_trimming: true,
                    supports_playlists: false,
                },
            ),
        }
    }
}

impl Platform for Reddit {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_urls() {
        let p = Reddit::new();
        assert!(p.is_valid_url("https://www.reddit.com/r/videos/comments/abc123/some_title/"));
        assert!(p.is_valid_url("https://old.reddit.com/r/videos/comments/abc123/"));
        assert!(p.is_valid_url("https://www.reddit.com/r/videos/s/XyZ987"));
        assert!(p.is_valid_url("https://v.redd.it/abcdef123"));
        assert!(!p.is_valid_url("https://www.reddit.com/r/videos/"));
    }
}
