use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.)?instagram\.com/(?:[\w.]+/)?(?:p|reel|reels|tv)/[\w-]+",
    r"^https?://(?:www\.)?instagram\.com/stories/[\w.]+/\d+",
];

pub struct Instagram {
    descriptor: PlatformDescriptor,
}

impl Default for Instagram {
    fn default() -> Self {
        Self::new()
    }
}

impl Instagram {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::Instagram,
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

impl Platform for Instagram {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_urls() {
        let p = Instagram::new();
        assert!(p.is_valid_url("https://www.instagram.com/p/CxYz123/"));
        assert!(p.is_valid_url("https://instagram.com/reel/Cabc-_1/"));
        assert!(p.is_valid_url("https://www.instagram.com/someone/reel/Cabc/"));
        assert!(p.is_valid_url("https://www.instagram.com/stories/someone/3141592653/"));
        assert!(!p.is_valid_url("https://www.instagram.com/someone/"));
    }
}
