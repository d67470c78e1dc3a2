use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.)?vimeo\.com/(?:video/)?\d+",
    r"^https?://player\.vimeo\.com/video/\d+",
    r"^https?://(?:www\.)?vimeo\.com/(?:showcase|album)/\d+",
    r"^https?://(?:www\.)?vimeo\.com/channels/[\w-]+(?:/\d+)?",
];

pub struct Vimeo {
    descriptor: PlatformDescriptor,
}

impl Default for Vimeo {
    fn default() -> Self {
        Self::new()
    }
}

impl Vimeo {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::Vimeo,
                PATTERNS,
                Capabilities {
                    max_quality: Some(2160),
                    supported_formats: &["mp4", "mkv", "m4a", "mp3"],
                    has_audio_only: true,
                    has_video_only: true,
                    has_live_streams: false,
                    requires_transcoder: false,
                    supports_trimming: true,
                    supports_playlists: true,
                },
            ),
        }
    }
}

impl Platform for Vimeo {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    fn is_playlist_url(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["showcase", _, ..] | ["album", _, ..] => true,
            // a channel page lists videos, a numeric child is one of them
            ["channels", _] => true,
            _ => false,
        }
    }
}
