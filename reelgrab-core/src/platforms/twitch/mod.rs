use crate::core::jobs::DownloadJob;
use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::ytdlp::{self, FormatChoice, Quality};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|m\.)?twitch\.tv/videos/\d+",
    r"^https?://clips\.twitch\.tv/[\w-]+",
    r"^https?://(?:www\.|m\.)?twitch\.tv/\w+/clip/[\w-]+",
    r"^https?://(?:www\.|m\.)?twitch\.tv/\w{3,25}/?(?:\?.*)?$",
];

/// Path segments that are site pages rather than channel names.
const RESERVED: &[&str] = &["videos", "directory", "downloads", "settings", "search", "p"];

pub struct Twitch {
    descriptor: PlatformDescriptor,
}

impl Default for Twitch {
    fn default() -> Self {
        Self::new()
    }
}

impl Twitch {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::Twitch,
                PATTERNS,
                Capabilities {
                    max_quality: Some(1080),
                    supported_formats: &["mp4", "mkv", "m4a", "mp3"],
                    has_audio_only: true,
                    has_video_only: false,
                    has_live_streams: true,
                    requires_transcoder: false,
                    supports_trimming: true,
                    supports_playlists: false,
                },
            ),
        }
    }
}

impl Platform for Twitch {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    /// A bare channel URL points at whatever is live right now.
    fn is_live_stream(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        if parsed.host_str().map(|h| h.starts_with("clips.")).unwrap_or(false) {
            return false;
        }
        let segments: Vec<&str> = parsed.path().split('/').filter(|s| !s.is_empty()).collect();
        matches!(segments.as_slice(), [channel] if !RESERVED.contains(&channel.to_lowercase().as_str()))
    }

    fn format_choice(&self, job: &DownloadJob, has_transcoder: bool) -> FormatChoice {
        let quality = Quality::parse(&job.quality).capped(self.capabilities().max_quality);
        ytdlp::muxed_format_choice(job.kind, quality, job.format.as_deref(), has_transcoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_vods_clips_and_channels() {
        let p = Twitch::new();
        assert!(p.is_valid_url("https://www.twitch.tv/videos/1234567"));
        assert!(p.is_valid_url("https://clips.twitch.tv/FunnyClipName-abc"));
        assert!(p.is_valid_url("https://www.twitch.tv/somechannel/clip/FunnyClip"));
        assert!(p.is_valid_url("https://www.twitch.tv/somechannel"));
        assert!(!p.is_valid_url("https://www.twitch.tv/"));
    }

    #[test]
    fn channel_pages_are_live() {
        let p = Twitch::new();
        assert!(p.is_live_stream("https://www.twitch.tv/somechannel"));
        assert!(!p.is_live_stream("https://www.twitch.tv/videos/1234567"));
        assert!(!p.is_live_stream("https://clips.twitch.tv/FunnyClipName"));
        assert!(!p.is_live_stream("https://www.twitch.tv/directory"));
    }
}
