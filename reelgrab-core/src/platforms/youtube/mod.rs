use crate::core::jobs::DownloadJob;
use crate::models::media::MediaKind;
use crate::platforms::traits::{Capabilities, Platform, PlatformDescriptor};
use crate::platforms::ytdlp::{self, FormatChoice, Quality};
use crate::platforms::PlatformKind;

const PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|m\.|music\.)?youtube\.com/(?:watch\?|shorts/|live/|playlist\?|embed/|@|channel/|c/)",
    r"^https?://youtu\.be/[\w-]+",
    r"^https?://(?:www\.)?youtube-nocookie\.com/embed/[\w-]+",
];

pub struct YouTube {
    descriptor: PlatformDescriptor,
}

impl Default for YouTube {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTube {
    pub fn new() -> Self {
        Self {
            descriptor: PlatformDescriptor::new(
                PlatformKind::YouTube,
                PATTERNS,
                Capabilities {
                    max_quality: Some(4320),
                    supported_formats: &["mp4", "webm", "mkv", "m4a", "mp3", "opus"],
                    has_audio_only: true,
                    has_video_only: true,
                    has_live_streams: true,
                    requires_transcoder: false,
                    supports_trimming: true,
                    supports_playlists: true,
                },
            ),
        }
    }
}

impl Platform for YouTube {
    fn descriptor(&self) -> &PlatformDescriptor {
        &self.descriptor
    }

    fn is_playlist_url(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        parsed.path().starts_with("/playlist") || parsed.query_pairs().any(|(k, _)| k == "list")
    }

    fn is_live_stream(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let path = parsed.path().trim_end_matches('/');
        path.starts_with("/live/") || path.ends_with("/live")
    }

    /// mp4/m4a pairs merge without re-encoding, so they go first.
    fn format_choice(&self, job: &DownloadJob, has_transcoder: bool) -> FormatChoice {
        let quality = Quality::parse(&job.quality).capped(self.capabilities().max_quality);
        let mut choice =
            ytdlp::default_format_choice(job.kind, quality, job.format.as_deref(), has_transcoder);
        if job.kind == MediaKind::VideoAudio && has_transcoder && quality != Quality::Worst {
            let h = match quality {
                Quality::AtMost(h) => format!("[height<={}]", h),
                _ => String::new(),
            };
            choice.selector = format!("bv*{h}[ext=mp4]+ba[ext=m4a]/{}", choice.selector);
        }
        choice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::DownloadRequest;

    #[test]
    fn recognizes_urls() {
        let p = YouTube::new();
        assert!(p.is_valid_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(p.is_valid_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(p.is_valid_url("https://youtube.com/shorts/abc123"));
        assert!(p.is_valid_url("https://music.youtube.com/watch?v=x"));
        assert!(p.is_valid_url("https://www.youtube.com/playlist?list=PL123"));
        assert!(!p.is_valid_url("https://vimeo.com/123"));
        assert!(!p.is_valid_url("https://www.youtube.com/"));
    }

    #[test]
    fn playlist_and_live_detection() {
        let p = YouTube::new();
        assert!(p.is_playlist_url("https://www.youtube.com/playlist?list=PL123"));
        assert!(p.is_playlist_url("https://www.youtube.com/watch?v=x&list=PL123"));
        assert!(!p.is_playlist_url("https://www.youtube.com/watch?v=x"));
        assert!(p.is_live_stream("https://www.youtube.com/live/abc"));
        assert!(p.is_live_stream("https://www.youtube.com/@chan/live"));
        assert!(!p.is_live_stream("https://youtu.be/abc"));
    }

    #[test]
    fn prefers_mp4_pairs_when_merging() {
        let p = YouTube::new();
        let job = DownloadJob::new(
            DownloadRequest::new("https://youtu.be/abc", "/tmp").with_quality("1080p"),
            PlatformKind::YouTube,
        );
        let args = p.build_download_args(&job, Some(std::path::Path::new("/usr/bin/ffmpeg")));
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(
            args[f + 1],
            "bv*[height<=1080][ext=mp4]+ba[ext=m4a]/bv*[height<=1080]+ba/b[height<=1080]/bv*+ba/b"
        );
        assert!(args.contains(&"--no-playlist".to_string()));
    }

    #[test]
    fn playlist_urls_download_the_whole_list() {
        let p = YouTube::new();
        let job = DownloadJob::new(
            DownloadRequest::new("https://www.youtube.com/playlist?list=PL1", "/tmp"),
            PlatformKind::YouTube,
        );
        let args = p.build_download_args(&job, None);
        assert!(args.contains(&"--yes-playlist".to_string()));
        assert!(args.iter().any(|a| a.contains("%(playlist_index)03d")));
    }
}
