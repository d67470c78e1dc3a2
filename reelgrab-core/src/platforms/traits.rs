use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::core::jobs::DownloadJob;
use crate::core::process::ProcessSupervisor;
use crate::errors::AppResult;
use crate::models::media::MediaInfo;
use crate::platforms::ytdlp::{self, ArgPlan, FormatChoice, Quality};
use crate::platforms::PlatformKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Highest video height the site serves, `None` when unbounded or not video.
    pub max_quality: Option<u32>,
    pub supported_formats: &'static [&'static str],
    pub has_audio_only: bool,
    pub has_video_only: bool,
    pub has_live_streams: bool,
    /// Streams arrive split and must be merged by the transcoder.
    pub requires_transcoder: bool,
    pub supports_trimming: bool,
    pub supports_playlists: bool,
}

impl Capabilities {
    pub fn supports_format(&self, format: &str) -> bool {
        let format = format.trim().to_lowercase();
        self.supported_formats.iter().any(|f| *f == format)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_quality: None,
            supported_formats: &["mp4", "webm", "mkv", "m4a", "mp3", "opus"],
            has_audio_only: true,
            has_video_only: true,
            has_live_streams: false,
            requires_transcoder: false,
            supports_trimming: true,
            supports_playlists: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlatformDescriptor {
    pub kind: PlatformKind,
    pub url_patterns: Vec<Regex>,
    pub capabilities: Capabilities,
}

impl PlatformDescriptor {
    /// Patterns are compiled once here. They are literals owned by each
    /// platform module, so a bad one is a programming error.
    pub fn new(kind: PlatformKind, patterns: &[&str], capabilities: Capabilities) -> Self {
        let url_patterns = patterns
            .iter()
            .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("bad {} url pattern {}: {}", kind, p, e)))
            .collect();
        Self {
            kind,
            url_patterns,
            capabilities,
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        let url = url.trim();
        self.url_patterns.iter().any(|re| re.is_match(url))
    }
}

/// What a metadata fetch needs from the caller.
#[derive(Clone)]
pub struct ExtractorContext<'a> {
    pub supervisor: &'a ProcessSupervisor,
    pub extractor: &'a Path,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl<'a> ExtractorContext<'a> {
    pub fn new(supervisor: &'a ProcessSupervisor, extractor: &'a Path) -> Self {
        Self {
            supervisor,
            extractor,
            timeout: None,
            cancel: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    fn descriptor(&self) -> &PlatformDescriptor;

    fn kind(&self) -> PlatformKind {
        self.descriptor().kind
    }

    fn capabilities(&self) -> &Capabilities {
        &self.descriptor().capabilities
    }

    fn is_valid_url(&self, url: &str) -> bool {
        self.descriptor().matches(url)
    }

    fn is_playlist_url(&self, _url: &str) -> bool {
        false
    }

    fn is_live_stream(&self, _url: &str) -> bool {
        false
    }

    /// Flags this site needs on every extractor invocation.
    fn required_flags(&self) -> &'static [&'static str] {
        &[]
    }

    fn format_choice(&self, job: &DownloadJob, has_transcoder: bool) -> FormatChoice {
        let quality = Quality::parse(&job.quality).capped(self.capabilities().max_quality);
        ytdlp::default_format_choice(job.kind, quality, job.format.as_deref(), has_transcoder)
    }

    async fn fetch_info(&self, ctx: &ExtractorContext<'_>, url: &str) -> AppResult<MediaInfo> {
        let playlist = self.capabilities().supports_playlists && self.is_playlist_url(url);
        let info = ytdlp::fetch_info(ctx, url, playlist, self.required_flags()).await?;
        ytdlp::ensure_live_supported(&info, self.descriptor())?;
        Ok(info)
    }

    /// Pure: the same job and transcoder always give the same arguments.
    fn build_download_args(&self, job: &DownloadJob, transcoder: Option<&Path>) -> Vec<String> {
        let plan = ArgPlan {
            capabilities: self.capabilities(),
            format: self.format_choice(job, transcoder.is_some()),
            playlist: self.capabilities().supports_playlists && self.is_playlist_url(job.url()),
            required_flags: self.required_flags(),
        };
        ytdlp::download_args(job, transcoder, &plan)
    }
}
