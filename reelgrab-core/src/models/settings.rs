use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::sanitize::filter_extra_flags;
use crate::models::media::MediaKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub schema_version: u32,
    pub download: DownloadSettings,
    pub advanced: AdvancedSettings,
    #[serde(default)]
    pub tools: ToolSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    pub default_output_dir: PathBuf,
    pub video_quality: String,
    #[serde(default)]
    pub default_kind: MediaKind,
    #[serde(default)]
    pub organize_by_platform: bool,
    #[serde(default)]
    pub extra_ytdlp_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedSettings {
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: u32,
    #[serde(default = "default_info_fetch_timeout_secs")]
    pub info_fetch_timeout_secs: u64,
    /// `None` lets downloads run for as long as they need.
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    #[serde(default = "default_true")]
    pub fetch_info_before_download: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolSettings {
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

fn default_max_concurrent_downloads() -> u32 {
    3
}

fn default_info_fetch_timeout_secs() -> u64 {
    60
}

fn default_kill_grace_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            download: DownloadSettings {
                default_output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
                video_quality: "best".into(),
                default_kind: MediaKind::VideoAudio,
                organize_by_platform: false,
                extra_ytdlp_flags: Vec::new(),
            },
            advanced: AdvancedSettings {
                max_concurrent_downloads: default_max_concurrent_downloads(),
                info_fetch_timeout_secs: default_info_fetch_timeout_secs(),
                download_timeout_secs: None,
                kill_grace_ms: default_kill_grace_ms(),
                fetch_info_before_download: true,
            },
            tools: ToolSettings::default(),
        }
    }
}

/// Runtime knobs the scheduler reads at every dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    pub info_fetch_timeout: Option<Duration>,
    pub download_timeout: Option<Duration>,
    pub kill_grace: Duration,
    pub fetch_info: bool,
    pub extractor_path: PathBuf,
    pub transcoder_path: Option<PathBuf>,
    pub extra_extractor_args: Vec<String>,
    pub organize_by_platform: bool,
}

impl SchedulerConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Clamps values that would stall the queue and drops extra flags
    /// yt-dlp would misread.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent = self.max_concurrent.max(1);
        self.extra_extractor_args = filter_extra_flags(&self.extra_extractor_args);
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent_downloads() as usize,
            info_fetch_timeout: Some(Duration::from_secs(default_info_fetch_timeout_secs())),
            download_timeout: None,
            kill_grace: Duration::from_millis(default_kill_grace_ms()),
            fetch_info: true,
            extractor_path: PathBuf::from("yt-dlp"),
            transcoder_path: None,
            extra_extractor_args: Vec::new(),
            organize_by_platform: false,
        }
    }
}

impl From<&AppSettings> for SchedulerConfig {
    fn from(settings: &AppSettings) -> Self {
        let info_timeout = match settings.advanced.info_fetch_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            max_concurrent: settings.advanced.max_concurrent_downloads as usize,
            info_fetch_timeout: info_timeout,
            download_timeout: settings
                .advanced
                .download_timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            kill_grace: Duration::from_millis(settings.advanced.kill_grace_ms),
            fetch_info: settings.advanced.fetch_info_before_download,
            extractor_path: settings
                .tools
                .ytdlp_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("yt-dlp")),
            transcoder_path: settings.tools.ffmpeg_path.clone(),
            extra_extractor_args: settings.download.extra_ytdlp_flags.clone(),
            organize_by_platform: settings.download.organize_by_platform,
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extra_flags_are_dropped_from_settings() {
        let mut settings = AppSettings::default();
        settings.download.extra_ytdlp_flags = vec![
            "--sponsorblock-remove".into(),
            "all".into(),
            "--embed-metadata".into(),
        ];
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.extra_extractor_args, vec!["--embed-metadata".to_string()]);
    }

    #[test]
    fn zero_concurrency_is_clamped_to_one() {
        let mut settings = AppSettings::default();
        settings.advanced.max_concurrent_downloads = 0;
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(SchedulerConfig::default().with_max_concurrent(0).max_concurrent, 1);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let json = r#"{
            "schema_version": 1,
            "download": { "default_output_dir": "/tmp/dl", "video_quality": "720p" },
            "advanced": {}
        }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.advanced.max_concurrent_downloads, 3);
        assert_eq!(settings.advanced.info_fetch_timeout_secs, 60);
        assert!(settings.advanced.fetch_info_before_download);
        assert_eq!(settings.advanced.download_timeout_secs, None);
        assert_eq!(settings.download.default_kind, MediaKind::VideoAudio);
        assert!(settings.tools.ytdlp_path.is_none());
    }

    #[test]
    fn zero_timeouts_mean_unbounded() {
        let mut settings = AppSettings::default();
        settings.advanced.info_fetch_timeout_secs = 0;
        settings.advanced.download_timeout_secs = Some(0);
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.info_fetch_timeout, None);
        assert_eq!(config.download_timeout, None);
    }
}
