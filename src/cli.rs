use std::path::PathBuf;

use clap::Parser;
use reelgrab_core::models::settings::AppSettings;
use reelgrab_core::{ClipRange, MediaKind};

#[derive(Parser, Debug)]
#[command(author, version, about = "Queue media downloads from many sites through yt-dlp", long_about = None)]
pub struct Cli {
    /// Links to download
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// video, audio or video+audio
    #[arg(short, long)]
    pub kind: Option<MediaKind>,

    /// best, worst or a height such as 720p
    #[arg(short, long)]
    pub quality: Option<String>,

    /// Container or codec, e.g. mp4 or mp3
    #[arg(short, long)]
    pub format: Option<String>,

    /// Destination folder
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(short = 'j', long)]
    pub max_concurrent: Option<u32>,

    /// Only keep this part, e.g. 1:30-2:00
    #[arg(long, value_name = "START-END")]
    pub clip: Option<ClipRange>,

    /// Skip the metadata lookup before each download
    #[arg(long)]
    pub no_info: bool,

    /// Give up on a download after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Put each download in a folder named after its site
    #[arg(long)]
    pub organize: bool,

    /// Print job events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Store the effective settings as the new defaults
    #[arg(long)]
    pub save_settings: bool,
}

impl Cli {
    /// Flags win over stored settings.
    pub fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(kind) = self.kind {
            settings.download.default_kind = kind;
        }
        if let Some(quality) = &self.quality {
            settings.download.video_quality = quality.clone();
        }
        if let Some(output) = &self.output {
            settings.download.default_output_dir = output.clone();
        }
        if let Some(n) = self.max_concurrent {
            settings.advanced.max_concurrent_downloads = n;
        }
        if self.no_info {
            settings.advanced.fetch_info_before_download = false;
        }
        if let Some(secs) = self.timeout {
            settings.advanced.download_timeout_secs = Some(secs);
        }
        if self.organize {
            settings.download.organize_by_platform = true;
        }
    }
}
