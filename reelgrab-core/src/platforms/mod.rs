use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub mod bilibili;
pub mod generic;
pub mod instagram;
pub mod reddit;
pub mod soundcloud;
pub mod tiktok;
pub mod traits;
pub mod twitch;
pub mod twitter;
pub mod vimeo;
pub mod youtube;
pub mod ytdlp;

pub use traits::{Capabilities, ExtractorContext, Platform, PlatformDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    YouTube,
    Vimeo,
    TikTok,
    Instagram,
    Twitter,
    Twitch,
    Reddit,
    Bilibili,
    SoundCloud,
    Generic,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 10] = [
        PlatformKind::YouTube,
        PlatformKind::Vimeo,
        PlatformKind::TikTok,
        PlatformKind::Instagram,
        PlatformKind::Twitter,
        PlatformKind::Twitch,
        PlatformKind::Reddit,
        PlatformKind::Bilibili,
        PlatformKind::SoundCloud,
        PlatformKind::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::YouTube => "youtube",
            PlatformKind::Vimeo => "vimeo",
            PlatformKind::TikTok => "tiktok",
            PlatformKind::Instagram => "instagram",
            PlatformKind::Twitter => "twitter",
            PlatformKind::Twitch => "twitch",
            PlatformKind::Reddit => "reddit",
            PlatformKind::Bilibili => "bilibili",
            PlatformKind::SoundCloud => "soundcloud",
            PlatformKind::Generic => "generic",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "x" => return Ok(PlatformKind::Twitter),
            "yt" => return Ok(PlatformKind::YouTube),
            _ => {}
        }
        PlatformKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| AppError::validation(format!("unknown platform '{}'", s)))
    }
}
