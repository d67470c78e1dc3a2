use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// What the user wants out of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    #[default]
    VideoAudio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::VideoAudio => "video+audio",
        };
        f.write_str(s)
    }
}

impl FromStr for MediaKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" | "mute" | "video-only" => Ok(MediaKind::Video),
            "audio" | "audio-only" => Ok(MediaKind::Audio),
            "video+audio" | "video_audio" | "both" | "auto" => Ok(MediaKind::VideoAudio),
            other => Err(AppError::validation(format!("unknown media kind '{}'", other))
                .with_user_message("Choose video, audio or video+audio.")),
        }
    }
}

/// Trim window in seconds, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl ClipRange {
    pub fn new(start_secs: f64, end_secs: f64) -> Result<Self, AppError> {
        let range = Self {
            start_secs,
            end_secs,
        };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let finite = self.start_secs.is_finite() && self.end_secs.is_finite();
        if !finite || self.start_secs < 0.0 || self.end_secs <= self.start_secs {
            return Err(AppError::validation(format!(
                "invalid clip range {}-{}",
                self.start_secs, self.end_secs
            ))
            .with_user_message("The clip end must come after its start."));
        }
        Ok(())
    }
}

impl FromStr for ClipRange {
    type Err = AppError;

    /// Accepts `START-END` where each side is seconds or `[H:]M:SS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| AppError::validation(format!("clip range '{}' must be START-END", s)))?;
        let start = parse_timestamp(a)
            .ok_or_else(|| AppError::validation(format!("bad clip start '{}'", a)))?;
        let end = parse_timestamp(b)
            .ok_or_else(|| AppError::validation(format!("bad clip end '{}'", b)))?;
        ClipRange::new(start, end)
    }
}

fn parse_timestamp(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut total = 0.0;
    for part in s.split(':') {
        let v: f64 = part.parse().ok()?;
        if v < 0.0 {
            return None;
        }
        total = total * 60.0 + v;
    }
    Some(total)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatInfo {
    pub format_id: String,
    pub ext: String,
    pub resolution: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub tbr: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
    pub format_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub duration_seconds: Option<f64>,
    pub thumbnail_url: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub webpage_url: Option<String>,
    pub extractor: Option<String>,
    pub is_live: bool,
    pub formats: Vec<FormatInfo>,
}

impl VideoInfo {
    /// Distinct video heights, highest first.
    pub fn available_heights(&self) -> Vec<u32> {
        let mut heights: Vec<u32> = self
            .formats
            .iter()
            .filter(|f| f.has_video)
            .filter_map(|f| f.height)
            .filter(|h| *h > 0)
            .collect();
        heights.sort_unstable_by(|a, b| b.cmp(a));
        heights.dedup();
        heights
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistInfo {
    pub id: Option<String>,
    pub title: String,
    pub uploader: Option<String>,
    pub entries: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MediaInfo {
    Video(VideoInfo),
    Playlist(PlaylistInfo),
}

impl MediaInfo {
    pub fn title(&self) -> &str {
        match self {
            MediaInfo::Video(v) => &v.title,
            MediaInfo::Playlist(p) => &p.title,
        }
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        match self {
            MediaInfo::Video(v) => v.thumbnail_url.as_deref(),
            MediaInfo::Playlist(_) => None,
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match self {
            MediaInfo::Video(v) => v.duration_seconds,
            MediaInfo::Playlist(p) => {
                let known: Vec<f64> = p.entries.iter().filter_map(|e| e.duration_seconds).collect();
                if known.is_empty() {
                    None
                } else {
                    Some(known.iter().sum())
                }
            }
        }
    }

    pub fn file_size_bytes(&self) -> Option<u64> {
        match self {
            MediaInfo::Video(v) => v.file_size_bytes,
            MediaInfo::Playlist(_) => None,
        }
    }

    pub fn uploader(&self) -> Option<&str> {
        match self {
            MediaInfo::Video(v) => v.uploader.as_deref(),
            MediaInfo::Playlist(p) => p.uploader.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_parses_aliases() {
        assert_eq!("audio".parse::<MediaKind>().unwrap(), MediaKind::Audio);
        assert_eq!("Video+Audio".parse::<MediaKind>().unwrap(), MediaKind::VideoAudio);
        assert_eq!("mute".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!("hologram".parse::<MediaKind>().is_err());
    }

    #[test]
    fn clip_range_accepts_seconds_and_clock() {
        let r: ClipRange = "10-1:30".parse().unwrap();
        assert_eq!(r.start_secs, 10.0);
        assert_eq!(r.end_secs, 90.0);

        let r: ClipRange = "1:00:00-1:00:05.5".parse().unwrap();
        assert_eq!(r.start_secs, 3600.0);
        assert_eq!(r.end_secs, 3605.5);
    }

    #[test]
    fn clip_range_rejects_inverted_window() {
        assert!("30-10".parse::<ClipRange>().is_err());
        assert!(ClipRange::new(5.0, 5.0).is_err());
        assert!(ClipRange::new(f64::NAN, 5.0).is_err());
    }

    #[test]
    fn playlist_duration_sums_known_entries() {
        let info = MediaInfo::Playlist(PlaylistInfo {
            id: None,
            title: "mix".into(),
            uploader: None,
            entries: vec![
                PlaylistEntry {
                    id: "a".into(),
                    title: "a".into(),
                    url: "u".into(),
                    duration_seconds: Some(60.0),
                },
                PlaylistEntry {
                    id: "b".into(),
                    title: "b".into(),
                    url: "u".into(),
                    duration_seconds: None,
                },
            ],
        });
        assert_eq!(info.duration_seconds(), Some(60.0));
    }
}
