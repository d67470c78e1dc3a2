//! Command construction and metadata parsing shared by every yt-dlp backed site.

use std::path::Path;

use serde_json::Value;

use crate::core::filename::sanitize_title;
use crate::core::jobs::DownloadJob;
use crate::core::process::{ProcessOutcome, RunRequest, SpawnRequest};
use crate::core::progress::PROGRESS_PREFIX;
use crate::errors::{truncate_stderr, AppError, AppResult, ErrorKind};
use crate::models::media::{
    ClipRange, FormatInfo, MediaInfo, MediaKind, PlaylistEntry, PlaylistInfo, VideoInfo,
};
use crate::platforms::traits::{Capabilities, ExtractorContext, PlatformDescriptor};

const VIDEO_CONTAINERS: &[&str] = &["mp4", "mkv", "webm", "mov", "flv"];
const AUDIO_CODECS: &[&str] = &["mp3", "m4a", "opus", "aac", "flac", "wav", "vorbis"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Best,
    Worst,
    /// Ceiling on the video height.
    AtMost(u32),
}

impl Quality {
    /// Free-form descriptors: `best`, `worst`, `1080p`, `720`, `4k`, ...
    /// Anything unreadable means best.
    pub fn parse(s: &str) -> Self {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "" | "best" | "highest" | "max" => return Quality::Best,
            "worst" | "lowest" | "min" => return Quality::Worst,
            "8k" => return Quality::AtMost(4320),
            "4k" | "uhd" => return Quality::AtMost(2160),
            "2k" | "qhd" => return Quality::AtMost(1440),
            "fhd" | "full hd" => return Quality::AtMost(1080),
            "hd" => return Quality::AtMost(720),
            "sd" => return Quality::AtMost(480),
            _ => {}
        }
        match s.trim_end_matches('p').parse::<u32>() {
            Ok(h) if h > 0 => Quality::AtMost(h),
            _ => {
                tracing::debug!("unrecognized quality '{}', using best", s);
                Quality::Best
            }
        }
    }

    pub fn capped(self, max: Option<u32>) -> Self {
        match (self, max) {
            (Quality::Best, Some(m)) => Quality::AtMost(m),
            (Quality::AtMost(h), Some(m)) => Quality::AtMost(h.min(m)),
            (q, _) => q,
        }
    }

    fn height_filter(self) -> String {
        match self {
            Quality::AtMost(h) => format!("[height<={}]", h),
            _ => String::new(),
        }
    }
}

/// The `-f` expression plus the post-processing it implies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatChoice {
    pub selector: String,
    pub merge_format: Option<String>,
    pub remux_format: Option<String>,
    pub audio_format: Option<String>,
}

/// Joins selector alternatives, dropping repeats.
fn alternatives<S: AsRef<str>>(parts: &[S]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for p in parts {
        let p = p.as_ref();
        if !p.is_empty() && !seen.contains(&p) {
            seen.push(p);
        }
    }
    seen.join("/")
}

fn video_container(format: Option<&str>) -> Option<String> {
    let f = format?.trim().to_lowercase();
    VIDEO_CONTAINERS.contains(&f.as_str()).then_some(f)
}

fn audio_codec(format: Option<&str>) -> String {
    format
        .map(|f| f.trim().to_lowercase())
        .filter(|f| AUDIO_CODECS.contains(&f.as_str()))
        .unwrap_or_else(|| "mp3".to_string())
}

pub fn audio_format_choice(quality: Quality, format: Option<&str>, has_transcoder: bool) -> FormatChoice {
    if has_transcoder {
        let selector = match quality {
            Quality::Worst => "wa/w".to_string(),
            _ => "ba/b".to_string(),
        };
        return FormatChoice {
            selector,
            audio_format: Some(audio_codec(format)),
            ..Default::default()
        };
    }
    let selector = match quality {
        Quality::Worst => "wa/w".to_string(),
        _ => "ba[ext=m4a]/ba/b".to_string(),
    };
    FormatChoice {
        selector,
        ..Default::default()
    }
}

/// Single pre-muxed stream under the ceiling. Used when nothing can merge.
pub fn muxed_format_choice(
    kind: MediaKind,
    quality: Quality,
    format: Option<&str>,
    has_transcoder: bool,
) -> FormatChoice {
    if kind == MediaKind::Audio {
        return audio_format_choice(quality, format, has_transcoder);
    }
    let selector = match quality {
        Quality::Worst => "w".to_string(),
        q => alternatives(&[format!("b{}", q.height_filter()), "b".to_string()]),
    };
    FormatChoice {
        selector,
        remux_format: if has_transcoder { video_container(format) } else { None },
        ..Default::default()
    }
}

pub fn default_format_choice(
    kind: MediaKind,
    quality: Quality,
    format: Option<&str>,
    has_transcoder: bool,
) -> FormatChoice {
    let h = quality.height_filter();
    match kind {
        MediaKind::Audio => audio_format_choice(quality, format, has_transcoder),
        MediaKind::Video => {
            let selector = match quality {
                Quality::Worst => "wv*/w".to_string(),
                _ => alternatives(&[
                    format!("bv*{}", h),
                    format!("b{}", h),
                    "bv*".to_string(),
                    "b".to_string(),
                ]),
            };
            FormatChoice {
                selector,
                remux_format: if has_transcoder { video_container(format) } else { None },
                ..Default::default()
            }
        }
        MediaKind::VideoAudio if has_transcoder => {
            let selector = match quality {
                Quality::Worst => "wv*+wa/w".to_string(),
                _ => alternatives(&[
                    format!("bv*{}+ba", h),
                    format!("b{}", h),
                    "bv*+ba".to_string(),
                    "b".to_string(),
                ]),
            };
            FormatChoice {
                selector,
                merge_format: Some(video_container(format).unwrap_or_else(|| "mp4".to_string())),
                ..Default::default()
            }
        }
        MediaKind::VideoAudio => muxed_format_choice(kind, quality, format, false),
    }
}

pub struct ArgPlan<'a> {
    pub capabilities: &'a Capabilities,
    pub format: FormatChoice,
    pub playlist: bool,
    pub required_flags: &'a [&'a str],
}

fn seconds_arg(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        let s = format!("{:.3}", secs);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn clip_label(clip: &ClipRange) -> String {
    format!("{}-{}", seconds_arg(clip.start_secs), seconds_arg(clip.end_secs))
}

/// Trimming needs both site support and a transcoder to cut with.
fn applied_clip(job: &DownloadJob, plan: &ArgPlan<'_>, transcoder: Option<&Path>) -> Option<ClipRange> {
    let clip = job.clip_range?;
    (plan.capabilities.supports_trimming && transcoder.is_some()).then_some(clip)
}

/// `%` in the destination would be read as a template field.
fn escape_template(s: &str) -> String {
    s.replace('%', "%%")
}

/// A title already known from the metadata step is sanitized here, otherwise
/// yt-dlp fills it in.
pub fn output_template(job: &DownloadJob, playlist: bool, clip: Option<&ClipRange>) -> String {
    let suffix = clip
        .map(|c| format!(" (clip {})", clip_label(c)))
        .unwrap_or_default();
    let known_title = job
        .title
        .as_deref()
        .map(|t| escape_template(&sanitize_title(t)));
    let name = if playlist {
        format!(
            "{}/%(playlist_index)03d - %(title).200B [%(id)s]{}.%(ext)s",
            known_title.as_deref().unwrap_or("%(playlist_title,playlist_id)s"),
            suffix
        )
    } else {
        format!(
            "{} [%(id)s]{}.%(ext)s",
            known_title.as_deref().unwrap_or("%(title).200B"),
            suffix
        )
    };
    let dest = escape_template(&job.destination_folder.to_string_lossy());
    let dest = dest.trim_end_matches(['/', '\\']);
    if dest.is_empty() {
        name
    } else {
        format!("{}{}{}", dest, std::path::MAIN_SEPARATOR, name)
    }
}

pub fn download_args(job: &DownloadJob, transcoder: Option<&Path>, plan: &ArgPlan<'_>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--no-colors".into(),
        "--ignore-config".into(),
        "--progress-template".into(),
        format!("{}%(progress._percent_str)s", PROGRESS_PREFIX),
        "-f".into(),
        plan.format.selector.clone(),
    ];

    if let Some(container) = &plan.format.merge_format {
        args.push("--merge-output-format".into());
        args.push(container.clone());
    }
    if let Some(container) = &plan.format.remux_format {
        args.push("--remux-video".into());
        args.push(container.clone());
    }
    if let Some(codec) = &plan.format.audio_format {
        args.push("-x".into());
        args.push("--audio-format".into());
        args.push(codec.clone());
        args.push("--audio-quality".into());
        args.push("0".into());
    }
    if let Some(path) = transcoder {
        args.push("--ffmpeg-location".into());
        args.push(path.to_string_lossy().into_owned());
    }

    args.push(if plan.playlist { "--yes-playlist" } else { "--no-playlist" }.into());

    let clip = applied_clip(job, plan, transcoder);
    if let Some(clip) = &clip {
        args.push("--download-sections".into());
        args.push(format!("*{}", clip_label(clip)));
        args.push("--force-keyframes-at-cuts".into());
    }

    args.extend(plan.required_flags.iter().map(|f| f.to_string()));

    args.push("-o".into());
    args.push(output_template(job, plan.playlist, clip.as_ref()));
    args.push("--".into());
    args.push(job.url().to_string());
    args
}

/// Inserts user flags ahead of the `-- URL` tail.
pub fn with_extra_args(mut args: Vec<String>, extra: &[String]) -> Vec<String> {
    if extra.is_empty() {
        return args;
    }
    let at = match args.iter().rposition(|a| a == "--") {
        Some(i) => i,
        None => args.len(),
    };
    args.splice(at..at, extra.iter().cloned());
    args
}

pub fn info_args(url: &str, playlist: bool, flags: &[&str]) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--dump-single-json".into(),
        "--no-warnings".into(),
        "--ignore-config".into(),
        if playlist { "--flat-playlist" } else { "--no-playlist" }.into(),
    ];
    args.extend(flags.iter().map(|f| f.to_string()));
    args.push("--".into());
    args.push(url.to_string());
    args
}

pub async fn fetch_info(
    ctx: &ExtractorContext<'_>,
    url: &str,
    playlist: bool,
    flags: &[&str],
) -> AppResult<MediaInfo> {
    let spawn = SpawnRequest::new(ctx.extractor, info_args(url, playlist, flags)).with_url_last();
    let mut request = RunRequest::new("info fetch", spawn);
    request.timeout = ctx.timeout;
    request.cancel = ctx.cancel.clone();
    request.capture_stdout = true;
    request.require_output = true;
    request.failure_kind = Some(ErrorKind::Extraction);

    match ctx.supervisor.run(request, |_| {}).await? {
        ProcessOutcome::Finished(output) => parse_info(&output.stdout),
        ProcessOutcome::Cancelled => Err(AppError::new(ErrorKind::Unknown, "info fetch cancelled")
            .with_context("cancelled", true)
            .retryable(false)),
    }
}

fn malformed(detail: impl std::fmt::Display, raw: &str) -> AppError {
    AppError::new(ErrorKind::Validation, format!("unreadable metadata: {}", detail))
        .with_user_message("The extractor returned metadata that could not be read.")
        .with_context("stdout", truncate_stderr(raw))
}

pub fn parse_info(stdout: &str) -> AppResult<MediaInfo> {
    let value: Value = serde_json::from_str(stdout.trim()).map_err(|e| malformed(e, stdout))?;
    if !value.is_object() {
        return Err(malformed("top-level value is not an object", stdout));
    }
    if value.get("_type").and_then(Value::as_str) == Some("playlist") {
        Ok(MediaInfo::Playlist(parse_playlist(&value)))
    } else {
        Ok(MediaInfo::Video(parse_video(&value)))
    }
}

fn str_field(json: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| json.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn u64_field(json: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| {
        let v = json.get(*k)?;
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    })
}

fn parse_video(json: &Value) -> VideoInfo {
    let formats = parse_formats(json);
    let file_size_bytes = u64_field(json, &["filesize", "filesize_approx"]);
    let is_live = json.get("is_live").and_then(Value::as_bool).unwrap_or(false)
        || json.get("live_status").and_then(Value::as_str) == Some("is_live");

    VideoInfo {
        id: str_field(json, &["id"]).unwrap_or_default(),
        title: str_field(json, &["title", "fulltitle"]).unwrap_or_default(),
        uploader: str_field(json, &["uploader", "channel", "creator"]),
        duration_seconds: json.get("duration").and_then(Value::as_f64),
        thumbnail_url: str_field(json, &["thumbnail"]),
        file_size_bytes,
        webpage_url: str_field(json, &["webpage_url", "original_url"]),
        extractor: str_field(json, &["extractor_key", "extractor"]),
        is_live,
        formats,
    }
}

fn parse_playlist(json: &Value) -> PlaylistInfo {
    let entries = json
        .get("entries")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|e| {
                    let url = str_field(e, &["url", "webpage_url", "original_url"])?;
                    Some(PlaylistEntry {
                        id: str_field(e, &["id"]).unwrap_or_default(),
                        title: str_field(e, &["title"]).unwrap_or_default(),
                        url,
                        duration_seconds: e.get("duration").and_then(Value::as_f64),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    PlaylistInfo {
        id: str_field(json, &["id"]),
        title: str_field(json, &["title"]).unwrap_or_default(),
        uploader: str_field(json, &["uploader", "channel"]),
        entries,
    }
}

pub fn parse_formats(json: &Value) -> Vec<FormatInfo> {
    let formats = match json.get("formats").and_then(|v| v.as_array()) {
        Some(f) => f,
        None => return Vec::new(),
    };

    formats
        .iter()
        .filter_map(|f| {
            let format_id = f.get("format_id").and_then(|v| v.as_str())?.to_string();
            let width = f.get("width").and_then(|v| v.as_u64()).map(|v| v as u32);
            let height = f.get("height").and_then(|v| v.as_u64()).map(|v| v as u32);
            let vcodec = f.get("vcodec").and_then(|v| v.as_str()).map(str::to_string);
            let acodec = f.get("acodec").and_then(|v| v.as_str()).map(str::to_string);
            let resolution = match (width, height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => Some(format!("{}x{}", w, h)),
                _ => f.get("resolution").and_then(|v| v.as_str()).map(str::to_string),
            };

            Some(FormatInfo {
                format_id,
                ext: f.get("ext").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                resolution,
                width,
                height,
                fps: f.get("fps").and_then(|v| v.as_f64()),
                has_video: vcodec.as_deref().map(|v| v != "none").unwrap_or(false),
                has_audio: acodec.as_deref().map(|v| v != "none").unwrap_or(false),
                vcodec,
                acodec,
                filesize: u64_field(f, &["filesize", "filesize_approx"]),
                tbr: f.get("tbr").and_then(|v| v.as_f64()),
                format_note: f.get("format_note").and_then(|v| v.as_str()).map(str::to_string),
            })
        })
        .collect()
}

pub fn ensure_live_supported(info: &MediaInfo, descriptor: &PlatformDescriptor) -> AppResult<()> {
    let live = matches!(info, MediaInfo::Video(v) if v.is_live);
    if live && !descriptor.capabilities.has_live_streams {
        return Err(AppError::new(
            ErrorKind::Platform,
            format!("{} live streams are not supported", descriptor.kind),
        )
        .with_user_message("Live streams cannot be downloaded from this site.")
        .with_context("platform", descriptor.kind));
    }
    Ok(())
}
