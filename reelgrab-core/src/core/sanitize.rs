//! Command allow-list and argument sanitation applied before every spawn.

use std::path::Path;

use crate::errors::{AppError, ErrorKind};

/// Base names (lowercase, no extension) of the only programs we ever run.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "yt-dlp",
    "youtube-dl",
    "ffmpeg",
    "ffprobe",
    "which",
    "where",
];

/// Option tokens the argument builders are allowed to emit. Anything else
/// starting with `-` is treated as data that could be misread as an option.
const KNOWN_FLAGS: &[&str] = &[
    // end of options
    "--",
    // yt-dlp
    "-f",
    "-o",
    "-x",
    "-J",
    "-N",
    "--version",
    "--newline",
    "--no-playlist",
    "--yes-playlist",
    "--flat-playlist",
    "--dump-json",
    "--dump-single-json",
    "--no-warnings",
    "--no-progress",
    "--no-colors",
    "--ignore-config",
    "--merge-output-format",
    "--remux-video",
    "--progress-template",
    "--print",
    "--no-check-certificates",
    "--extract-audio",
    "--audio-format",
    "--audio-quality",
    "--ffmpeg-location",
    "--download-sections",
    "--force-keyframes-at-cuts",
    "--concurrent-fragments",
    "--embed-metadata",
    "--embed-thumbnail",
    "--embed-subs",
    "--write-subs",
    "--sub-langs",
    "--referer",
    "--add-header",
    "--retries",
    "--fragment-retries",
    "--socket-timeout",
    "--limit-rate",
    "--restrict-filenames",
    "--windows-filenames",
    "--no-part",
    "--no-mtime",
    "--live-from-start",
    "--wait-for-video",
    "--cookies",
    "--cookies-from-browser",
    "--proxy",
    "--format-sort",
    "-S",
    // ffmpeg / ffprobe
    "-version",
    "-hide_banner",
    "-loglevel",
    "-v",
    "-y",
    "-i",
    "-c",
    "-ss",
    "-to",
    "-t",
    "-map",
    "-progress",
    "-nostats",
    "-print_format",
    "-of",
    "-show_format",
    "-show_streams",
    "-show_entries",
];

/// Lowercased file stem of `command`, e.g. `C:\bin\YT-DLP.exe` → `yt-dlp`.
pub fn command_base_name(command: &Path) -> String {
    let file_name = command
        .to_string_lossy()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string();
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
        _ => file_name,
    };
    stem.to_lowercase()
}

pub fn is_allowed_command(command: &Path) -> bool {
    let base = command_base_name(command);
    ALLOWED_COMMANDS.contains(&base.as_str())
}

/// Fails with a non-retryable validation error for anything off the list.
pub fn ensure_allowed(command: &Path) -> Result<(), AppError> {
    if is_allowed_command(command) {
        return Ok(());
    }
    Err(AppError::new(
        ErrorKind::Validation,
        format!(
            "command '{}' is not in the allow-list",
            command.display()
        ),
    )
    .with_user_message("Refusing to run an unexpected program.")
    .with_context("command", command.display())
    .with_context("base_name", command_base_name(command))
    .retryable(false))
}

pub fn is_known_flag(token: &str) -> bool {
    let name = match token.split_once('=') {
        Some((name, _)) if name.starts_with("--") => name,
        _ => token,
    };
    KNOWN_FLAGS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alteration {
    DroppedEmpty { index: usize },
    StrippedNul { index: usize },
    NeutralizedDash { index: usize, original: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedArgs {
    pub args: Vec<String>,
    pub alterations: Vec<Alteration>,
}

impl SanitizedArgs {
    pub fn is_clean(&self) -> bool {
        self.alterations.is_empty()
    }
}

/// Rewrites `args` so no token is empty, carries a NUL byte, or looks like an
/// unknown option. When `url_last` is set the final token is the designated
/// URL and is exempt from the option check.
///
/// Offending tokens are repaired in place rather than rejected: empty tokens
/// are dropped, NULs removed, and leading dashes of unknown options replaced
/// with `_`.
pub fn sanitize_args(args: &[String], url_last: bool) -> SanitizedArgs {
    let mut out = Vec::with_capacity(args.len());
    let mut alterations = Vec::new();
    let url_index = if url_last { args.len().checked_sub(1) } else { None };

    for (index, raw) in args.iter().enumerate() {
        let mut token = raw.clone();

        if token.contains('\0') {
            token = token.replace('\0', "");
            alterations.push(Alteration::StrippedNul { index });
        }

        if token.is_empty() {
            alterations.push(Alteration::DroppedEmpty { index });
            continue;
        }

        if Some(index) != url_index && token.starts_with('-') && !is_known_flag(&token) {
            let rest = token.trim_start_matches('-');
            let dashes = token.len() - rest.len();
            let neutralized = format!("{}{}", "_".repeat(dashes), rest);
            alterations.push(Alteration::NeutralizedDash {
                index,
                original: token.clone(),
            });
            token = neutralized;
        }

        out.push(token);
    }

    for alteration in &alterations {
        tracing::warn!("argument sanitized before spawn: {:?}", alteration);
    }

    SanitizedArgs {
        args: out,
        alterations,
    }
}

/// Keeps only user-configured extractor flags we recognize. An unknown flag
/// is dropped together with the bare value that follows it, and so is a
/// stray `--` or a bare token with no flag in front of it.
pub fn filter_extra_flags(flags: &[String]) -> Vec<String> {
    let mut kept = Vec::with_capacity(flags.len());
    let mut after_known_flag = false;
    let mut after_unknown_flag = false;

    for raw in flags {
        let token = raw.trim();
        if token.is_empty() || token.contains('\0') {
            tracing::warn!("dropping unusable extra flag {:?}", raw);
            continue;
        }
        if token.starts_with('-') {
            if token != "--" && is_known_flag(token) {
                kept.push(token.to_string());
                after_known_flag = true;
                after_unknown_flag = false;
            } else {
                tracing::warn!("dropping unsupported extra flag {}", token);
                after_known_flag = false;
                after_unknown_flag = true;
            }
            continue;
        }
        if after_known_flag {
            kept.push(token.to_string());
        } else if after_unknown_flag {
            tracing::warn!("dropping value {} of an unsupported extra flag", token);
        } else {
            tracing::warn!("dropping extra argument {} with no flag", token);
        }
        after_known_flag = false;
        after_unknown_flag = false;
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn base_name_strips_path_extension_and_case() {
        assert_eq!(command_base_name(Path::new("/usr/local/bin/yt-dlp")), "yt-dlp");
        assert_eq!(command_base_name(Path::new(r"C:\Tools\FFmpeg.EXE")), "ffmpeg");
        assert_eq!(command_base_name(Path::new("which")), "which");
    }

    #[test]
    fn allow_list_accepts_known_tools() {
        for cmd in ["yt-dlp", "/opt/bin/ffprobe", "ffmpeg.exe", "where.exe", "YT-DLP"] {
            assert!(is_allowed_command(&PathBuf::from(cmd)), "{} should pass", cmd);
        }
    }

    #[test]
    fn allow_list_rejects_everything_else() {
        for cmd in ["sh", "/bin/bash", "untrusted-binary", "yt-dlp-evil", "cmd.exe", ""] {
            let err = ensure_allowed(&PathBuf::from(cmd)).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);
            assert!(!err.retryable);
        }
    }

    #[test]
    fn clean_args_pass_through_untouched() {
        let args = strings(&["-f", "bv*+ba/b", "--newline", "-o", "/tmp/%(title)s.%(ext)s", "--", "https://a.b/c"]);
        let out = sanitize_args(&args, true);
        assert!(out.is_clean());
        assert_eq!(out.args, args);
    }

    #[test]
    fn empty_and_nul_tokens_are_repaired() {
        let args = strings(&["-f", "", "b\0est", "https://x.y"]);
        let out = sanitize_args(&args, true);
        assert_eq!(out.args, strings(&["-f", "best", "https://x.y"]));
        assert_eq!(out.alterations.len(), 2);
        assert!(out.args.iter().all(|a| !a.is_empty() && !a.contains('\0')));
    }

    #[test]
    fn unknown_dash_tokens_are_neutralized() {
        let args = strings(&["-o", "--exec=rm -rf /", "-evil", "https://x.y"]);
        let out = sanitize_args(&args, true);
        assert_eq!(out.args[1], "__exec=rm -rf /");
        assert_eq!(out.args[2], "_evil");
        for (i, a) in out.args.iter().enumerate() {
            if i + 1 != out.args.len() {
                assert!(!a.starts_with('-') || is_known_flag(a));
            }
        }
    }

    #[test]
    fn designated_url_is_exempt() {
        let args = strings(&["--", "-weird-but-url"]);
        let out = sanitize_args(&args, true);
        assert!(out.is_clean());

        let out = sanitize_args(&args, false);
        assert_eq!(out.args[1], "_weird-but-url");
    }

    #[test]
    fn long_flags_with_inline_values_are_recognized() {
        assert!(is_known_flag("--audio-format=mp3"));
        assert!(!is_known_flag("--exec=whoami"));
        assert!(!is_known_flag("-f=best"));
    }

    #[test]
    fn all_empty_input_yields_empty_list() {
        let out = sanitize_args(&strings(&["", "\0"]), true);
        assert!(out.args.is_empty());
    }

    #[test]
    fn unknown_extra_flags_are_dropped_with_their_values() {
        let flags = strings(&[
            "--sponsorblock-remove",
            "all",
            "--embed-metadata",
            "--proxy",
            "socks5://127.0.0.1:9050",
            "--no-such-switch",
            "--limit-rate",
            "2M",
            "--",
            "stray",
            "",
        ]);
        assert_eq!(
            filter_extra_flags(&flags),
            strings(&[
                "--embed-metadata",
                "--proxy",
                "socks5://127.0.0.1:9050",
                "--limit-rate",
                "2M"
            ])
        );
    }

    #[test]
    fn kept_extra_flags_pass_sanitation_untouched() {
        let flags = filter_extra_flags(&strings(&["--retries=5", "--bogus", "--no-mtime"]));
        assert_eq!(flags, strings(&["--retries=5", "--no-mtime"]));
        assert!(sanitize_args(&flags, false).is_clean());
    }
}
