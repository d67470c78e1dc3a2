//! Locating the external engines. Every version check goes through the supervisor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::process::{ProcessOutcome, ProcessSupervisor, RunRequest, SpawnRequest};
use crate::errors::{AppError, AppResult, ErrorKind, Severity};
use crate::fs_paths::bin_name;
use crate::models::settings::ToolSettings;

pub const EXTRACTOR: &str = "yt-dlp";
pub const TRANSCODER: &str = "ffmpeg";

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

fn lookup_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    }
}

fn version_flag_for(tool: &str) -> &'static str {
    match tool {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    }
}

async fn first_stdout_line(
    supervisor: &ProcessSupervisor,
    operation: &'static str,
    program: &Path,
    args: Vec<String>,
) -> AppResult<Option<String>> {
    let mut request = RunRequest::new(operation, SpawnRequest::new(program, args));
    request.timeout = Some(PROBE_TIMEOUT);
    request.capture_stdout = true;
    request.require_output = true;

    match supervisor.run(request, |_| {}).await? {
        ProcessOutcome::Finished(out) => Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)),
        ProcessOutcome::Cancelled => Ok(None),
    }
}

/// Resolution order: configured path, managed bin dir, then a PATH lookup.
pub async fn find_tool(
    supervisor: &ProcessSupervisor,
    tool: &str,
    configured: Option<&Path>,
    bin_dir: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        tracing::warn!("configured {} path {} does not exist", tool, path.display());
    }

    if let Some(dir) = bin_dir {
        let managed = dir.join(bin_name(tool));
        if managed.exists() {
            return Some(managed);
        }
    }

    match first_stdout_line(
        supervisor,
        "tool lookup",
        Path::new(lookup_command()),
        vec![tool.to_string()],
    )
    .await
    {
        Ok(Some(line)) => Some(PathBuf::from(line)),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("{} lookup failed: {}", tool, e);
            None
        }
    }
}

/// First line of the tool's version banner.
pub async fn check_version(supervisor: &ProcessSupervisor, path: &Path) -> AppResult<String> {
    let tool = crate::core::sanitize::command_base_name(path);
    first_stdout_line(
        supervisor,
        "version check",
        path,
        vec![version_flag_for(&tool).to_string()],
    )
    .await?
    .ok_or_else(|| AppError::new(ErrorKind::Unknown, format!("{} printed no version", tool)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    pub extractor: Option<PathBuf>,
    pub transcoder: Option<PathBuf>,
}

impl ToolPaths {
    pub fn require_extractor(&self) -> AppResult<&Path> {
        self.extractor.as_deref().ok_or_else(|| {
            AppError::new(ErrorKind::Extraction, "yt-dlp could not be located")
                .with_user_message("yt-dlp is not installed or not on PATH.")
                .retryable(false)
                .severity(Severity::Critical)
        })
    }
}

pub async fn locate_tools(
    supervisor: &ProcessSupervisor,
    settings: &ToolSettings,
    bin_dir: Option<&Path>,
) -> ToolPaths {
    let extractor = find_tool(supervisor, EXTRACTOR, settings.ytdlp_path.as_deref(), bin_dir).await;
    let transcoder =
        find_tool(supervisor, TRANSCODER, settings.ffmpeg_path.as_deref(), bin_dir).await;
    match &transcoder {
        Some(p) => tracing::info!("using {} at {}", TRANSCODER, p.display()),
        None => tracing::warn!("{} not found, merging and trimming are disabled", TRANSCODER),
    }
    ToolPaths {
        extractor,
        transcoder,
    }
}
