use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::format::{display_or_unknown, format_bytes, format_duration};
use crate::errors::{AppError, AppResult};
use crate::models::media::{ClipRange, MediaInfo, MediaKind};
use crate::platforms::PlatformKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A user submission before admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub kind: MediaKind,
    pub quality: String,
    pub destination_folder: PathBuf,
    pub clip_range: Option<ClipRange>,
    /// Target container or audio codec, e.g. `mp4`, `mp3`.
    pub format: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination_folder: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::VideoAudio,
            quality: "best".to_string(),
            destination_folder: destination_folder.into(),
            clip_range: None,
            format: None,
        }
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_clip(mut self, clip: ClipRange) -> Self {
        self.clip_range = Some(clip);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadJob {
    id: JobId,
    url: String,
    platform: PlatformKind,
    pub kind: MediaKind,
    pub quality: String,
    pub format: Option<String>,
    pub destination_folder: PathBuf,
    pub clip_range: Option<ClipRange>,
    status: JobStatus,
    progress: u8,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_seconds: Option<f64>,
    pub file_size_bytes: Option<u64>,
    pub uploader: Option<String>,
    pub output_path: Option<PathBuf>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_error: Option<AppError>,
}

impl DownloadJob {
    pub fn new(request: DownloadRequest, platform: PlatformKind) -> Self {
        Self {
            id: JobId::new(),
            url: request.url,
            platform,
            kind: request.kind,
            quality: request.quality,
            format: request.format,
            destination_folder: request.destination_folder,
            clip_range: request.clip_range,
            status: JobStatus::Pending,
            progress: 0,
            title: None,
            thumbnail: None,
            duration_seconds: None,
            file_size_bytes: None,
            uploader: None,
            output_path: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn platform(&self) -> PlatformKind {
        self.platform
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn last_error(&self) -> Option<&AppError> {
        self.last_error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::validation(format!(
                "job {} cannot go from {} to {}",
                self.id, self.status, next
            ))
            .with_context("job_id", self.id)
            .with_context("from", self.status)
            .with_context("to", next));
        }
        self.status = next;
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn start(&mut self) -> AppResult<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, output_path: Option<PathBuf>) -> AppResult<()> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        if output_path.is_some() {
            self.output_path = output_path;
        }
        Ok(())
    }

    pub fn fail(&mut self, error: AppError) -> AppResult<()> {
        self.transition(JobStatus::Failed)?;
        self.last_error = Some(error);
        Ok(())
    }

    pub fn cancel(&mut self) -> AppResult<()> {
        self.transition(JobStatus::Cancelled)
    }

    /// Applies a progress report. Only a running job moves, values are
    /// clamped to 100 and anything below the current value is ignored.
    /// Returns whether the stored value changed.
    pub fn update_progress(&mut self, percent: u8) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let percent = percent.min(100);
        if percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    pub fn apply_info(&mut self, info: &MediaInfo) {
        let title = info.title().trim();
        if !title.is_empty() {
            self.title = Some(title.to_string());
        }
        self.thumbnail = info.thumbnail_url().map(str::to_string).or(self.thumbnail.take());
        self.duration_seconds = info.duration_seconds().or(self.duration_seconds);
        self.file_size_bytes = info.file_size_bytes().or(self.file_size_bytes);
        self.uploader = info.uploader().map(str::to_string).or(self.uploader.take());
    }

    pub fn display_title(&self) -> String {
        display_or_unknown(self.title.clone(), |t| t)
    }

    pub fn display_duration(&self) -> String {
        display_or_unknown(self.duration_seconds, format_duration)
    }

    pub fn display_size(&self) -> String {
        display_or_unknown(self.file_size_bytes, format_bytes)
    }

    /// Parameters for a fresh submission of the same download.
    pub fn retry_request(&self) -> DownloadRequest {
        DownloadRequest {
            url: self.url.clone(),
            kind: self.kind,
            quality: self.quality.clone(),
            destination_folder: self.destination_folder.clone(),
            clip_range: self.clip_range,
            format: self.format.clone(),
        }
    }
}

/// Jobs in submission order, indexed by id.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Vec<DownloadJob>,
    index: HashMap<JobId, usize>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, job: DownloadJob) -> AppResult<JobId> {
        let id = job.id();
        if self.index.contains_key(&id) {
            return Err(AppError::validation(format!("duplicate job id {}", id)));
        }
        self.index.insert(id, self.jobs.len());
        self.jobs.push(job);
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> Option<&DownloadJob> {
        self.index.get(&id).map(|&i| &self.jobs[i])
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut DownloadJob> {
        let i = *self.index.get(&id)?;
        self.jobs.get_mut(i)
    }

    pub fn snapshot(&self) -> Vec<DownloadJob> {
        self.jobs.clone()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drops terminal jobs, returning how many were removed.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| !j.is_terminal());
        self.index = self
            .jobs
            .iter()
            .enumerate()
            .map(|(i, j)| (j.id, i))
            .collect();
        before - self.jobs.len()
    }
}
