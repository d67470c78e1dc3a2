//! The scheduler: one event loop owns every job, the FIFO of pending ids and
//! the set of running workers. Handles talk to it over channels.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::events::{BroadcastEmitter, EventEmitter, JobEvent};
use crate::core::jobs::{DownloadJob, DownloadRequest, JobId, JobStatus, JobStore};
use crate::core::process::{OutputLine, ProcessOutcome, ProcessSupervisor, RunRequest, SpawnRequest};
use crate::core::progress::{ProgressThrottle, ProgressTracker};
use crate::core::registry::PlatformRegistry;
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::models::media::{MediaInfo, MediaKind};
use crate::models::settings::SchedulerConfig;
use crate::platforms::traits::{ExtractorContext, Platform};
use crate::platforms::ytdlp::with_extra_args;

const PROGRESS_INTERVAL_MS: u64 = 150;
const EVENT_CAPACITY: usize = 256;

enum Command {
    Submit {
        request: DownloadRequest,
        reply: oneshot::Sender<AppResult<JobId>>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
    Retry {
        id: JobId,
        reply: oneshot::Sender<AppResult<JobId>>,
    },
    Get {
        id: JobId,
        reply: oneshot::Sender<Option<DownloadJob>>,
    },
    List {
        reply: oneshot::Sender<Vec<DownloadJob>>,
    },
    ClearFinished {
        reply: oneshot::Sender<usize>,
    },
    UpdateSettings {
        config: SchedulerConfig,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

enum Finish {
    Completed(Option<PathBuf>),
    Cancelled,
}

enum WorkerEvent {
    Metadata { id: JobId, info: MediaInfo },
    Progress { id: JobId, percent: u8 },
    Finished { id: JobId, result: AppResult<Finish> },
}

fn stopped() -> AppError {
    AppError::validation("scheduler is not running")
        .with_user_message("The download queue has been shut down.")
}

/// Cheap, cloneable handle to the scheduler loop.
#[derive(Clone)]
pub struct Scheduler {
    commands: mpsc::UnboundedSender<Command>,
    events: BroadcastEmitter,
}

impl Scheduler {
    /// Spawns the loop on the current tokio runtime.
    pub fn start(
        registry: Arc<PlatformRegistry>,
        supervisor: ProcessSupervisor,
        config: SchedulerConfig,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let config = config.normalized();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let events = BroadcastEmitter::new(EVENT_CAPACITY);

        let state = SchedulerLoop {
            supervisor: supervisor.with_kill_grace(config.kill_grace),
            registry,
            config,
            store: JobStore::new(),
            pending: VecDeque::new(),
            running: HashMap::new(),
            emitters: vec![Arc::new(events.clone()), emitter],
            worker_tx,
            shutting_down: false,
            shutdown_waiters: Vec::new(),
        };
        tokio::spawn(state.run(command_rx, worker_rx));

        Self { commands, events }
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).ok()?;
        rx.await.ok()
    }

    pub async fn submit(&self, request: DownloadRequest) -> AppResult<JobId> {
        self.call(|reply| Command::Submit { request, reply })
            .await
            .unwrap_or_else(|| Err(stopped()))
    }

    /// Returns false when the job is unknown or already finished.
    pub async fn cancel(&self, id: JobId) -> bool {
        self.call(|reply| Command::Cancel { id, reply })
            .await
            .unwrap_or(false)
    }

    /// Resubmits a failed or cancelled job as a new job.
    pub async fn retry(&self, id: JobId) -> AppResult<JobId> {
        self.call(|reply| Command::Retry { id, reply })
            .await
            .unwrap_or_else(|| Err(stopped()))
    }

    pub async fn get_job(&self, id: JobId) -> Option<DownloadJob> {
        self.call(|reply| Command::Get { id, reply }).await.flatten()
    }

    pub async fn list_jobs(&self) -> Vec<DownloadJob> {
        self.call(|reply| Command::List { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn clear_finished(&self) -> usize {
        self.call(|reply| Command::ClearFinished { reply })
            .await
            .unwrap_or(0)
    }

    /// Takes effect at the next dispatch. A higher limit dispatches right away.
    pub async fn update_settings(&self, config: SchedulerConfig) {
        let _ = self
            .call(|reply| Command::UpdateSettings { config, reply })
            .await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Cancels everything and waits for running workers to stop.
    pub async fn shutdown(&self) {
        let _ = self.call(|reply| Command::Shutdown { reply }).await;
    }
}

struct ActiveJob {
    cancel: CancellationToken,
    cancel_requested: bool,
}

struct SchedulerLoop {
    registry: Arc<PlatformRegistry>,
    supervisor: ProcessSupervisor,
    config: SchedulerConfig,
    store: JobStore,
    pending: VecDeque<JobId>,
    running: HashMap<JobId, ActiveJob>,
    emitters: Vec<Arc<dyn EventEmitter>>,
    worker_tx: mpsc::UnboundedSender<WorkerEvent>,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl SchedulerLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut worker_events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        let mut commands_open = true;
        loop {
            tokio::select! {
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        commands_open = false;
                        self.begin_shutdown();
                    }
                },
                Some(event) = worker_events.recv() => self.handle_worker_event(event),
            }
            if self.shutting_down && self.running.is_empty() {
                break;
            }
        }
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::debug!("scheduler loop stopped");
    }

    fn emit(&self, event: JobEvent) {
        for emitter in &self.emitters {
            emitter.emit(&event);
        }
    }

    fn emit_updated(&self, id: JobId) {
        if let Some(job) = self.store.get(id) {
            self.emit(JobEvent::Updated(job.clone()));
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { request, reply } => {
                let result = self.admit(request, true);
                let _ = reply.send(result);
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(id));
            }
            Command::Retry { id, reply } => {
                let _ = reply.send(self.retry(id));
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.store.get(id).cloned());
            }
            Command::List { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
            Command::ClearFinished { reply } => {
                let _ = reply.send(self.store.clear_finished());
            }
            Command::UpdateSettings { config, reply } => {
                let config = config.normalized();
                tracing::info!("max concurrent downloads: {}", config.max_concurrent);
                self.supervisor = self.supervisor.clone().with_kill_grace(config.kill_grace);
                self.config = config;
                self.dispatch();
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.shutdown_waiters.push(reply);
                self.begin_shutdown();
            }
        }
    }

    fn admit(&mut self, mut request: DownloadRequest, organize: bool) -> AppResult<JobId> {
        if self.shutting_down {
            return Err(stopped());
        }

        request.url = request.url.trim().to_string();
        if request.url.is_empty() {
            return Err(AppError::validation("empty URL").with_user_message("Enter a URL to download."));
        }
        let platform = self.registry.resolve(&request.url).ok_or_else(|| {
            AppError::validation(format!("no platform handles {}", request.url))
                .with_user_message("This URL is not supported.")
                .with_context("url", &request.url)
        })?;

        let caps = platform.capabilities();
        if let Some(clip) = &request.clip_range {
            clip.validate()?;
            if !caps.supports_trimming {
                tracing::warn!("{} cannot trim, clip range will be ignored", platform.kind());
            }
        }
        if let Some(format) = &request.format {
            if !caps.supports_format(format) {
                return Err(AppError::validation(format!(
                    "{} does not offer {}",
                    platform.kind(),
                    format
                ))
                .with_user_message(format!("{} is not available for this site.", format))
                .with_context("platform", platform.kind()));
            }
        }
        let kind_supported = match request.kind {
            MediaKind::Audio => caps.has_audio_only,
            MediaKind::Video => caps.has_video_only,
            MediaKind::VideoAudio => true,
        };
        if !kind_supported {
            return Err(AppError::validation(format!(
                "{} does not offer {} downloads",
                platform.kind(),
                request.kind
            ))
            .with_user_message(format!("{} downloads are not available for this site.", request.kind))
            .with_context("platform", platform.kind()));
        }

        if organize && self.config.organize_by_platform {
            request.destination_folder = request.destination_folder.join(platform.kind().as_str());
        }

        let job = DownloadJob::new(request, platform.kind());
        let id = self.store.insert(job)?;
        self.pending.push_back(id);
        tracing::info!("[{}] queued {}", platform.kind(), id);
        self.emit_updated(id);
        self.dispatch();
        Ok(id)
    }

    fn dispatch(&mut self) {
        if self.shutting_down {
            return;
        }
        while self.running.len() < self.config.max_concurrent {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            if self.running.contains_key(&id) {
                tracing::warn!("job {} is already running, not dispatching twice", id);
                continue;
            }
            let Some(job) = self.store.get_mut(id) else {
                continue;
            };
            if job.status() != JobStatus::Pending {
                continue;
            }
            let Some(platform) = self.registry.get(job.platform()) else {
                continue;
            };
            if let Err(e) = job.start() {
                tracing::warn!("could not start {}: {}", id, e);
                continue;
            }

            let cancel = CancellationToken::new();
            let worker = Worker {
                job: job.clone(),
                platform,
                supervisor: self.supervisor.clone(),
                config: self.config.clone(),
                cancel: cancel.clone(),
                events: self.worker_tx.clone(),
            };
            self.running.insert(
                id,
                ActiveJob {
                    cancel,
                    cancel_requested: false,
                },
            );
            tracing::info!(
                "[{}] starting {} ({}/{} slots)",
                job.platform(),
                id,
                self.running.len(),
                self.config.max_concurrent
            );

            let events = self.worker_tx.clone();
            tokio::spawn(async move {
                let handle = tokio::spawn(worker.run());
                if let Err(e) = handle.await {
                    let _ = events.send(WorkerEvent::Finished {
                        id,
                        result: Err(AppError::new(ErrorKind::Unknown, format!("worker crashed: {}", e))),
                    });
                }
            });
            self.emit_updated(id);
        }
    }

    fn cancel(&mut self, id: JobId) -> bool {
        let Some(job) = self.store.get_mut(id) else {
            return false;
        };
        match job.status() {
            JobStatus::Pending => {
                self.pending.retain(|p| *p != id);
                if job.cancel().is_err() {
                    return false;
                }
                tracing::info!("cancelled pending {}", id);
                self.emit_updated(id);
                true
            }
            JobStatus::Running => match self.running.get_mut(&id) {
                Some(active) => {
                    if !active.cancel_requested {
                        active.cancel_requested = true;
                        active.cancel.cancel();
                        tracing::info!("cancelling running {}", id);
                    }
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn retry(&mut self, id: JobId) -> AppResult<JobId> {
        let job = self
            .store
            .get(id)
            .ok_or_else(|| AppError::validation(format!("unknown job {}", id)))?;
        if !matches!(job.status(), JobStatus::Failed | JobStatus::Cancelled) {
            return Err(AppError::validation(format!(
                "job {} is {}, only failed or cancelled jobs can be retried",
                id,
                job.status()
            ))
            .with_user_message("Only failed or cancelled downloads can be retried."));
        }
        let request = job.retry_request();
        self.admit(request, false)
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        tracing::info!(
            "shutting down: {} pending, {} running",
            self.pending.len(),
            self.running.len()
        );
        self.shutting_down = true;
        let pending: Vec<JobId> = self.pending.drain(..).collect();
        for id in pending {
            if let Some(job) = self.store.get_mut(id) {
                if job.cancel().is_ok() {
                    self.emit_updated(id);
                }
            }
        }
        for active in self.running.values_mut() {
            active.cancel_requested = true;
            active.cancel.cancel();
        }
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Metadata { id, info } => {
                if let Some(job) = self.store.get_mut(id) {
                    if job.status() == JobStatus::Running {
                        job.apply_info(&info);
                        self.emit_updated(id);
                    }
                }
            }
            WorkerEvent::Progress { id, percent } => {
                let moved = self
                    .store
                    .get_mut(id)
                    .map(|job| job.update_progress(percent))
                    .unwrap_or(false);
                if moved {
                    self.emit(JobEvent::Progress { id, percent });
                }
            }
            WorkerEvent::Finished { id, result } => {
                self.finish(id, result);
                self.dispatch();
            }
        }
    }

    fn finish(&mut self, id: JobId, result: AppResult<Finish>) {
        let cancel_requested = self
            .running
            .remove(&id)
            .map(|a| a.cancel_requested)
            .unwrap_or(false);
        let Some(job) = self.store.get_mut(id) else {
            return;
        };

        let transition = match result {
            Ok(Finish::Completed(path)) => {
                tracing::info!("[{}] completed {}", job.platform(), id);
                job.complete(path)
            }
            Ok(Finish::Cancelled) => job.cancel(),
            Err(_) if cancel_requested => job.cancel(),
            Err(e) => {
                tracing::error!(
                    "[{}] {} failed: {} {:?}",
                    job.platform(),
                    id,
                    e,
                    e.context
                );
                job.fail(e)
            }
        };
        if let Err(e) = transition {
            tracing::warn!("dropping result for {}: {}", id, e);
            return;
        }
        self.emit_updated(id);
    }
}

struct Worker {
    job: DownloadJob,
    platform: Arc<dyn Platform>,
    supervisor: ProcessSupervisor,
    config: SchedulerConfig,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl Worker {
    async fn run(self) {
        let id = self.job.id();
        let result = self.execute().await;
        let _ = self.events.send(WorkerEvent::Finished { id, result });
    }

    async fn execute(&self) -> AppResult<Finish> {
        let mut job = self.job.clone();
        let caps = self.platform.capabilities();
        let transcoder = self.config.transcoder_path.as_deref();

        let dir = &job.destination_folder;
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::new(
                ErrorKind::Filesystem,
                format!("cannot create {}: {}", dir.display(), e),
            )
            .with_user_message("The destination folder could not be created.")
            .with_context("path", dir.display())
        })?;

        if caps.requires_transcoder && job.kind != MediaKind::Audio && transcoder.is_none() {
            return Err(AppError::new(
                ErrorKind::Transcode,
                format!("{} streams must be merged and no ffmpeg is configured", job.platform()),
            )
            .with_user_message("ffmpeg is required to download from this site.")
            .with_context("platform", job.platform())
            .retryable(false));
        }
        if !caps.has_live_streams && self.platform.is_live_stream(job.url()) {
            return Err(AppError::new(
                ErrorKind::Platform,
                format!("{} live streams are not supported", job.platform()),
            )
            .with_user_message("Live streams cannot be downloaded from this site."));
        }
        if self.cancel.is_cancelled() {
            return Ok(Finish::Cancelled);
        }

        if self.config.fetch_info {
            let ctx = ExtractorContext::new(&self.supervisor, &self.config.extractor_path)
                .with_timeout(self.config.info_fetch_timeout)
                .with_cancel(self.cancel.clone());
            match self.platform.fetch_info(&ctx, job.url()).await {
                Ok(info) => {
                    job.apply_info(&info);
                    let _ = self.events.send(WorkerEvent::Metadata {
                        id: job.id(),
                        info,
                    });
                }
                Err(_) if self.cancel.is_cancelled() => return Ok(Finish::Cancelled),
                Err(e) => return Err(e),
            }
        }

        let args = with_extra_args(
            self.platform.build_download_args(&job, transcoder),
            &self.config.extra_extractor_args,
        );
        let spawn = SpawnRequest::new(&self.config.extractor_path, args).with_url_last();
        let mut request = RunRequest::new("download", spawn);
        request.timeout = self.config.download_timeout;
        request.cancel = Some(self.cancel.clone());
        request.failure_kind = Some(ErrorKind::Extraction);

        let id = job.id();
        let mut tracker = ProgressTracker::new();
        let mut throttle = ProgressThrottle::new(PROGRESS_INTERVAL_MS);
        let events = &self.events;
        let outcome = self
            .supervisor
            .run(request, |line| {
                if let OutputLine::Stdout(line) = line {
                    if let Some(percent) = tracker.observe(line) {
                        if percent == 100 || throttle.should_emit() {
                            let _ = events.send(WorkerEvent::Progress { id, percent });
                        }
                    }
                }
            })
            .await?;

        match outcome {
            ProcessOutcome::Finished(_) => Ok(Finish::Completed(tracker.output_path().cloned())),
            ProcessOutcome::Cancelled => Ok(Finish::Cancelled),
        }
    }
}
