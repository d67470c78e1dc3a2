use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::sanitize::{command_base_name, ensure_allowed, sanitize_args};
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::fs_paths;

const EVENT_BUFFER: usize = 256;
const STDERR_TAIL_LINES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// Always the last event. `None` when the process died from a signal.
    Exited(Option<i32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLine<'a> {
    Stdout(&'a str),
    Stderr(&'a str),
}

pub trait ProcessControl: Send + Sync {
    fn kill(&self, signal: Signal);
}

pub struct SpawnedProcess {
    pub pid: Option<u32>,
    pub events: mpsc::Receiver<ProcessEvent>,
    pub control: Arc<dyn ProcessControl>,
}

/// The privileged boundary that actually starts programs.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn start(&self, program: &Path, args: &[String]) -> std::io::Result<SpawnedProcess>;
}

fn enhanced_path() -> Option<String> {
    let bin_dir = fs_paths::managed_bin_dir()?;
    let sep = if cfg!(windows) { ";" } else { ":" };
    let current = std::env::var("PATH").unwrap_or_default();
    Some(format!("{}{}{}", bin_dir.display(), sep, current))
}

pub fn command<S: AsRef<std::ffi::OsStr>>(program: S) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(0x08000000);
    if let Some(path) = enhanced_path() {
        cmd.env("PATH", path);
    }
    cmd.env("PYTHONIOENCODING", "utf-8");
    cmd.env("PYTHONUTF8", "1");
    cmd
}

/// Runs programs with `tokio::process`, never through a shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLauncher;

struct TokioControl {
    kill_tx: mpsc::UnboundedSender<Signal>,
}

impl ProcessControl for TokioControl {
    fn kill(&self, signal: Signal) {
        let _ = self.kill_tx.send(signal);
    }
}

async fn forward_lines<R, F>(reader: R, tx: mpsc::Sender<ProcessEvent>, wrap: F)
where
    R: AsyncRead + Unpin,
    F: Fn(String) -> ProcessEvent,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if tx.send(wrap(line.to_string())).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn start(&self, program: &Path, args: &[String]) -> std::io::Result<SpawnedProcess> {
        let mut child = command(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (kill_tx, mut kill_rx) = mpsc::unbounded_channel::<Signal>();

        let out_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, tx.clone(), ProcessEvent::Stdout)));
        let err_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, tx.clone(), ProcessEvent::Stderr)));

        tokio::spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(signal) = kill_rx.recv() => {
                        // tokio only exposes a hard kill; both signals end up here.
                        tracing::debug!("kill({:?}) for pid {:?}", signal, pid);
                        let _ = child.start_kill();
                    }
                }
            };
            if let Some(t) = out_task {
                let _ = t.await;
            }
            if let Some(t) = err_task {
                let _ = t.await;
            }
            let code = status.ok().and_then(|s| s.code());
            let _ = tx.send(ProcessEvent::Exited(code)).await;
        });

        Ok(SpawnedProcess {
            pid,
            events: rx,
            control: Arc::new(TokioControl { kill_tx }),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// The final argument is the user-supplied URL.
    pub url_last: bool,
}

impl SpawnRequest {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            url_last: false,
        }
    }

    pub fn with_url_last(mut self) -> Self {
        self.url_last = true;
        self
    }
}

pub struct ProcessHandle {
    program: String,
    pid: Option<u32>,
    events: mpsc::Receiver<ProcessEvent>,
    control: Arc<dyn ProcessControl>,
    exit: Option<Option<i32>>,
}

impl ProcessHandle {
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Exit code once `Exited` has been observed.
    pub fn exit_code(&self) -> Option<Option<i32>> {
        self.exit
    }

    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.exit.is_some() {
            return None;
        }
        let event = self.events.recv().await;
        match event {
            Some(ProcessEvent::Exited(code)) => self.exit = Some(code),
            None => self.exit = Some(None),
            _ => {}
        }
        event
    }

    pub fn kill(&self, signal: Signal) {
        self.control.kill(signal);
    }

    /// Drains events until exit. Output seen here is discarded.
    pub async fn wait(&mut self) -> Option<i32> {
        while self.next_event().await.is_some() {}
        self.exit.flatten()
    }

    async fn wait_for(&mut self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait()).await.is_ok()
    }

    /// Terminate, then escalate to a hard kill after `grace`. Returns whether
    /// the exit was observed.
    pub async fn terminate(&mut self, grace: Duration) -> bool {
        if self.exit.is_some() {
            return true;
        }
        self.kill(Signal::Terminate);
        if self.wait_for(grace).await {
            return true;
        }
        tracing::warn!(
            "{} (pid {:?}) ignored terminate, forcing kill",
            self.program,
            self.pid
        );
        self.kill(Signal::Kill);
        self.wait_for(grace).await
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub spawn: SpawnRequest,
    /// Label used in logs and errors, e.g. `info fetch`.
    pub operation: &'static str,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub capture_stdout: bool,
    /// Exit 0 without any stdout counts as a failure.
    pub require_output: bool,
    /// Kind used for a non-zero exit whose stderr is not recognizable.
    pub failure_kind: Option<ErrorKind>,
}

impl RunRequest {
    pub fn new(operation: &'static str, spawn: SpawnRequest) -> Self {
        Self {
            spawn,
            operation,
            timeout: None,
            cancel: None,
            capture_stdout: false,
            require_output: false,
            failure_kind: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr_tail: String,
    pub stdout_lines: usize,
}

#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Finished(RunOutput),
    /// The cancellation token fired and the kill was acknowledged.
    Cancelled,
}

/// Default failure kind for a program that exited non-zero.
pub fn failure_kind_for(program: &Path) -> ErrorKind {
    match command_base_name(program).as_str() {
        "yt-dlp" | "youtube-dl" => ErrorKind::Extraction,
        "ffmpeg" | "ffprobe" => ErrorKind::Transcode,
        _ => ErrorKind::Unknown,
    }
}

#[derive(Clone)]
pub struct ProcessSupervisor {
    launcher: Arc<dyn ProcessLauncher>,
    kill_grace: Duration,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            kill_grace: Duration::from_secs(5),
        }
    }

    pub fn tokio() -> Self {
        Self::new(Arc::new(TokioLauncher))
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub async fn spawn(&self, request: SpawnRequest) -> AppResult<ProcessHandle> {
        ensure_allowed(&request.program)?;

        let sanitized = sanitize_args(&request.args, request.url_last);
        let program = command_base_name(&request.program);
        tracing::debug!("spawn {} {:?}", request.program.display(), sanitized.args);

        let spawned = self
            .launcher
            .start(&request.program, &sanitized.args)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AppError::new(
                        failure_kind_for(&request.program),
                        format!("{} not found: {}", request.program.display(), e),
                    )
                    .with_user_message(format!("{} is not installed or not on PATH.", program))
                    .with_context("program", request.program.display())
                    .retryable(false)
                } else {
                    AppError::from_io(&e, "spawn").with_context("program", request.program.display())
                }
            })?;

        Ok(ProcessHandle {
            program,
            pid: spawned.pid,
            events: spawned.events,
            control: spawned.control,
            exit: None,
        })
    }

    /// Spawns, streams every line through `on_line`, and normalizes the
    /// result. Timeout and cancellation both kill the process first.
    pub async fn run<F>(&self, request: RunRequest, mut on_line: F) -> AppResult<ProcessOutcome>
    where
        F: FnMut(OutputLine<'_>) + Send,
    {
        let failure_kind = request
            .failure_kind
            .unwrap_or_else(|| failure_kind_for(&request.spawn.program));
        let mut handle = self.spawn(request.spawn).await?;
        let cancel = request.cancel.unwrap_or_default();

        let timer = async {
            match request.timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        let mut output = RunOutput::default();
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let code = loop {
            tokio::select! {
                biased;
                event = handle.next_event() => match event {
                    Some(ProcessEvent::Stdout(line)) => {
                        on_line(OutputLine::Stdout(&line));
                        output.stdout_lines += 1;
                        if request.capture_stdout {
                            output.stdout.push_str(&line);
                            output.stdout.push('\n');
                        }
                    }
                    Some(ProcessEvent::Stderr(line)) => {
                        on_line(OutputLine::Stderr(&line));
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line);
                    }
                    Some(ProcessEvent::Exited(code)) => break code,
                    None => break handle.exit_code().flatten(),
                },
                _ = cancel.cancelled() => {
                    tracing::info!("{} cancelled, stopping {}", request.operation, handle.program());
                    handle.terminate(self.kill_grace).await;
                    return Ok(ProcessOutcome::Cancelled);
                }
                _ = &mut timer => {
                    let limit = request.timeout.unwrap_or_default();
                    tracing::warn!(
                        "{} exceeded {}s, killing {}",
                        request.operation,
                        limit.as_secs(),
                        handle.program()
                    );
                    handle.terminate(self.kill_grace).await;
                    return Err(AppError::timeout(request.operation, limit)
                        .with_context("program", handle.program()));
                }
            }
        };

        output.stderr_tail = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
        tracing::debug!("{} exited with {:?}", handle.program(), code);

        match code {
            Some(0) if request.require_output && output.stdout_lines == 0 => Err(AppError::new(
                failure_kind,
                format!("{} produced no output", handle.program()),
            )
            .with_context("operation", request.operation)
            .with_context("stderr", crate::errors::truncate_stderr(&output.stderr_tail))),
            Some(0) => Ok(ProcessOutcome::Finished(output)),
            other => Err(
                AppError::from_exit(failure_kind, handle.program(), other, &output.stderr_tail)
                    .with_context("operation", request.operation),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{FakeLauncher, Script};

    fn supervisor(launcher: &Arc<FakeLauncher>) -> ProcessSupervisor {
        ProcessSupervisor::new(launcher.clone()).with_kill_grace(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn disallowed_command_never_reaches_launcher() {
        let launcher = Arc::new(FakeLauncher::new());
        let sup = supervisor(&launcher);
        let err = sup
            .spawn(SpawnRequest::new("untrusted-binary", vec!["--help".into()]))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(!err.retryable);
        assert_eq!(launcher.spawn_count(), 0);
    }

    #[tokio::test]
    async fn arguments_are_sanitized_before_launch() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::exits(0));
        let sup = supervisor(&launcher);
        let args = vec![
            "-f".to_string(),
            "".to_string(),
            "-sneaky".to_string(),
            "be\0st".to_string(),
            "--".to_string(),
            "https://example.com/v".to_string(),
        ];
        let mut handle = sup
            .spawn(SpawnRequest::new("yt-dlp", args).with_url_last())
            .await
            .unwrap();
        handle.wait().await;

        let calls = launcher.calls();
        assert_eq!(
            calls[0].args,
            vec!["-f", "_sneaky", "best", "--", "https://example.com/v"]
        );
    }

    #[tokio::test]
    async fn run_collects_stdout_and_streams_lines() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::exits(0).stdout("{\"a\":1}").stderr("WARNING: x"));
        let sup = supervisor(&launcher);

        let mut seen = Vec::new();
        let mut req = RunRequest::new("info fetch", SpawnRequest::new("yt-dlp", vec![]));
        req.capture_stdout = true;
        req.require_output = true;
        let outcome = sup
            .run(req, |line| seen.push(format!("{:?}", line)))
            .await
            .unwrap();

        match outcome {
            ProcessOutcome::Finished(out) => {
                assert_eq!(out.stdout.trim(), "{\"a\":1}");
                assert_eq!(out.stderr_tail, "WARNING: x");
            }
            ProcessOutcome::Cancelled => panic!("not cancelled"),
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn non_zero_exit_is_classified_with_stderr_context() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::exits(1).stderr("ERROR: [generic] Unsupported URL: x"));
        let sup = supervisor(&launcher);

        let err = sup
            .run(RunRequest::new("info fetch", SpawnRequest::new("yt-dlp", vec![])), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Platform);
        assert_eq!(err.context.get("exit_code").map(String::as_str), Some("1"));
        assert!(err.context["stderr"].contains("Unsupported URL"));
    }

    #[tokio::test]
    async fn non_zero_exit_without_hint_uses_tool_kind() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::exits(2).stderr("ERROR: odd"));
        let sup = supervisor(&launcher);
        let err = sup
            .run(RunRequest::new("media check", SpawnRequest::new("ffprobe", vec![])), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Transcode);
    }

    #[tokio::test]
    async fn empty_required_output_fails() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::exits(0));
        let sup = supervisor(&launcher);
        let mut req = RunRequest::new("info fetch", SpawnRequest::new("yt-dlp", vec![]));
        req.require_output = true;
        let err = sup.run(req, |_| {}).await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::Extraction);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_kills_and_reports_network() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::hangs());
        let sup = supervisor(&launcher);

        let mut req = RunRequest::new("download", SpawnRequest::new("yt-dlp", vec![]));
        req.timeout = Some(Duration::from_secs(30));
        let err = sup.run(req, |_| {}).await.err().unwrap();

        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.retryable);
        assert!(!launcher.kills().is_empty());
    }

    #[tokio::test]
    async fn cancellation_kills_and_returns_cancelled() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::hangs());
        let sup = supervisor(&launcher);

        let token = CancellationToken::new();
        let mut req = RunRequest::new("download", SpawnRequest::new("yt-dlp", vec![]));
        req.cancel = Some(token.clone());
        token.cancel();

        let outcome = sup.run(req, |_| {}).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Cancelled));
        assert_eq!(launcher.kills(), vec![Signal::Terminate]);
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_process_gets_hard_kill() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::hangs().ignore_terminate());
        let sup = supervisor(&launcher);

        let token = CancellationToken::new();
        token.cancel();
        let mut req = RunRequest::new("download", SpawnRequest::new("yt-dlp", vec![]));
        req.cancel = Some(token);
        sup.run(req, |_| {}).await.unwrap();

        assert_eq!(launcher.kills(), vec![Signal::Terminate, Signal::Kill]);
    }

    #[tokio::test]
    async fn missing_binary_is_not_retryable() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.push_script(Script::not_found());
        let sup = supervisor(&launcher);
        let err = sup
            .spawn(SpawnRequest::new("/nowhere/ffmpeg", vec![]))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Transcode);
        assert!(!err.retryable);
    }
}
