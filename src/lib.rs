use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reelgrab_core::core::tools::{check_version, locate_tools};
use reelgrab_core::fs_paths::{AppPaths, DesktopPaths};
use reelgrab_core::{
    DownloadJob, DownloadRequest, JobEvent, JobId, JobStatus, PlatformRegistry, ProcessSupervisor,
    SchedulerConfig, Scheduler, TracingEmitter,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod storage;

use cli::Cli;

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let failed = runtime.block_on(download_all(cli))?;
    if failed > 0 {
        anyhow::bail!("{} download(s) did not complete", failed);
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns how many URLs did not end up downloaded.
async fn download_all(cli: Cli) -> anyhow::Result<usize> {
    let paths = DesktopPaths;
    let settings_path = storage::config::settings_path(&paths);
    let mut settings = storage::config::load_settings(&settings_path);
    cli.apply_to(&mut settings);
    if cli.save_settings {
        storage::config::save_settings(&settings_path, &settings)
            .context("failed to save settings")?;
        tracing::info!("settings saved to {}", settings_path.display());
    }

    let supervisor = ProcessSupervisor::tokio();
    let bin_dir = paths.bin_dir();
    let tools = locate_tools(&supervisor, &settings.tools, bin_dir.as_deref()).await;
    let extractor = tools.require_extractor()?.to_path_buf();
    match check_version(&supervisor, &extractor).await {
        Ok(version) => tracing::info!("using yt-dlp {} at {}", version, extractor.display()),
        Err(e) => tracing::warn!("could not read the yt-dlp version: {}", e),
    }

    let mut config = SchedulerConfig::from(&settings);
    config.extractor_path = extractor;
    config.transcoder_path = tools.transcoder.clone();

    let registry = Arc::new(PlatformRegistry::with_defaults());
    let scheduler = Scheduler::start(registry, supervisor, config, Arc::new(TracingEmitter));
    let mut events = scheduler.subscribe();

    let mut failed = 0;
    let mut remaining = HashSet::new();
    for url in &cli.urls {
        let mut request = DownloadRequest::new(url.as_str(), settings.download.default_output_dir.clone())
            .with_kind(settings.download.default_kind)
            .with_quality(settings.download.video_quality.as_str());
        if let Some(clip) = cli.clip {
            request = request.with_clip(clip);
        }
        if let Some(format) = &cli.format {
            request = request.with_format(format.as_str());
        }

        match scheduler.submit(request).await {
            Ok(id) => {
                remaining.insert(id);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", url, e.user_message);
                tracing::debug!("rejected {}: {}", url, e);
            }
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    while !remaining.is_empty() {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if cli.json {
                        print_json(&event);
                    }
                    if let JobEvent::Updated(job) = &event {
                        failed += settle(job, &mut remaining, cli.json);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("missed {} job events, resyncing", skipped);
                    for job in scheduler.list_jobs().await {
                        failed += settle(&job, &mut remaining, cli.json);
                    }
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::warn!("interrupted, cancelling {} download(s)", remaining.len());
                for id in remaining.iter().copied().collect::<Vec<JobId>>() {
                    scheduler.cancel(id).await;
                }
            }
        }
    }

    scheduler.shutdown().await;
    Ok(failed + remaining.len())
}

/// Counts a job once it reaches a final state. Returns 1 if it did not complete.
fn settle(job: &DownloadJob, remaining: &mut HashSet<JobId>, quiet: bool) -> usize {
    if !job.is_terminal() || !remaining.remove(&job.id()) {
        return 0;
    }
    if !quiet {
        print_summary(job);
    }
    usize::from(job.status() != JobStatus::Completed)
}

fn print_summary(job: &DownloadJob) {
    match job.status() {
        JobStatus::Completed => {
            let target = job
                .output_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| job.destination_folder.display().to_string());
            println!(
                "done  [{}] {} ({}, {}) -> {}",
                job.platform(),
                job.display_title(),
                job.display_duration(),
                job.display_size(),
                target
            );
        }
        JobStatus::Cancelled => println!("cancelled  [{}] {}", job.platform(), job.url()),
        _ => {
            let reason = job
                .last_error()
                .map(|e| e.user_message.as_str())
                .unwrap_or("unknown error");
            println!("failed  [{}] {}: {}", job.platform(), job.url(), reason);
        }
    }
}

fn print_json(event: &JobEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!("could not encode job event: {}", e),
    }
}
