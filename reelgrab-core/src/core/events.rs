use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::jobs::{DownloadJob, JobId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobEvent {
    /// Status or metadata changed; carries the full job.
    Updated(DownloadJob),
    Progress { id: JobId, percent: u8 },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Updated(job) => job.id(),
            JobEvent::Progress { id, .. } => *id,
        }
    }
}

pub trait EventEmitter: Send + Sync + 'static {
    fn emit(&self, event: &JobEvent);
}

/// Fan-out to any number of receivers. Slow receivers lag, they never block
/// the scheduler.
#[derive(Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<JobEvent>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: &JobEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Writes lifecycle changes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit(&self, event: &JobEvent) {
        match event {
            JobEvent::Updated(job) => tracing::info!(
                "[{}] {} {} ({})",
                job.platform(),
                job.id(),
                job.status(),
                job.display_title()
            ),
            JobEvent::Progress { id, percent } => tracing::debug!("{} at {}%", id, percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::DownloadRequest;
    use crate::platforms::PlatformKind;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let emitter = BroadcastEmitter::new(8);
        let mut a = emitter.subscribe();
        let mut b = emitter.subscribe();
        let job = DownloadJob::new(DownloadRequest::new("https://x.test/v", "/tmp"), PlatformKind::Generic);
        let id = job.id();

        emitter.emit(&JobEvent::Updated(job));
        emitter.emit(&JobEvent::Progress { id, percent: 5 });

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().job_id(), id);
            match rx.recv().await.unwrap() {
                JobEvent::Progress { percent, .. } => assert_eq!(percent, 5),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let emitter = BroadcastEmitter::new(1);
        let job = DownloadJob::new(DownloadRequest::new("https://x.test/v", "/tmp"), PlatformKind::Generic);
        emitter.emit(&JobEvent::Updated(job));
    }
}
