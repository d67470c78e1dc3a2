pub mod core;
pub mod errors;
pub mod fs_paths;
pub mod models;
pub mod platforms;

pub use crate::core::events::{BroadcastEmitter, EventEmitter, JobEvent, TracingEmitter};
pub use crate::core::jobs::{DownloadJob, DownloadRequest, JobId, JobStatus};
pub use crate::core::process::{ProcessLauncher, ProcessSupervisor, TokioLauncher};
pub use crate::core::queue::Scheduler;
pub use crate::core::registry::PlatformRegistry;
pub use crate::errors::{AppError, AppResult, ErrorKind, Severity};
pub use crate::models::media::{ClipRange, MediaInfo, MediaKind};
pub use crate::models::settings::{AppSettings, SchedulerConfig};
pub use crate::platforms::{Platform, PlatformKind};
