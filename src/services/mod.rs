pub mod archive_installer;
pub mod catalog_service;
pub mod game_launcher;
pub mod install_job;
pub mod install_queue;
pub mod ownership_store;
pub mod progress_sink;
pub mod shortcut_service;

pub use catalog_service::CatalogService;
pub use install_job::{InstallJob, InstallPhase, JobOutcome, JobReport};
pub use install_queue::{InstallQueue, QueueEntry, WorkerState};
pub use ownership_store::OwnershipStore;
pub use progress_sink::{EventReceiver, InstallEvent, ProgressSink};
