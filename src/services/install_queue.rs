use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::{HttpSettings, LauncherConfig};
use crate::errors::Result;
use crate::models::{InstallRequest, ItemAction, OwnershipPatch, OwnershipRecord};
use crate::services::install_job::{build_http_client, InstallJob, InstallPhase, JobContext};
use crate::services::ownership_store::OwnershipStore;
use crate::services::progress_sink::{EventReceiver, InstallEvent, ProgressSink};
use crate::utils::file::FileManager;

#[derive(Clone, Debug, Serialize)]
pub struct QueueEntry {
    pub request: InstallRequest,
    pub phase: InstallPhase,
    pub progress: f64,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Running,
}

struct ActiveJob {
    item_id: String,
    cancel: watch::Sender<bool>,
}

struct QueueState {
    backlog: VecDeque<QueueEntry>,
    worker: WorkerState,
    active: Option<ActiveJob>,
}

/// Sequential install backlog with one lazily started worker task.
///
/// The entry being installed stays at the head of `backlog` until its job is terminal.
/// `worker` only changes while `state` is locked, so an enqueue racing a draining worker
/// either lands before the worker's final empty check or starts a fresh worker.
#[derive(Clone)]
pub struct InstallQueue {
    state: Arc<Mutex<QueueState>>,
    ctx: JobContext,
    runtime: Handle,
}

impl InstallQueue {
    pub fn new(
        files: FileManager,
        store: OwnershipStore,
        http: &HttpSettings,
        runtime: Handle,
    ) -> Result<(Self, EventReceiver)> {
        let client = build_http_client(http)?;
        let (sink, events) = ProgressSink::new();
        let queue = Self {
            state: Arc::new(Mutex::new(QueueState {
                backlog: VecDeque::new(),
                worker: WorkerState::Idle,
                active: None,
            })),
            ctx: JobContext {
                client,
                files,
                store,
                sink,
                read_timeout: http.read_timeout,
            },
            runtime,
        };
        Ok((queue, events))
    }

    pub fn from_config(config: &LauncherConfig, runtime: Handle) -> Result<(Self, EventReceiver)> {
        let store = OwnershipStore::open(config.ownership_path());
        Self::new(config.files.clone(), store, &config.http, runtime)
    }

    /// Appends unless an entry with the same id is pending or running.
    ///
    /// Safe to call from any thread; never waits on I/O.
    pub fn enqueue(&self, request: InstallRequest) -> bool {
        let mut state = self.lock();
        let appended = if state
            .backlog
            .iter()
            .any(|entry| entry.request.item_id == request.item_id)
        {
            tracing::debug!("ignoring duplicate enqueue item={}", request.item_id);
            false
        } else {
            let item_id = request.item_id.clone();
            state.backlog.push_back(QueueEntry {
                request,
                phase: InstallPhase::Queued,
                progress: 0.0,
                enqueued_at: Utc::now(),
            });
            let position = state.backlog.len() - 1;
            tracing::info!("queued install item={} position={}", item_id, position);
            self.ctx.sink.emit(InstallEvent::Queued { item_id, position });
            true
        };

        if state.worker == WorkerState::Idle && !state.backlog.is_empty() {
            state.worker = WorkerState::Running;
            let queue = self.clone();
            self.runtime.spawn(async move {
                queue.run_worker().await;
            });
        }
        appended
    }

    async fn run_worker(self) {
        tracing::info!("install worker started");
        loop {
            let next = {
                let mut state = self.lock();
                match state.backlog.front().map(|entry| entry.request.clone()) {
                    Some(request) => {
                        let (cancel, receiver) = watch::channel(false);
                        state.active = Some(ActiveJob {
                            item_id: request.item_id.clone(),
                            cancel,
                        });
                        self.ctx.sink.reset(&request.item_id);
                        Some((request, receiver))
                    }
                    None => {
                        state.worker = WorkerState::Idle;
                        None
                    }
                }
            };
            let Some((request, cancel)) = next else {
                break;
            };

            let report = InstallJob::new(request, &self.ctx.files, cancel)
                .run(&self.ctx)
                .await;

            {
                let mut state = self.lock();
                state.active = None;
                let head_matches = state
                    .backlog
                    .front()
                    .map(|entry| entry.request.item_id == report.item_id)
                    .unwrap_or(false);
                if head_matches {
                    state.backlog.pop_front();
                }
            }
            self.ctx.sink.emit(InstallEvent::Finished { report });
        }
        tracing::info!("install worker idle");
    }

    /// Ordered copy of the backlog, head first. The head carries live phase and progress.
    pub fn peek_backlog(&self) -> Vec<QueueEntry> {
        let state = self.lock();
        let active_id = state.active.as_ref().map(|active| active.item_id.as_str());
        state
            .backlog
            .iter()
            .map(|entry| {
                let mut entry = entry.clone();
                if Some(entry.request.item_id.as_str()) == active_id {
                    if let Some(phase) = self.ctx.sink.phase_of(&entry.request.item_id) {
                        entry.phase = phase;
                    }
                    if let Some(progress) = self.ctx.sink.get(&entry.request.item_id) {
                        entry.progress = progress;
                    }
                }
                entry
            })
            .collect()
    }

    pub fn progress_of(&self, item_id: &str) -> Option<f64> {
        self.ctx.sink.get(item_id)
    }

    pub fn ownership_of(&self, item_id: &str) -> OwnershipRecord {
        self.ctx.store.get(item_id).unwrap_or_default()
    }

    pub fn action_for(&self, item_id: &str) -> ItemAction {
        ItemAction::for_record(self.ctx.store.get(item_id).as_ref())
    }

    pub async fn claim(&self, item_id: &str) -> Result<OwnershipRecord> {
        let record = self
            .ctx
            .store
            .merge_and_save_blocking(item_id, OwnershipPatch::claimed())
            .await?;
        tracing::info!("claimed item={}", item_id);
        Ok(record)
    }

    /// Drops a pending entry, or asks the running job to stop at its next chunk.
    pub fn cancel(&self, item_id: &str) -> bool {
        let mut state = self.lock();
        if let Some(active) = state.active.as_ref() {
            if active.item_id == item_id {
                let _ = active.cancel.send(true);
                tracing::info!("cancel requested for running install item={}", item_id);
                return true;
            }
        }

        let before = state.backlog.len();
        state
            .backlog
            .retain(|entry| entry.request.item_id != item_id);
        if state.backlog.len() == before {
            return false;
        }
        tracing::info!("removed pending install item={}", item_id);
        self.ctx.sink.emit(InstallEvent::Removed {
            item_id: item_id.to_string(),
        });
        true
    }

    pub fn worker_state(&self) -> WorkerState {
        self.lock().worker
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.worker == WorkerState::Idle && state.backlog.is_empty()
    }

    pub fn store(&self) -> &OwnershipStore {
        &self.ctx.store
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
