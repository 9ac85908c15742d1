use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::HttpSettings;
use crate::errors::{ErrorKind, LauncherError, Result};
use crate::models::{InstallRequest, OwnershipPatch};
use crate::services::archive_installer::{install_archive, is_safe_relative_path};
use crate::services::progress_sink::{InstallEvent, ProgressSink};
use crate::services::ownership_store::OwnershipStore;
use crate::utils::file::FileManager;

/// Downloads only ever report up to this fraction; extraction and recording own the rest.
pub const DOWNLOAD_PROGRESS_CEILING: f64 = 0.9;
const PROGRESS_REPORT_STEP: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    Queued,
    Preparing,
    Downloading,
    Extracting,
    Recording,
    PostInstall,
    Installed,
    Failed,
}

impl InstallPhase {
    fn rank(self) -> u8 {
        match self {
            InstallPhase::Queued => 0,
            InstallPhase::Preparing => 1,
            InstallPhase::Downloading => 2,
            InstallPhase::Extracting => 3,
            InstallPhase::Recording => 4,
            InstallPhase::PostInstall => 5,
            InstallPhase::Installed => 6,
            InstallPhase::Failed => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InstallPhase::Installed | InstallPhase::Failed)
    }

    /// Phases only move forward one step at a time; any live phase may fail.
    pub fn can_advance_to(self, next: InstallPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            InstallPhase::Failed => true,
            InstallPhase::Queued => false,
            _ => next.rank() == self.rank() + 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InstallPhase::Queued => "Queued",
            InstallPhase::Preparing => "Preparing",
            InstallPhase::Downloading => "Downloading",
            InstallPhase::Extracting => "Extracting",
            InstallPhase::Recording => "Recording",
            InstallPhase::PostInstall => "Finishing",
            InstallPhase::Installed => "Installed",
            InstallPhase::Failed => "Failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Installed { exe_path: PathBuf },
    Failed { kind: ErrorKind, message: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct JobReport {
    pub item_id: String,
    pub name: String,
    pub outcome: JobOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, JobOutcome::Installed { .. })
    }
}

/// Shared collaborators every job runs against.
#[derive(Clone)]
pub struct JobContext {
    pub client: reqwest::Client,
    pub files: FileManager,
    pub store: OwnershipStore,
    pub sink: ProgressSink,
    pub read_timeout: Duration,
}

pub fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .tcp_nodelay(true);

    if !settings.use_system_proxy {
        builder = builder.no_proxy();
    }

    if let Some(proxy_url) = settings.proxy.as_deref() {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => {
                builder = builder.proxy(proxy);
                tracing::info!("using launcher proxy: {}", proxy_url);
            }
            Err(err) => tracing::warn!("invalid LAUNCHER_PROXY '{}': {}", proxy_url, err),
        }
    }

    Ok(builder.build()?)
}

/// `<name>.<EXE_EXTENSION>`: `Foo.exe` on Windows, plain `Foo` on Linux and macOS where the
/// platform extension is empty.
pub fn default_exe_file_name(game_name: &str) -> String {
    let extension = std::env::consts::EXE_EXTENSION;
    if extension.is_empty() {
        game_name.to_string()
    } else {
        format!("{}.{}", game_name, extension)
    }
}

/// Empty paths and paths made only of `.` components point at the install dir itself.
fn names_a_file(relative: &Path) -> bool {
    relative
        .components()
        .any(|component| matches!(component, Component::Normal(_)))
}

struct ProgressReporter {
    last_reported: f64,
}

impl ProgressReporter {
    fn new() -> Self {
        Self { last_reported: 0.0 }
    }

    fn should_report(&mut self, fraction: f64) -> bool {
        let grew_enough = fraction - self.last_reported >= PROGRESS_REPORT_STEP;
        let reached_ceiling = fraction >= DOWNLOAD_PROGRESS_CEILING && fraction > self.last_reported;
        if grew_enough || reached_ceiling {
            self.last_reported = fraction;
            return true;
        }
        false
    }
}

/// One item's download → extract → record → post-install run.
pub struct InstallJob {
    request: InstallRequest,
    install_dir: PathBuf,
    archive_path: PathBuf,
    phase: InstallPhase,
    cancel: watch::Receiver<bool>,
}

impl InstallJob {
    pub fn new(request: InstallRequest, files: &FileManager, cancel: watch::Receiver<bool>) -> Self {
        let install_dir = files.get_game_dir(&request.name);
        let archive_path = files.archive_path(&request.name);
        Self {
            request,
            install_dir,
            archive_path,
            phase: InstallPhase::Queued,
            cancel,
        }
    }

    /// `exe_path` from the request when it names a file inside the install dir, otherwise
    /// the default executable name.
    pub fn expected_exe_path(&self) -> PathBuf {
        if let Some(relative) = self.request.exe_path.as_deref() {
            let relative = Path::new(relative.trim());
            if !names_a_file(relative) {
                tracing::debug!(
                    "no usable exe_path for item={}, using default name",
                    self.request.item_id
                );
            } else if is_safe_relative_path(relative) {
                return self.install_dir.join(relative);
            } else {
                tracing::warn!(
                    "ignoring exe_path outside install dir for item={}: {}",
                    self.request.item_id,
                    relative.display()
                );
            }
        }
        let dir_name = self
            .install_dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.request.name.clone());
        self.install_dir.join(default_exe_file_name(&dir_name))
    }

    /// Always ends in `Installed` or `Failed`; errors never escape.
    pub async fn run(mut self, ctx: &JobContext) -> JobReport {
        let started_at = Utc::now();
        tracing::info!(
            "install started item={} name={} url={}",
            self.request.item_id,
            self.request.name,
            self.request.url
        );

        let outcome = match self.execute(ctx).await {
            Ok(exe_path) => {
                if let Err(err) = self.transition(ctx, InstallPhase::Installed) {
                    tracing::warn!("{}", err);
                }
                tracing::info!(
                    "install finished item={} exe={}",
                    self.request.item_id,
                    exe_path.display()
                );
                JobOutcome::Installed { exe_path }
            }
            Err(err) => {
                tracing::error!(
                    "install failed item={} name={} phase={:?} error={}",
                    self.request.item_id,
                    self.request.name,
                    self.phase,
                    err
                );
                ctx.sink.set(&self.request.item_id, 0.0);
                if let Err(transition_err) = self.transition(ctx, InstallPhase::Failed) {
                    tracing::warn!("{}", transition_err);
                }
                JobOutcome::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        };

        JobReport {
            item_id: self.request.item_id.clone(),
            name: self.request.name.clone(),
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn execute(&mut self, ctx: &JobContext) -> Result<PathBuf> {
        self.transition(ctx, InstallPhase::Preparing)?;
        tokio::fs::create_dir_all(&self.install_dir).await?;

        self.transition(ctx, InstallPhase::Downloading)?;
        if let Err(err) = self.download(ctx).await {
            let _ = tokio::fs::remove_file(&self.archive_path).await;
            return Err(err);
        }

        self.transition(ctx, InstallPhase::Extracting)?;
        install_archive(&self.archive_path, &self.install_dir).await?;

        self.transition(ctx, InstallPhase::Recording)?;
        let exe_path = self.expected_exe_path();
        ctx.store
            .merge_and_save_blocking(
                &self.request.item_id,
                OwnershipPatch::installed(exe_path.to_string_lossy().to_string()),
            )
            .await?;
        ctx.sink.set(&self.request.item_id, 1.0);

        self.transition(ctx, InstallPhase::PostInstall)?;
        self.post_install(ctx, &exe_path).await;

        Ok(exe_path)
    }

    async fn download(&mut self, ctx: &JobContext) -> Result<()> {
        let item_id = self.request.item_id.clone();
        let url = self.request.url.clone();
        self.check_cancelled()?;

        let response = timeout(ctx.read_timeout, ctx.client.get(&url).send())
            .await
            .map_err(|_| {
                LauncherError::Timeout(format!(
                    "no response from {} within {:?}",
                    url, ctx.read_timeout
                ))
            })??;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::Http(format!("{} returned {}", url, status)));
        }

        let total_bytes = response.content_length().filter(|length| *length > 0);
        let mut file = tokio::fs::File::create(&self.archive_path).await?;
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut reporter = ProgressReporter::new();

        loop {
            self.check_cancelled()?;
            let next = timeout(ctx.read_timeout, stream.next())
                .await
                .map_err(|_| {
                    LauncherError::Timeout(format!(
                        "download of {} stalled for {:?}",
                        url, ctx.read_timeout
                    ))
                })?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received = received.saturating_add(chunk.len() as u64);

            if let Some(total) = total_bytes {
                let fraction =
                    (received as f64 / total as f64).min(1.0) * DOWNLOAD_PROGRESS_CEILING;
                if reporter.should_report(fraction) {
                    ctx.sink.set(&item_id, fraction);
                }
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if reporter.last_reported < DOWNLOAD_PROGRESS_CEILING {
            ctx.sink.set(&item_id, DOWNLOAD_PROGRESS_CEILING);
        }
        tracing::info!(
            "downloaded item={} bytes={} expected={:?} to {}",
            item_id,
            received,
            total_bytes,
            self.archive_path.display()
        );
        Ok(())
    }

    async fn post_install(&self, ctx: &JobContext, exe_path: &Path) {
        match tokio::fs::try_exists(exe_path).await {
            Ok(true) => ctx.sink.emit(InstallEvent::ShortcutRequested {
                exe_path: exe_path.to_path_buf(),
                display_name: self.request.name.clone(),
            }),
            Ok(false) => tracing::info!(
                "no executable at {} for item={}; skipping shortcut",
                exe_path.display(),
                self.request.item_id
            ),
            Err(err) => tracing::warn!(
                "could not check {} for item={}: {}",
                exe_path.display(),
                self.request.item_id,
                err
            ),
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if *self.cancel.borrow() {
            return Err(LauncherError::Cancelled(format!(
                "install of {} cancelled",
                self.request.item_id
            )));
        }
        Ok(())
    }

    fn transition(&mut self, ctx: &JobContext, next: InstallPhase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(LauncherError::Config(format!(
                "illegal install phase change {:?} -> {:?} for item {}",
                self.phase, next, self.request.item_id
            )));
        }
        self.phase = next;
        ctx.sink.set_phase(&self.request.item_id, next);
        Ok(())
    }
}
