use std::collections::HashMap;
use std::process::ExitCode;

use clap::Parser;
use tokio::runtime::Runtime;

use sketchy_launcher::cli::{Args, Cmd};
use sketchy_launcher::config::LauncherConfig;
use sketchy_launcher::errors::{LauncherError, Result};
use sketchy_launcher::logging::{self, LogSettings};
use sketchy_launcher::models::ItemAction;
use sketchy_launcher::services::game_launcher::launch_installed;
use sketchy_launcher::services::shortcut_service::spawn_shortcut;
use sketchy_launcher::services::{
    CatalogService, EventReceiver, InstallEvent, InstallQueue, JobOutcome,
    OwnershipStore,
};
use sketchy_launcher::utils::paths::{resolve_log_dir, resolve_root_dir};

fn main() -> ExitCode {
    let args = Args::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(args, &runtime) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args, runtime: &Runtime) -> Result<()> {
    let root = args.root.unwrap_or_else(resolve_root_dir);
    logging::init(&LogSettings::new(resolve_log_dir(&root), args.verbose))?;
    let mut config = LauncherConfig::from_root(root);
    tracing::info!(
        "launcher root={} install_dir={}",
        config.root_dir().display(),
        config.install_dir().display()
    );

    match args.sub {
        Cmd::List { search, owned } => {
            let catalog = CatalogService::load(&config.catalog_path());
            let store = OwnershipStore::open(config.ownership_path());
            let snapshot = store.snapshot();
            let owned_ids: Vec<&str> = catalog
                .owned_games(&snapshot)
                .into_iter()
                .map(|game| game.app_id.as_str())
                .collect();
            for game in catalog.search(search.as_deref().unwrap_or_default()) {
                if owned && !owned_ids.contains(&game.app_id.as_str()) {
                    continue;
                }
                let action = ItemAction::for_record(snapshot.get(&game.app_id));
                println!("{}\t{}\t[{}]", game.app_id, game.display_name(), action.label());
            }
            Ok(())
        }
        Cmd::Claim { app_id } => {
            let catalog = CatalogService::load(&config.catalog_path());
            let game = catalog
                .find(&app_id)
                .ok_or_else(|| LauncherError::NotFound(format!("no catalog entry for {}", app_id)))?;
            let (queue, _events) = InstallQueue::from_config(&config, runtime.handle().clone())?;
            runtime.block_on(queue.claim(&game.app_id))?;
            println!("claimed {}", game.display_name());
            Ok(())
        }
        Cmd::Install {
            app_ids,
            no_shortcut,
        } => {
            let catalog = CatalogService::load(&config.catalog_path());
            let (queue, mut events) = InstallQueue::from_config(&config, runtime.handle().clone())?;
            let mut expected = 0;
            for app_id in &app_ids {
                let request = catalog.request_for(app_id)?;
                if queue.action_for(&request.item_id) == ItemAction::Claim {
                    eprintln!("{} is not owned yet; claim it first", request.name);
                    continue;
                }
                if queue.enqueue(request) {
                    expected += 1;
                }
            }
            if expected == 0 {
                return Ok(());
            }
            let failed = runtime.block_on(drain_events(&mut events, expected, !no_shortcut));
            if failed > 0 {
                return Err(LauncherError::Config(format!(
                    "{} of {} installs failed",
                    failed, expected
                )));
            }
            Ok(())
        }
        Cmd::Play { app_id } => {
            let catalog = CatalogService::load(&config.catalog_path());
            let store = OwnershipStore::open(config.ownership_path());
            let record = store.get(app_id.trim()).unwrap_or_default();
            let title = catalog
                .find(&app_id)
                .map(|game| game.display_name())
                .unwrap_or_else(|| app_id.clone());
            let pid = launch_installed(app_id.trim(), &record)?;
            println!("started {} (pid {})", title, pid);
            Ok(())
        }
        Cmd::SetInstallFolder { path } => {
            config.set_install_folder(path)?;
            println!("install folder: {}", config.install_dir().display());
            Ok(())
        }
    }
}

/// UI loop: renders worker events until `expected` jobs finished, then waits for shortcut
/// writes it handed off. Returns the failure count.
async fn drain_events(events: &mut EventReceiver, expected: usize, shortcuts: bool) -> usize {
    let mut finished = 0;
    let mut failed = 0;
    let mut shown_percent: HashMap<String, u32> = HashMap::new();
    let mut pending_shortcuts = Vec::new();

    while finished < expected {
        let Some(event) = events.recv().await else {
            break;
        };
        match event {
            InstallEvent::Queued { item_id, position } => {
                println!("[{}] queued (position {})", item_id, position + 1);
            }
            InstallEvent::Removed { item_id } => println!("[{}] removed", item_id),
            InstallEvent::PhaseChanged { item_id, phase } => {
                println!("[{}] {}", item_id, phase.label());
            }
            InstallEvent::Progress { item_id, fraction } => {
                let percent = (fraction * 100.0).round() as u32;
                let last = shown_percent.entry(item_id.clone()).or_insert(0);
                if percent == 0 || percent >= *last + 10 || percent == 100 {
                    *last = percent;
                    println!("[{}] {:>3}%", item_id, percent);
                }
            }
            InstallEvent::ShortcutRequested {
                exe_path,
                display_name,
            } => {
                if !shortcuts {
                    continue;
                }
                pending_shortcuts.push(spawn_shortcut(exe_path, display_name));
            }
            InstallEvent::Finished { report } => {
                finished += 1;
                match &report.outcome {
                    JobOutcome::Installed { exe_path } => {
                        println!("[{}] installed: {}", report.item_id, exe_path.display());
                    }
                    JobOutcome::Failed { kind, message } => {
                        failed += 1;
                        println!("[{}] failed ({:?}): {}", report.item_id, kind, message);
                    }
                }
            }
        }
    }

    for shortcut in pending_shortcuts {
        if let Ok(Some(path)) = shortcut.await {
            println!("shortcut: {}", path.display());
        }
    }
    failed
}
