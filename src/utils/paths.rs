use std::path::{Path, PathBuf};

const PORTABLE_MARKER: &str = "portable.config.json";

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn is_portable_root(path: &Path) -> bool {
    path.join(PORTABLE_MARKER).exists()
}

fn dir_from_env(key: &str) -> Option<PathBuf> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    ensure_dir(&PathBuf::from(trimmed))
}

/// Directory holding the catalog cache, `owned.json` and `install_folder.json`.
pub fn resolve_root_dir() -> PathBuf {
    if let Some(dir) = dir_from_env("LAUNCHER_ROOT_DIR") {
        return dir;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if is_portable_root(dir) {
                return dir.to_path_buf();
            }
        }
    }

    PathBuf::from(".")
}

pub fn resolve_log_dir(root: &Path) -> PathBuf {
    if let Some(dir) = dir_from_env("LAUNCHER_LOG_DIR") {
        return dir;
    }

    let root_logs = root.join("logs");
    if let Some(found) = ensure_dir(&root_logs) {
        return found;
    }

    PathBuf::from("logs")
}

/// Fallback install root when no folder was chosen yet.
pub fn default_games_dir(root: &Path) -> PathBuf {
    if let Some(dir) = dir_from_env("LAUNCHER_INSTALL_DIR") {
        return dir;
    }
    root.join("games")
}
