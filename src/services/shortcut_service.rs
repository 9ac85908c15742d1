use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;

use crate::errors::{LauncherError, Result};
use crate::utils::file::write_atomic;

/// Writes a best-effort desktop entry on a blocking thread and returns at once.
///
/// The handle yields the written file, or `None` when the platform has no supported shortcut
/// format or the write failed (logged).
pub fn spawn_shortcut(exe_path: PathBuf, display_name: String) -> JoinHandle<Option<PathBuf>> {
    match applications_dir() {
        Ok(dir) => spawn_shortcut_in(dir, exe_path, display_name),
        Err(err) => {
            tracing::warn!("shortcut for {} skipped: {}", display_name, err);
            tokio::task::spawn_blocking(|| None)
        }
    }
}

fn spawn_shortcut_in(
    applications_dir: Option<PathBuf>,
    exe_path: PathBuf,
    display_name: String,
) -> JoinHandle<Option<PathBuf>> {
    tokio::task::spawn_blocking(move || {
        let Some(dir) = applications_dir else {
            tracing::info!(
                "shortcut creation not supported on this platform; skipped {} ({})",
                display_name,
                exe_path.display()
            );
            return None;
        };
        match write_desktop_entry(&dir, &exe_path, &display_name) {
            Ok(path) => {
                tracing::info!("created shortcut {} for {}", path.display(), display_name);
                Some(path)
            }
            Err(err) => {
                tracing::warn!("shortcut creation failed for {}: {}", display_name, err);
                None
            }
        }
    })
}

#[cfg(target_os = "linux")]
fn applications_dir() -> Result<Option<PathBuf>> {
    let home = dirs::home_dir()
        .ok_or_else(|| LauncherError::Config("home directory not found".to_string()))?;
    Ok(Some(home.join(".local/share/applications")))
}

#[cfg(not(target_os = "linux"))]
fn applications_dir() -> Result<Option<PathBuf>> {
    Ok(None)
}

pub fn write_desktop_entry(
    applications_dir: &Path,
    exe_path: &Path,
    display_name: &str,
) -> Result<PathBuf> {
    if display_name.trim().is_empty() {
        return Err(LauncherError::Config(
            "shortcut needs a display name".to_string(),
        ));
    }
    std::fs::create_dir_all(applications_dir)?;
    let path = applications_dir.join(format!("{}.desktop", desktop_file_stem(display_name)));
    write_atomic(&path, desktop_entry_contents(exe_path, display_name).as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(path)
}

pub fn desktop_entry_contents(exe_path: &Path, display_name: &str) -> String {
    let working_dir = exe_path
        .parent()
        .map(|dir| dir.to_string_lossy().to_string())
        .unwrap_or_default();
    format!(
        r#"[Desktop Entry]
Type=Application
Name={}
Exec="{}"
Path={}
Terminal=false
Categories=Game;
"#,
        display_name.trim(),
        exe_path.to_string_lossy(),
        working_dir
    )
}

fn desktop_file_stem(display_name: &str) -> String {
    display_name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect()
}
