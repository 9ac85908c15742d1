use std::path::Path;
use std::process::Command;

use crate::errors::{LauncherError, Result};
use crate::models::{ItemAction, OwnershipRecord};

/// Spawns the executable with its own directory as working directory and returns the pid.
///
/// The child is not waited on; it outlives the launcher.
pub fn launch_game(exe_path: &Path) -> Result<u32> {
    if !exe_path.is_file() {
        return Err(LauncherError::NotFound(format!(
            "executable {} is missing",
            exe_path.display()
        )));
    }
    let working_dir = exe_path.parent().unwrap_or_else(|| Path::new("."));
    let child = Command::new(exe_path).current_dir(working_dir).spawn()?;
    let pid = child.id();
    tracing::info!(
        "launched pid={} exe={} cwd={}",
        pid,
        exe_path.display(),
        working_dir.display()
    );
    Ok(pid)
}

/// Play action: only items recorded as installed can be launched.
pub fn launch_installed(item_id: &str, record: &OwnershipRecord) -> Result<u32> {
    if ItemAction::for_record(Some(record)) != ItemAction::Play {
        return Err(LauncherError::NotFound(format!(
            "item {} is not installed",
            item_id
        )));
    }
    launch_game(Path::new(&record.exe_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_dir;

    #[test]
    fn refuses_items_that_are_not_installed() {
        let claimed = OwnershipRecord {
            owned: true,
            ..OwnershipRecord::default()
        };
        assert!(matches!(
            launch_installed("1", &claimed),
            Err(LauncherError::NotFound(_))
        ));
        let missing = OwnershipRecord {
            owned: true,
            downloaded: true,
            exe_path: "/definitely/not/here/game".to_string(),
        };
        assert!(matches!(
            launch_installed("1", &missing),
            Err(LauncherError::NotFound(_))
        ));
    }

    #[test]
    fn directories_are_not_launchable() {
        let dir = temp_dir("launch-dir");
        assert!(matches!(
            launch_game(&dir),
            Err(LauncherError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn runs_from_the_game_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_dir("launch");
        let exe = dir.join("Foo");
        std::fs::write(&exe, "#!/bin/sh\npwd > launched_from.txt\n").expect("write script");
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");

        let record = OwnershipRecord {
            owned: true,
            downloaded: true,
            exe_path: exe.to_string_lossy().to_string(),
        };
        let pid = launch_installed("42", &record).expect("launch");
        assert!(pid > 0);

        let marker = dir.join("launched_from.txt");
        let mut recorded = String::new();
        for _ in 0..200 {
            recorded = std::fs::read_to_string(&marker).unwrap_or_default();
            if recorded.ends_with('\n') {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(
            Path::new(recorded.trim()).canonicalize().expect("canonical recorded"),
            dir.canonicalize().expect("canonical dir")
        );
    }
}
