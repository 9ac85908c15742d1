use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::errors::{LauncherError, Result};

/// Unpacks `archive_path` into `install_dir`, then deletes the archive whatever happened.
///
/// Files written before an extraction error stay where they are.
pub async fn install_archive(archive_path: &Path, install_dir: &Path) -> Result<usize> {
    let archive = archive_path.to_path_buf();
    let destination = install_dir.to_path_buf();
    let result = tokio::task::spawn_blocking(move || extract_zip_archive(&archive, &destination))
        .await
        .map_err(|err| LauncherError::Archive(err.to_string()));

    if let Err(err) = tokio::fs::remove_file(archive_path).await {
        tracing::warn!(
            "failed to remove archive {}: {}",
            archive_path.display(),
            err
        );
    }

    result?
}

pub fn extract_zip_archive(archive_path: &Path, install_dir: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().replace('\\', "/");
        if name.is_empty() {
            continue;
        }
        let entry_path = PathBuf::from(&name);
        if !is_safe_relative_path(&entry_path) {
            tracing::warn!(
                "skipping archive entry outside install dir: {} ({})",
                name,
                archive_path.display()
            );
            continue;
        }
        let out_path = install_dir.join(&entry_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&out_path)?;
        io::copy(&mut entry, &mut outfile)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // owner keeps rw so a reinstall can overwrite the file
            if let Some(mode) = entry.unix_mode() {
                let mode = (mode & 0o777) | 0o600;
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
            }
        }
        written += 1;
    }
    tracing::info!(
        "extracted {} files from {} into {}",
        written,
        archive_path.display(),
        install_dir.display()
    );
    Ok(written)
}

pub fn is_safe_relative_path(path: &Path) -> bool {
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => return false,
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{temp_dir, zip_bytes};

    #[tokio::test]
    async fn extracts_nested_entries_and_removes_archive() {
        let dir = temp_dir("archive-ok");
        let archive = dir.join("Foo.zip");
        std::fs::write(
            &archive,
            zip_bytes(&[("Foo", b"binary"), ("data/levels/1.txt", b"level one")]),
        )
        .expect("write archive");

        let written = install_archive(&archive, &dir).await.expect("extract");
        assert_eq!(written, 2);
        assert_eq!(std::fs::read(dir.join("Foo")).expect("read exe"), b"binary");
        assert_eq!(
            std::fs::read_to_string(dir.join("data/levels/1.txt")).expect("read level"),
            "level one"
        );
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn corrupt_archive_fails_but_is_still_removed() {
        let dir = temp_dir("archive-corrupt");
        let archive = dir.join("Bad.zip");
        std::fs::write(&archive, b"definitely not a zip file").expect("write archive");

        let err = install_archive(&archive, &dir).await.expect_err("must fail");
        assert!(matches!(err, LauncherError::Archive(_)));
        assert!(!archive.exists());
    }

    #[test]
    fn entries_escaping_the_destination_are_skipped() {
        let dir = temp_dir("archive-slip");
        let install_dir = dir.join("Game");
        std::fs::create_dir_all(&install_dir).expect("create install dir");
        let archive = dir.join("slip.zip");
        std::fs::write(
            &archive,
            zip_bytes(&[("../evil.txt", b"nope"), ("ok.txt", b"fine")]),
        )
        .expect("write archive");

        let written = extract_zip_archive(&archive, &install_dir).expect("extract");
        assert_eq!(written, 1);
        assert!(install_dir.join("ok.txt").exists());
        assert!(!dir.join("evil.txt").exists());
    }

    #[test]
    fn safe_path_check() {
        assert!(is_safe_relative_path(Path::new("bin/game.exe")));
        assert!(!is_safe_relative_path(Path::new("../game.exe")));
        assert!(!is_safe_relative_path(Path::new("/usr/bin/game")));
    }
}
