use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Clone, Debug)]
pub struct FileManager {
    app_data_dir: PathBuf,
    install_dir: PathBuf,
}

impl FileManager {
    pub fn new(app_data_dir: PathBuf, install_dir: PathBuf) -> Self {
        Self {
            app_data_dir,
            install_dir,
        }
    }

    pub fn app_data_dir(&self) -> &Path {
        &self.app_data_dir
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn get_game_dir(&self, game_name: &str) -> PathBuf {
        self.install_dir.join(sanitize_dir_name(game_name))
    }

    /// Temporary archive location inside the game's own directory.
    pub fn archive_path(&self, game_name: &str) -> PathBuf {
        let token = sanitize_dir_name(game_name);
        self.install_dir
            .join(&token)
            .join(format!("{}.{}", token, ARCHIVE_EXTENSION))
    }
}

/// Replaces a file's contents through a sibling temp file and a rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    if let Some(parent) = temp_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)?;
    Ok(())
}

fn sanitize_dir_name(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn game_dirs_stay_inside_install_root() {
        let files = FileManager::new(PathBuf::from("/data"), PathBuf::from("/games"));
        assert_eq!(files.get_game_dir("Foo"), PathBuf::from("/games/Foo"));
        assert_eq!(files.get_game_dir("../etc"), PathBuf::from("/games/.._etc"));
        assert_eq!(files.get_game_dir(".."), PathBuf::from("/games/_"));
        assert_eq!(
            files.archive_path("Foo"),
            PathBuf::from("/games/Foo/Foo.zip")
        );
    }

    #[test]
    fn write_atomic_replaces_contents_without_leftovers() {
        let dir = std::env::temp_dir().join(format!("sketchy-file-test-{}", Uuid::new_v4()));
        let path = dir.join("owned.json");
        write_atomic(&path, b"{}").expect("first write");
        write_atomic(&path, b"{\"1\":{}}").expect("second write");
        assert_eq!(
            fs::read_to_string(&path).expect("read back"),
            "{\"1\":{}}"
        );
        assert!(!path.with_extension("tmp").exists());
        let _ = fs::remove_dir_all(dir);
    }
}
