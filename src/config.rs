use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::utils::file::{write_atomic, FileManager};
use crate::utils::paths::default_games_dir;

pub const OWNERSHIP_FILE: &str = "owned.json";
pub const CATALOG_FILE: &str = "defaultneeds.json";
pub const INSTALL_FOLDER_FILE: &str = "install_folder.json";

const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    /// Bound on waiting for the response head and for each body chunk.
    pub read_timeout: Duration,
    pub use_system_proxy: bool,
    pub proxy: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECONDS),
            use_system_proxy: true,
            proxy: None,
        }
    }
}

impl HttpSettings {
    pub fn from_env() -> Self {
        let connect_seconds = env_u64("LAUNCHER_HTTP_CONNECT_TIMEOUT_SECONDS")
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS)
            .clamp(1, 120);
        let read_seconds = env_u64("LAUNCHER_HTTP_READ_TIMEOUT_SECONDS")
            .unwrap_or(DEFAULT_READ_TIMEOUT_SECONDS)
            .clamp(1, 600);
        let proxy = std::env::var("LAUNCHER_PROXY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Self {
            connect_timeout: Duration::from_secs(connect_seconds),
            read_timeout: Duration::from_secs(read_seconds),
            use_system_proxy: !env_truthy("LAUNCHER_DISABLE_SYSTEM_PROXY"),
            proxy,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LauncherConfig {
    pub files: FileManager,
    pub http: HttpSettings,
}

#[derive(Serialize, Deserialize)]
struct InstallFolderFile {
    #[serde(default)]
    path: String,
}

impl LauncherConfig {
    pub fn new(root_dir: PathBuf, install_dir: PathBuf) -> Self {
        Self {
            files: FileManager::new(root_dir, install_dir),
            http: HttpSettings::default(),
        }
    }

    /// Uses `root` for launcher state; the install folder and HTTP settings still come from
    /// `install_folder.json` and the environment.
    pub fn from_root(root: PathBuf) -> Self {
        let install_dir = load_install_folder(&root).unwrap_or_else(|| default_games_dir(&root));
        Self {
            files: FileManager::new(root, install_dir),
            http: HttpSettings::from_env(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        self.files.app_data_dir()
    }

    pub fn install_dir(&self) -> &Path {
        self.files.install_dir()
    }

    pub fn ownership_path(&self) -> PathBuf {
        self.root_dir().join(OWNERSHIP_FILE)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root_dir().join(CATALOG_FILE)
    }

    pub fn install_folder_path(&self) -> PathBuf {
        self.root_dir().join(INSTALL_FOLDER_FILE)
    }

    /// Persists the chosen install root and switches to it.
    pub fn set_install_folder(&mut self, folder: PathBuf) -> Result<()> {
        let payload = InstallFolderFile {
            path: folder.to_string_lossy().to_string(),
        };
        let json = serde_json::to_vec_pretty(&payload)?;
        write_atomic(&self.install_folder_path(), &json)?;
        tracing::info!("install folder set to {}", folder.display());
        self.files = FileManager::new(self.root_dir().to_path_buf(), folder);
        Ok(())
    }
}

pub fn load_install_folder(root: &Path) -> Option<PathBuf> {
    let path = root.join(INSTALL_FOLDER_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<InstallFolderFile>(&data) {
        Ok(parsed) if !parsed.path.trim().is_empty() => {
            tracing::info!("loaded install folder: {}", parsed.path);
            Some(PathBuf::from(parsed.path.trim()))
        }
        Ok(_) => None,
        Err(err) => {
            tracing::warn!("ignoring unreadable {}: {}", path.display(), err);
            None
        }
    }
}

pub fn env_truthy(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(false)
}

pub fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sketchy-config-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp root");
        dir
    }

    #[test]
    fn install_folder_survives_reload() {
        let root = temp_root();
        let mut config = LauncherConfig::new(root.clone(), root.join("games"));
        assert_eq!(load_install_folder(&root), None);

        let chosen = root.join("library");
        config
            .set_install_folder(chosen.clone())
            .expect("persist install folder");
        assert_eq!(config.install_dir(), chosen.as_path());
        assert_eq!(load_install_folder(&root), Some(chosen));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn from_root_reads_the_persisted_install_folder() {
        let root = temp_root();
        assert_eq!(
            LauncherConfig::from_root(root.clone()).install_dir(),
            default_games_dir(&root).as_path()
        );

        let chosen = root.join("elsewhere");
        LauncherConfig::from_root(root.clone())
            .set_install_folder(chosen.clone())
            .expect("persist install folder");
        let reloaded = LauncherConfig::from_root(root.clone());
        assert_eq!(reloaded.install_dir(), chosen.as_path());
        assert_eq!(reloaded.root_dir(), root.as_path());
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn garbage_install_folder_file_is_ignored() {
        let root = temp_root();
        std::fs::write(root.join(INSTALL_FOLDER_FILE), "not json").expect("write garbage");
        assert_eq!(load_install_folder(&root), None);
        std::fs::write(root.join(INSTALL_FOLDER_FILE), r#"{"path": "  "}"#).expect("write blank");
        assert_eq!(load_install_folder(&root), None);
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn files_live_under_root() {
        let config = LauncherConfig::new(PathBuf::from("/srv/launcher"), PathBuf::from("/games"));
        assert_eq!(
            config.ownership_path(),
            PathBuf::from("/srv/launcher/owned.json")
        );
        assert_eq!(
            config.catalog_path(),
            PathBuf::from("/srv/launcher/defaultneeds.json")
        );
        assert_eq!(config.http.read_timeout, Duration::from_secs(10));
    }
}
