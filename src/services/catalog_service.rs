use std::path::Path;

use serde::Deserialize;

use crate::errors::{LauncherError, Result};
use crate::models::{CatalogGame, InstallRequest, OwnershipMap};

#[derive(Deserialize, Default)]
struct CatalogDocument {
    #[serde(default)]
    games: Vec<CatalogGame>,
}

/// Read-only view of the cached catalog document.
#[derive(Clone, Debug, Default)]
pub struct CatalogService {
    games: Vec<CatalogGame>,
}

impl CatalogService {
    /// Missing or unreadable catalogs load as empty.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!("catalog {} not readable: {}", path.display(), err);
                return Self::default();
            }
        };
        match Self::from_json(&data) {
            Ok(catalog) => {
                tracing::info!(
                    "loaded catalog {} ({} games)",
                    path.display(),
                    catalog.games.len()
                );
                catalog
            }
            Err(err) => {
                tracing::error!("failed to parse catalog {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(data)?;
        Ok(Self {
            games: document.games,
        })
    }

    pub fn games(&self) -> &[CatalogGame] {
        &self.games
    }

    pub fn find(&self, app_id: &str) -> Option<&CatalogGame> {
        let app_id = app_id.trim();
        self.games.iter().find(|game| game.app_id == app_id)
    }

    pub fn request_for(&self, app_id: &str) -> Result<InstallRequest> {
        let game = self
            .find(app_id)
            .ok_or_else(|| LauncherError::NotFound(format!("no catalog entry for {}", app_id)))?;
        if game.url.trim().is_empty() {
            return Err(LauncherError::Config(format!(
                "catalog entry {} has no download url",
                app_id
            )));
        }
        Ok(game.to_request())
    }

    /// Case-insensitive substring match on the name; an empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&CatalogGame> {
        let needle = query.trim().to_lowercase();
        self.games
            .iter()
            .filter(|game| needle.is_empty() || game.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn owned_games<'a>(&'a self, owned: &OwnershipMap) -> Vec<&'a CatalogGame> {
        self.games
            .iter()
            .filter(|game| {
                owned
                    .get(&game.app_id)
                    .map(|record| record.owned)
                    .unwrap_or(false)
            })
            .collect()
    }
}
