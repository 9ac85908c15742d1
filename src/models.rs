use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{LauncherError, Result};

/// One installable item as submitted to the install queue.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstallRequest {
    pub item_id: String,
    pub name: String,
    pub url: String,
    /// Launchable binary relative to the install directory.
    #[serde(default)]
    pub exe_path: Option<String>,
}

impl InstallRequest {
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            url: url.into(),
            exe_path: None,
        }
    }

    pub fn with_exe_path(mut self, exe_path: impl Into<String>) -> Self {
        let exe_path = exe_path.into();
        self.exe_path = if exe_path.trim().is_empty() {
            None
        } else {
            Some(exe_path)
        };
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnershipRecord {
    #[serde(default)]
    pub owned: bool,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default)]
    pub exe_path: String,
}

impl OwnershipRecord {
    pub fn apply(&mut self, patch: &OwnershipPatch) {
        if let Some(owned) = patch.owned {
            self.owned = owned;
        }
        if let Some(downloaded) = patch.downloaded {
            self.downloaded = downloaded;
        }
        if let Some(exe_path) = patch.exe_path.as_ref() {
            self.exe_path = exe_path.clone();
        }
    }

    /// Write-side invariants. Reads never call this.
    pub fn validate(&self) -> Result<()> {
        if self.downloaded && !self.owned {
            return Err(LauncherError::InvalidRecord(
                "downloaded item must be owned".to_string(),
            ));
        }
        if self.downloaded && self.exe_path.trim().is_empty() {
            return Err(LauncherError::InvalidRecord(
                "downloaded item needs an exe_path".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial ownership update; `None` keeps whatever is stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnershipPatch {
    pub owned: Option<bool>,
    pub downloaded: Option<bool>,
    pub exe_path: Option<String>,
}

impl OwnershipPatch {
    pub fn claimed() -> Self {
        Self {
            owned: Some(true),
            ..Self::default()
        }
    }

    pub fn installed(exe_path: impl Into<String>) -> Self {
        Self {
            owned: Some(true),
            downloaded: Some(true),
            exe_path: Some(exe_path.into()),
        }
    }
}

pub type OwnershipMap = BTreeMap<String, OwnershipRecord>;

/// Which button the UI offers for an item.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    Claim,
    Download,
    Play,
}

impl ItemAction {
    pub fn for_record(record: Option<&OwnershipRecord>) -> Self {
        match record {
            None => ItemAction::Claim,
            Some(record) if !record.owned => ItemAction::Claim,
            Some(record) if !record.downloaded || record.exe_path.trim().is_empty() => {
                ItemAction::Download
            }
            Some(_) => ItemAction::Play,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemAction::Claim => "Claim",
            ItemAction::Download => "Download",
            ItemAction::Play => "Play",
        }
    }
}

/// Entry of the cached catalog document.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CatalogGame {
    #[serde(deserialize_with = "deserialize_app_id")]
    pub app_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub exe_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CatalogGame {
    pub fn display_name(&self) -> String {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            format!("Game {}", self.app_id)
        } else {
            trimmed.to_string()
        }
    }

    pub fn to_request(&self) -> InstallRequest {
        let request = InstallRequest::new(self.app_id.clone(), self.display_name(), self.url.clone());
        match self.exe_path.as_deref() {
            Some(exe_path) => request.with_exe_path(exe_path),
            None => request,
        }
    }
}

fn deserialize_app_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(value) => Ok(value.to_string()),
        RawId::Text(value) => Ok(value.trim().to_string()),
    }
}
