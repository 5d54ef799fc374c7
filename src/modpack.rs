use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{json::JsonString, serde_as};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModpackMeta {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Name of an uploaded icon, or `temp` for the placeholder.
    pub icon: String,
}

impl ModpackMeta {
    pub fn placeholder() -> Self {
        Self {
            name: "Modpack".into(),
            version: "0.0.0".into(),
            description: String::new(),
            icon: "temp".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModpackServer {
    pub id: String,
    pub name: String,
    pub url: String,
    pub versions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub project_id: String,
    pub project_name: String,
    pub project_source: String,
    #[serde(default)]
    pub applied_versions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// How an [`Item`] is stored: the lists are JSON-encoded into text columns.
#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemRow {
    project_id: String,
    project_name: String,
    project_source: String,
    #[serde_as(as = "JsonString")]
    applied_versions: Vec<String>,
    #[serde_as(as = "JsonString")]
    tags: Vec<String>,
}

impl From<Item> for ItemRow {
    fn from(item: Item) -> Self {
        let Item {
            project_id,
            project_name,
            project_source,
            applied_versions,
            tags,
        } = item;

        Self {
            project_id,
            project_name,
            project_source,
            applied_versions,
            tags,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        let ItemRow {
            project_id,
            project_name,
            project_source,
            applied_versions,
            tags,
        } = row;

        Self {
            project_id,
            project_name,
            project_source,
            applied_versions,
            tags,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemList {
    Mods,
    ResourcePacks,
    ShaderPacks,
    ConfigFiles,
}

impl ItemList {
    pub const ALL: [ItemList; 4] = [
        Self::Mods,
        Self::ResourcePacks,
        Self::ShaderPacks,
        Self::ConfigFiles,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Self::Mods => "mods",
            Self::ResourcePacks => "resource_packs",
            Self::ShaderPacks => "shader_packs",
            Self::ConfigFiles => "config_files",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Mods => "Mods",
            Self::ResourcePacks => "Resource Packs",
            Self::ShaderPacks => "Shaders",
            Self::ConfigFiles => "Config Files",
        }
    }
}

impl FromStr for ItemList {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|list| list.table() == s)
            .ok_or(())
    }
}

/// Row operations that turn the stored list into the submitted one.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ItemChanges {
    pub add: Vec<Item>,
    pub remove: Vec<String>,
    pub update: Vec<Item>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PlanError {
    EmptyId,
    DuplicateId(String),
}

impl ItemChanges {
    pub fn plan(existing: &[Item], mut incoming: Vec<Item>) -> Result<Self, PlanError> {
        for item in &mut incoming {
            item.project_id = item.project_id.trim().to_string();
        }

        let mut seen = HashSet::new();
        for item in &incoming {
            if item.project_id.is_empty() {
                return Err(PlanError::EmptyId);
            }
            if !seen.insert(item.project_id.as_str()) {
                return Err(PlanError::DuplicateId(item.project_id.clone()));
            }
        }

        let remove = existing
            .iter()
            .filter(|old| !seen.contains(old.project_id.as_str()))
            .map(|old| old.project_id.clone())
            .collect();

        let mut changes = Self {
            remove,
            ..Default::default()
        };

        for item in incoming {
            match existing.iter().find(|old| old.project_id == item.project_id) {
                None => changes.add.push(item),
                Some(old) if *old != item => changes.update.push(item),
                Some(_) => {}
            }
        }

        Ok(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }
}

/// A semantic version, optionally prefixed with `v`.
///
/// Ordered by semver precedence: pre-releases sort before their release and
/// build metadata is ignored.
#[derive(Debug, Clone)]
pub struct Version(semver::Version);

impl Version {
    fn precedence(&self) -> (u64, u64, u64, &semver::Prerelease) {
        let v = &self.0;
        (v.major, v.minor, v.patch, &v.pre)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

impl FromStr for Version {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);

        semver::Version::parse(s).map(Self).map_err(|_| ())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
