//! Entity type names and their normalization.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A logical entity type name (`Project`, `Asset`, `Defect`, ...).
///
/// Constructing an `EntityType` always normalizes the name, so surface
/// spellings such as `"assets"`, `"asset"` and `"Asset"` compare equal.
/// Unknown names are kept as given (trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
    pub const PROJECT: EntityType = EntityType::canonical("Project");
    pub const ASSET: EntityType = EntityType::canonical("Asset");
    pub const DEFECT: EntityType = EntityType::canonical("Defect");
    pub const DEFECT_OVERLAY: EntityType = EntityType::canonical("DefectOverlay");
    pub const CHECKLIST: EntityType = EntityType::canonical("Checklist");
    pub const MEASUREMENT: EntityType = EntityType::canonical("Measurement");
    pub const INSPECTION_MEDIA: EntityType = EntityType::canonical("InspectionMedia");
    pub const LIBRARY: EntityType = EntityType::canonical("Library");
    pub const LIBRARY_MEDIA: EntityType = EntityType::canonical("LibraryMedia");
    pub const USER: EntityType = EntityType::canonical("User");
    pub const WORKSPACE: EntityType = EntityType::canonical("Workspace");
    pub const TASK: EntityType = EntityType::canonical("Task");

    /// Every canonical type the backend exposes.
    pub const ALL: [EntityType; 12] = [
        Self::PROJECT,
        Self::ASSET,
        Self::DEFECT,
        Self::DEFECT_OVERLAY,
        Self::CHECKLIST,
        Self::MEASUREMENT,
        Self::INSPECTION_MEDIA,
        Self::LIBRARY,
        Self::LIBRARY_MEDIA,
        Self::USER,
        Self::WORKSPACE,
        Self::TASK,
    ];

    const fn canonical(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Normalize a surface name into an entity type.
    pub fn new(name: &str) -> Self {
        match ALIASES.get(alias_key(name).as_str()) {
            Some(canonical) => Self(Cow::Borrowed(canonical)),
            None => Self(Cow::Owned(name.trim().to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the backend's canonical types.
    pub fn is_known(&self) -> bool {
        Self::ALL.iter().any(|known| known == self)
    }

    /// Case-insensitive comparison against another (normalized) name.
    pub fn matches(&self, other: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(EntityType::new(other).as_str())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&EntityType> for EntityType {
    fn from(entity_type: &EntityType) -> Self {
        entity_type.clone()
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.0.into_owned()
    }
}

/// Lowercase with separators removed: `Inspection-Media` → `inspectionmedia`.
fn alias_key(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let table: &[(&str, &[&str])] = &[
        ("Project", &["project", "projects", "workorder", "workorders"]),
        ("Asset", &["asset", "assets"]),
        ("Defect", &["defect", "defects", "finding", "findings"]),
        ("DefectOverlay", &["defectoverlay", "defectoverlays", "overlay", "overlays"]),
        ("Checklist", &["checklist", "checklists"]),
        ("Measurement", &["measurement", "measurements", "cml", "cmls"]),
        ("InspectionMedia", &["inspectionmedia", "inspectionmedias", "media"]),
        ("Library", &["library", "libraries"]),
        ("LibraryMedia", &["librarymedia", "libraryitem", "libraryitems"]),
        ("User", &["user", "users"]),
        ("Workspace", &["workspace", "workspaces"]),
        ("Task", &["task", "tasks"]),
    ];

    table
        .iter()
        .flat_map(|(canonical, aliases)| aliases.iter().map(move |alias| (*alias, *canonical)))
        .collect()
});
