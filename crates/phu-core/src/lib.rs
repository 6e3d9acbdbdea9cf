pub mod catalog;
pub mod cloning;
pub mod commercial;
pub mod derivation;
mod error;
pub mod pool;
pub mod session;
pub mod template;
pub mod validate;

pub use catalog::PortCatalog;
pub use error::Error;
pub use session::FormSession;
pub use template::{FormTemplate, TemplateRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// --- Identifiers ---

/// Which half of a dual-site form a service block belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum Site {
    Primary,
    Backup,
}

impl Site {
    pub fn label(self) -> &'static str {
        match self {
            Site::Primary => "Primary",
            Site::Backup => "Backup",
        }
    }

    /// Suffix inserted between the base name and the index in wire names.
    pub fn id_suffix(self) -> &'static str {
        match self {
            Site::Primary => "",
            Site::Backup => "Backup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteType {
    Single,
    Dual,
}

impl SiteType {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteType::Single => "single",
            SiteType::Dual => "dual",
        }
    }

    pub fn sites(self) -> &'static [Site] {
        match self {
            SiteType::Single => &[Site::Primary],
            SiteType::Dual => &[Site::Primary, Site::Backup],
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(SiteType::Single),
            "dual" => Ok(SiteType::Dual),
            other => Err(format!("unknown site type: {other}")),
        }
    }
}

/// Identity of a live field. Service fields are addressed by site and index
/// instead of a spliced string; `wire_name` produces the submitted name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum FieldId {
    Standalone { name: String },
    Service { site: Site, index: usize, name: String },
}

impl FieldId {
    pub fn standalone(name: impl Into<String>) -> Self {
        FieldId::Standalone { name: name.into() }
    }

    pub fn service(site: Site, index: usize, name: impl Into<String>) -> Self {
        FieldId::Service {
            site,
            index,
            name: name.into(),
        }
    }

    /// Base name from the template.
    pub fn name(&self) -> &str {
        match self {
            FieldId::Standalone { name } | FieldId::Service { name, .. } => name,
        }
    }

    pub fn site(&self) -> Option<Site> {
        match self {
            FieldId::Service { site, .. } => Some(*site),
            FieldId::Standalone { .. } => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            FieldId::Service { index, .. } => Some(*index),
            FieldId::Standalone { .. } => None,
        }
    }

    /// `name` for standalone fields, `name{Site suffix}{index}` for service fields.
    pub fn wire_name(&self) -> String {
        match self {
            FieldId::Standalone { name } => name.clone(),
            FieldId::Service { site, index, name } => {
                format!("{}{}{}", name, site.id_suffix(), index)
            }
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

/// Index-free reference to a template field, used by rules and pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum FieldRef {
    Standalone { field: String },
    Service { site: Site, field: String },
}

impl FieldRef {
    pub fn field(&self) -> &str {
        match self {
            FieldRef::Standalone { field } | FieldRef::Service { field, .. } => field,
        }
    }

    pub fn matches(&self, id: &FieldId) -> bool {
        match (self, id) {
            (FieldRef::Standalone { field }, FieldId::Standalone { name }) => field == name,
            (FieldRef::Service { site, field }, FieldId::Service { site: s, name, .. }) => {
                site == s && field == name
            }
            _ => false,
        }
    }

    /// Concrete field for this reference. Service references need the index
    /// of the block they are resolved in.
    pub fn resolve(&self, index: Option<usize>) -> Option<FieldId> {
        match self {
            FieldRef::Standalone { field } => Some(FieldId::standalone(field.as_str())),
            FieldRef::Service { site, field } => {
                index.map(|i| FieldId::service(*site, i, field.as_str()))
            }
        }
    }
}

// --- Storage ---

/// Resolve the global phu directory (~/.phu/).
pub fn phu_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".phu")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Base URL of the document generation backend.
    pub backend_url: String,
    /// Where generated documents are saved. Defaults to the user's download dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backend_url: "http://127.0.0.1:5000".to_string(),
            download_dir: None,
        }
    }
}

impl Settings {
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// On-disk layout: `settings.json`, `catalog.json` and `templates/*.json`
/// under one root directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Store { root: root.into() }
    }

    pub fn open_default() -> Self {
        Store::new(phu_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    fn catalog_path(&self) -> PathBuf {
        self.root.join("catalog.json")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn read_settings(&self) -> Settings {
        let path = self.settings_path();
        if !path.exists() {
            return Settings::default();
        }
        fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn write_settings(&self, settings: &Settings) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(settings)?;
        self.write_atomic(&self.settings_path(), &json)
    }

    pub fn has_settings(&self) -> bool {
        self.settings_path().exists()
    }

    /// The user's catalog if present, the built-in one otherwise.
    pub fn read_catalog(&self) -> Result<PortCatalog, Error> {
        let path = self.catalog_path();
        if !path.exists() {
            return PortCatalog::builtin();
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// List user template names (without .json extension), sorted.
    pub fn list_templates(&self) -> Result<Vec<String>, Error> {
        let dir = self.templates_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut names: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json").map(|n| n.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn read_template(&self, name: &str) -> Result<FormTemplate, Error> {
        let path = self.templates_dir().join(format!("{}.json", name));
        let raw = fs::read_to_string(&path)?;
        let template: FormTemplate = serde_json::from_str(&raw)?;
        template.check()?;
        Ok(template)
    }

    pub fn write_template(&self, template: &FormTemplate) -> Result<(), Error> {
        template.check()?;
        let json = serde_json::to_string_pretty(template)?;
        let path = self.templates_dir().join(format!("{}.json", template.id));
        self.write_atomic(&path, &json)
    }

    /// Write via temp file + rename so readers never see a truncated file.
    fn write_atomic(&self, path: &Path, data: &str) -> Result<(), Error> {
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{}.tmp", file_name));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
