//! File-backed template store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    ExportTemplate, ExportTemplateSummary, ExportTemplateType, SaveTemplateRequest,
    UpdateTemplateRequest,
};

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while managing templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("invalid template: {0}")]
    Invalid(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode templates: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Saved templates, held in memory and rewritten to one JSON file on every
/// change.
///
/// A file that cannot be parsed is treated as empty (with a warning) so a
/// damaged store never blocks exports; the next save overwrites it.
#[derive(Debug)]
pub struct TemplateStore {
    path: PathBuf,
    templates: HashMap<String, ExportTemplate>,
}

impl TemplateStore {
    /// Open the store at `path`, loading existing templates.
    pub fn open(path: impl Into<PathBuf>) -> TemplateResult<Self> {
        let path = path.into();
        let templates = load(&path)?;
        debug!(path = %path.display(), count = templates.len(), "opened template store");
        Ok(Self { path, templates })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every template, most recently updated first.
    pub fn list(&self) -> Vec<&ExportTemplate> {
        newest_first(self.templates.values())
    }

    pub fn summaries(&self) -> Vec<ExportTemplateSummary> {
        self.list().into_iter().map(ExportTemplate::summary).collect()
    }

    pub fn get(&self, id: &str) -> Option<&ExportTemplate> {
        self.templates.get(id)
    }

    /// Store a new template under a fresh id.
    pub fn save(&mut self, request: SaveTemplateRequest, created_by: &str) -> TemplateResult<ExportTemplate> {
        if request.name.trim().is_empty() {
            return Err(TemplateError::Invalid("template name is required".to_string()));
        }

        let now = Utc::now();
        let template = ExportTemplate {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            description: request.description,
            created_at: now,
            updated_at: now,
            created_by: created_by.to_string(),
            export: request.export,
        };

        let mut templates = self.templates.clone();
        templates.insert(template.id.clone(), template.clone());
        self.commit(templates)?;
        Ok(template)
    }

    /// Rename, redescribe, and optionally replace the export of a template.
    pub fn update(&mut self, request: UpdateTemplateRequest) -> TemplateResult<ExportTemplate> {
        if request.name.trim().is_empty() {
            return Err(TemplateError::Invalid("template name is required".to_string()));
        }

        let mut templates = self.templates.clone();
        let template = templates
            .get_mut(&request.id)
            .ok_or_else(|| TemplateError::NotFound(request.id.clone()))?;
        template.name = request.name;
        template.description = request.description;
        template.updated_at = Utc::now();
        if let Some(export) = request.export {
            template.export = export;
        }

        let updated = template.clone();
        self.commit(templates)?;
        Ok(updated)
    }

    /// Remove a template. Returns whether it existed.
    pub fn delete(&mut self, id: &str) -> TemplateResult<bool> {
        let mut templates = self.templates.clone();
        if templates.remove(id).is_none() {
            return Ok(false);
        }
        self.commit(templates)?;
        Ok(true)
    }

    /// Case-insensitive substring match on name or description.
    pub fn search(&self, term: &str) -> Vec<&ExportTemplate> {
        let term = term.to_lowercase();
        newest_first(self.templates.values().filter(|t| {
            t.name.to_lowercase().contains(&term) || t.description.to_lowercase().contains(&term)
        }))
    }

    pub fn by_type(&self, template_type: ExportTemplateType) -> Vec<&ExportTemplate> {
        newest_first(
            self.templates
                .values()
                .filter(|t| t.template_type() == template_type),
        )
    }

    /// Copy a template as `"<name> (Copy)"` owned by `created_by`.
    pub fn duplicate(&mut self, id: &str, created_by: &str) -> TemplateResult<ExportTemplate> {
        let original = self
            .get(id)
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;

        let request = SaveTemplateRequest {
            name: format!("{} (Copy)", original.name),
            description: original.description.clone(),
            export: original.export.clone(),
        };
        self.save(request, created_by)
    }

    /// Write `templates` to disk, then adopt them. On failure the store is
    /// left as it was.
    fn commit(&mut self, templates: HashMap<String, ExportTemplate>) -> TemplateResult<()> {
        persist(&self.path, &templates)?;
        self.templates = templates;
        Ok(())
    }
}

/// Write all templates, replacing the file atomically.
fn persist(path: &Path, templates: &HashMap<String, ExportTemplate>) -> TemplateResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| TemplateError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string_pretty(&newest_first(templates.values()))?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, json).map_err(|source| TemplateError::Io {
        path: staging.clone(),
        source,
    })?;
    fs::rename(&staging, path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn load(path: &Path) -> TemplateResult<HashMap<String, ExportTemplate>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match serde_json::from_str::<Vec<ExportTemplate>>(&content) {
        Ok(templates) => Ok(templates.into_iter().map(|t| (t.id.clone(), t)).collect()),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not parse templates, starting empty");
            Ok(HashMap::new())
        }
    }
}

fn newest_first<'a>(templates: impl Iterator<Item = &'a ExportTemplate>) -> Vec<&'a ExportTemplate> {
    let mut templates: Vec<_> = templates.collect();
    templates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.name.cmp(&b.name)));
    templates
}
