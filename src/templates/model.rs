//! Saved template model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::EntityType;
use crate::export::{ExportRequest, MultiSheetExportRequest};

/// Kind of export a template describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportTemplateType {
    SingleSheet,
    MultiSheet,
}

impl std::fmt::Display for ExportTemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportTemplateType::SingleSheet => write!(f, "single-sheet"),
            ExportTemplateType::MultiSheet => write!(f, "multi-sheet"),
        }
    }
}

/// The export a template replays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateConfig {
    SingleSheet(ExportRequest),
    MultiSheet(MultiSheetExportRequest),
}

impl TemplateConfig {
    pub fn template_type(&self) -> ExportTemplateType {
        match self {
            TemplateConfig::SingleSheet(_) => ExportTemplateType::SingleSheet,
            TemplateConfig::MultiSheet(_) => ExportTemplateType::MultiSheet,
        }
    }

    /// Normalized entity types involved, comma-separated, first-seen order.
    pub fn entity_types_summary(&self) -> String {
        match self {
            TemplateConfig::SingleSheet(request) => EntityType::new(&request.entity_type).to_string(),
            TemplateConfig::MultiSheet(request) => {
                let mut seen: Vec<EntityType> = Vec::new();
                for sheet in &request.sheets {
                    let entity_type = sheet.normalized_entity_type();
                    if !seen.contains(&entity_type) {
                        seen.push(entity_type);
                    }
                }
                seen.iter().map(EntityType::as_str).collect::<Vec<_>>().join(", ")
            }
        }
    }

    /// Selected mappings across every sheet.
    pub fn field_count(&self) -> usize {
        match self {
            TemplateConfig::SingleSheet(request) => {
                request.mappings.iter().filter(|m| m.is_selected).count()
            }
            TemplateConfig::MultiSheet(request) => request
                .sheets
                .iter()
                .map(|s| s.selected_mappings().count())
                .sum(),
        }
    }

    pub fn sheet_count(&self) -> usize {
        match self {
            TemplateConfig::SingleSheet(_) => 1,
            TemplateConfig::MultiSheet(request) => request.sheets.len(),
        }
    }
}

/// A saved, reusable export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    pub export: TemplateConfig,
}

impl ExportTemplate {
    pub fn template_type(&self) -> ExportTemplateType {
        self.export.template_type()
    }

    pub fn summary(&self) -> ExportTemplateSummary {
        ExportTemplateSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            template_type: self.template_type(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by.clone(),
            entity_types: self.export.entity_types_summary(),
            field_count: self.export.field_count(),
            sheet_count: self.export.sheet_count(),
        }
    }
}

/// Listing view of a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportTemplateSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub template_type: ExportTemplateType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub entity_types: String,
    pub field_count: usize,
    pub sheet_count: usize,
}

/// Input for saving a new template.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaveTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub export: TemplateConfig,
}

/// Input for updating a template. A missing export keeps the current one.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct UpdateTemplateRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub export: Option<TemplateConfig>,
}
