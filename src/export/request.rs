//! Export request model.
//!
//! Field names accept both snake_case and the camelCase spelling used by
//! saved templates and request files (`apiField`, `excelColumn`, ...).

use serde::{Deserialize, Serialize};

use crate::catalog::EntityType;

fn default_true() -> bool {
    true
}

fn default_start_row() -> usize {
    1
}

/// One output column: which field to read and what to call it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Direct path (`Name`, `parent.name`) or one-hop join (`Asset.Name`).
    #[serde(alias = "apiField", alias = "apiFieldPath")]
    pub api_field: String,

    /// Header text; blank falls back to `api_field`.
    #[serde(default, alias = "excelColumn", alias = "outputColumnName")]
    pub output_column: String,

    #[serde(default = "default_true", alias = "isSelected")]
    pub is_selected: bool,
}

impl FieldMapping {
    pub fn new(api_field: impl Into<String>) -> Self {
        Self {
            api_field: api_field.into(),
            output_column: String::new(),
            is_selected: true,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.output_column = column.into();
        self
    }

    pub fn deselected(mut self) -> Self {
        self.is_selected = false;
        self
    }

    /// The header for this column.
    pub fn column_name(&self) -> &str {
        if self.output_column.trim().is_empty() {
            &self.api_field
        } else {
            &self.output_column
        }
    }
}

/// A single-sheet export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(alias = "entityType")]
    pub entity_type: String,

    #[serde(alias = "fieldMappings")]
    pub mappings: Vec<FieldMapping>,
}

impl ExportRequest {
    pub fn new(entity_type: impl Into<String>, mappings: Vec<FieldMapping>) -> Self {
        Self {
            entity_type: entity_type.into(),
            mappings,
        }
    }
}

/// One sheet of a multi-sheet export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfiguration {
    #[serde(alias = "sheetName")]
    pub sheet_name: String,

    #[serde(alias = "entityType")]
    pub entity_type: String,

    #[serde(alias = "fieldMappings")]
    pub mappings: Vec<FieldMapping>,

    /// 1-based row of the header; data follows directly below.
    #[serde(default = "default_start_row", alias = "startRow")]
    pub start_row: usize,

    #[serde(default, alias = "filterByParentId")]
    pub filter_by_parent_id: Option<String>,

    #[serde(default, alias = "filterByParentType")]
    pub filter_by_parent_type: Option<String>,
}

impl SheetConfiguration {
    pub fn new(
        sheet_name: impl Into<String>,
        entity_type: impl Into<String>,
        mappings: Vec<FieldMapping>,
    ) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            entity_type: entity_type.into(),
            mappings,
            start_row: 1,
            filter_by_parent_id: None,
            filter_by_parent_type: None,
        }
    }

    pub fn starting_at(mut self, start_row: usize) -> Self {
        self.start_row = start_row;
        self
    }

    /// Keep only records whose link to `parent_type` points at `parent_id`.
    pub fn filtered_by(mut self, parent_type: impl Into<String>, parent_id: impl Into<String>) -> Self {
        self.filter_by_parent_type = Some(parent_type.into());
        self.filter_by_parent_id = Some(parent_id.into());
        self
    }

    pub fn normalized_entity_type(&self) -> EntityType {
        EntityType::new(&self.entity_type)
    }

    pub fn selected_mappings(&self) -> impl Iterator<Item = &FieldMapping> {
        self.mappings.iter().filter(|m| m.is_selected)
    }

    /// The parent filter, when both halves are set and non-blank.
    pub fn parent_filter(&self) -> Option<(EntityType, &str)> {
        let parent_type = self.filter_by_parent_type.as_deref()?.trim();
        let parent_id = self.filter_by_parent_id.as_deref()?.trim();
        if parent_type.is_empty() || parent_id.is_empty() {
            return None;
        }
        Some((EntityType::new(parent_type), parent_id))
    }

    /// The effective header row.
    pub fn effective_start_row(&self) -> usize {
        self.start_row.max(1)
    }
}

impl From<ExportRequest> for SheetConfiguration {
    fn from(request: ExportRequest) -> Self {
        let name = EntityType::new(&request.entity_type).to_string();
        SheetConfiguration::new(name, request.entity_type, request.mappings)
    }
}

/// A multi-sheet export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSheetExportRequest {
    pub sheets: Vec<SheetConfiguration>,

    /// Fetch each entity type once and share it across sheets.
    #[serde(default = "default_true", alias = "linkRelatedData")]
    pub link_related_data: bool,
}

impl MultiSheetExportRequest {
    pub fn new(sheets: Vec<SheetConfiguration>) -> Self {
        Self {
            sheets,
            link_related_data: true,
        }
    }

    pub fn unlinked(mut self) -> Self {
        self.link_related_data = false;
        self
    }
}
