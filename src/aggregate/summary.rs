//! Roll-ups over fetched collections.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::record::{Record, Value};

const UNKNOWN: &str = "Unknown";

/// Defect counts by severity, status and type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DefectSummary {
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    #[serde(skip)]
    pub defects: Vec<Record>,
}

impl DefectSummary {
    /// Count `defects`; missing or blank values land in `"Unknown"`.
    pub fn from_defects(defects: Vec<Record>) -> Self {
        let mut summary = DefectSummary {
            total: defects.len(),
            ..Default::default()
        };
        for defect in &defects {
            *summary.by_severity.entry(bucket(defect, "Severity")).or_default() += 1;
            *summary.by_status.entry(bucket(defect, "Status")).or_default() += 1;
            *summary.by_type.entry(bucket(defect, "DefectType")).or_default() += 1;
        }
        summary.defects = defects;
        summary
    }
}

/// Workspace-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkspaceSummary {
    pub workspaces: Vec<Record>,
    pub total_users: usize,
    pub active_users: usize,
    pub total_projects: usize,
    pub total_assets: usize,
}

impl WorkspaceSummary {
    pub fn new(
        workspaces: Vec<Record>,
        users: &[Record],
        projects: &[Record],
        assets: &[Record],
    ) -> Self {
        Self {
            workspaces,
            total_users: users.len(),
            active_users: users
                .iter()
                .filter(|u| matches!(u.field("IsActive"), Some(Value::Bool(true))))
                .count(),
            total_projects: projects.len(),
            total_assets: assets.len(),
        }
    }
}

fn bucket(record: &Record, field: &str) -> String {
    record
        .lookup(field)
        .map(Value::render)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}
