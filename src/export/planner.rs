//! Export planning: fetch what the mappings need, resolve every cell.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use super::{
    ExportError, ExportResult, FieldMapping, MultiSheetExportRequest, Sheet,
    SheetConfiguration, Workbook,
};
use crate::aggregate::CancelSignal;
use crate::catalog::{EntityType, RelationshipCatalog};
use crate::fetch::{EntityFetcher, Filters};
use crate::record::Record;
use crate::resolve::{required_related_entities, required_related_entities_for_sheets, FieldResolver};

/// Plans single- and multi-sheet exports.
#[derive(Clone)]
pub struct ExportPlanner {
    fetcher: Arc<dyn EntityFetcher>,
    catalog: Arc<RelationshipCatalog>,
    cancel: CancelSignal,
}

impl ExportPlanner {
    pub fn new(fetcher: Arc<dyn EntityFetcher>, catalog: Arc<RelationshipCatalog>) -> Self {
        Self {
            fetcher,
            catalog,
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn catalog(&self) -> &RelationshipCatalog {
        &self.catalog
    }

    /// Plan one sheet.
    ///
    /// Fetches the root type and every related type its qualified mappings
    /// join to. Fails with [`ExportError::NoData`] when no rows remain.
    pub async fn plan_single_sheet(&self, config: &SheetConfiguration) -> ExportResult<Sheet> {
        validate_sheet(config)?;
        let entity_type = config.normalized_entity_type();

        let mut types = required_related_entities(&self.catalog, &entity_type, &config.mappings);
        types.insert(entity_type.clone());

        let resolver = self.resolver_for(&types).await?;
        let sheet = build_sheet(config, &resolver, config_sheet_name(config));

        if sheet.is_empty() {
            return Err(ExportError::NoData { entity_type });
        }
        info!(sheet = %sheet.name, rows = sheet.row_count(), "planned sheet");
        Ok(sheet)
    }

    /// Plan every sheet of a workbook.
    ///
    /// With `link_related_data` each entity type is fetched once and shared by
    /// all sheets; otherwise every sheet fetches its own. Sheets without rows
    /// are left out, and a workbook with none fails with
    /// [`ExportError::EmptyWorkbook`].
    pub async fn plan_multi_sheet(&self, request: &MultiSheetExportRequest) -> ExportResult<Workbook> {
        if request.sheets.is_empty() {
            return Err(ExportError::InvalidRequest("no sheets configured".to_string()));
        }
        for config in &request.sheets {
            validate_sheet(config)?;
        }

        let mut names = SheetNames::default();
        let mut sheets = Vec::new();

        if request.link_related_data {
            let required = required_related_entities_for_sheets(&self.catalog, &request.sheets);
            let types: BTreeSet<EntityType> = required
                .into_iter()
                .flat_map(|(root, related)| std::iter::once(root).chain(related))
                .collect();
            debug!(types = types.len(), "fetching shared entity set");

            let resolver = self.resolver_for(&types).await?;
            for config in &request.sheets {
                let sheet = build_sheet(config, &resolver, names.claim(config_sheet_name(config)));
                push_non_empty(&mut sheets, sheet);
            }
        } else {
            for config in &request.sheets {
                let entity_type = config.normalized_entity_type();
                let mut types = required_related_entities(&self.catalog, &entity_type, &config.mappings);
                types.insert(entity_type);

                let resolver = self.resolver_for(&types).await?;
                let sheet = build_sheet(config, &resolver, names.claim(config_sheet_name(config)));
                push_non_empty(&mut sheets, sheet);
            }
        }

        if sheets.is_empty() {
            return Err(ExportError::EmptyWorkbook);
        }
        info!(sheets = sheets.len(), "planned workbook");
        Ok(Workbook::new(sheets))
    }

    /// Fetch every type in `types` and index them.
    async fn resolver_for(&self, types: &BTreeSet<EntityType>) -> ExportResult<FieldResolver> {
        let collections = self.fetch_collections(types).await?;
        Ok(FieldResolver::build(collections, Arc::clone(&self.catalog)))
    }

    async fn fetch_collections(
        &self,
        types: &BTreeSet<EntityType>,
    ) -> ExportResult<HashMap<EntityType, Vec<Record>>> {
        let everything = &Filters::new();
        let fetches = types.iter().map(|entity_type| async move {
            let records = self
                .cancel
                .run(self.fetcher.fetch_all(entity_type, everything))
                .await
                .map_err(|err| ExportError::fetch(entity_type, err))?;
            debug!(%entity_type, count = records.len(), "fetched collection");
            Ok::<_, ExportError>((entity_type.clone(), records))
        });
        Ok(try_join_all(fetches).await?.into_iter().collect())
    }
}

fn validate_sheet(config: &SheetConfiguration) -> ExportResult<()> {
    if config.entity_type.trim().is_empty() {
        return Err(ExportError::InvalidRequest("entity type is required".to_string()));
    }
    if config.selected_mappings().next().is_none() {
        return Err(ExportError::InvalidRequest(format!(
            "no fields selected for {}",
            config.entity_type
        )));
    }
    Ok(())
}

fn config_sheet_name(config: &SheetConfiguration) -> String {
    let name = config.sheet_name.trim();
    if name.is_empty() {
        config.normalized_entity_type().to_string()
    } else {
        name.to_string()
    }
}

fn push_non_empty(sheets: &mut Vec<Sheet>, sheet: Sheet) {
    if sheet.is_empty() {
        info!(sheet = %sheet.name, "skipping sheet with no rows");
    } else {
        sheets.push(sheet);
    }
}

/// Resolve one sheet's rows against a built resolver.
fn build_sheet(config: &SheetConfiguration, resolver: &FieldResolver, name: String) -> Sheet {
    let entity_type = config.normalized_entity_type();
    let mappings: Vec<&FieldMapping> = config.selected_mappings().collect();

    let rows = source_records(config, &entity_type, resolver)
        .into_iter()
        .map(|record| {
            mappings
                .iter()
                .map(|m| resolver.resolve_cell(record, &m.api_field, &entity_type))
                .collect()
        })
        .collect();

    Sheet {
        name,
        entity_type,
        start_row: config.effective_start_row(),
        headers: mappings.iter().map(|m| m.column_name().to_string()).collect(),
        rows,
    }
}

/// The sheet's records after the optional parent filter.
fn source_records<'r>(
    config: &SheetConfiguration,
    entity_type: &EntityType,
    resolver: &'r FieldResolver,
) -> Vec<&'r Record> {
    let records = resolver.cache().records(entity_type);

    let Some((parent_type, parent_id)) = config.parent_filter() else {
        return records.iter().collect();
    };

    let Some(rel) = resolver
        .catalog()
        .relationship_to(entity_type.as_str(), parent_type.as_str())
    else {
        warn!(
            %entity_type,
            %parent_type,
            "no relationship to filter parent, sheet has no rows"
        );
        return Vec::new();
    };

    records
        .iter()
        .filter(|record| record.key_at(&rel.source_key).as_deref() == Some(parent_id))
        .collect()
}

/// Hands out unique sheet names, suffixing repeats with ` (2)`, ` (3)`, ...
#[derive(Debug, Default)]
struct SheetNames {
    taken: HashSet<String>,
}

impl SheetNames {
    fn claim(&mut self, name: String) -> String {
        if self.taken.insert(name.to_lowercase()) {
            return name;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{} ({})", name, n);
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
