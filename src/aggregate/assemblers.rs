//! Built-in snapshot shapes.

use async_trait::async_trait;

use super::{FetchContext, Related, Snapshot, SnapshotAssembler};
use crate::catalog::EntityType;
use crate::fetch::{filter, FetchResult};
use crate::record::Record;

/// Project → asset (optional), media, checklists, defects, measurements.
#[derive(Debug, Clone)]
pub struct ProjectAssembler {
    include_asset: bool,
}

impl Default for ProjectAssembler {
    fn default() -> Self {
        Self { include_asset: true }
    }
}

impl ProjectAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the parent asset, for callers that already hold it.
    pub fn without_asset() -> Self {
        Self {
            include_asset: false,
        }
    }

    pub const ASSET: &'static str = "asset";
    pub const MEDIA: &'static str = "media";
    pub const CHECKLISTS: &'static str = "checklists";
    pub const DEFECTS: &'static str = "defects";
    pub const MEASUREMENTS: &'static str = "measurements";
}

#[async_trait]
impl SnapshotAssembler for ProjectAssembler {
    fn root_type(&self) -> EntityType {
        EntityType::PROJECT
    }

    async fn assemble(&self, ctx: &FetchContext<'_>, root_id: &str) -> FetchResult<Snapshot> {
        let project = ctx.fetch_one(&EntityType::PROJECT, root_id).await?;

        let asset = if self.include_asset {
            ctx.optional_one(&EntityType::ASSET, project.key_at("AssetId").as_deref())
                .await?
        } else {
            Related::Absent
        };

        let by_project = filter("project_id", root_id);
        let (media_type, checklist_type, defect_type, measurement_type) = (
            EntityType::INSPECTION_MEDIA,
            EntityType::CHECKLIST,
            EntityType::DEFECT,
            EntityType::MEASUREMENT,
        );
        let (media, checklists, defects, measurements) = futures::try_join!(
            ctx.fetch_many(&media_type, &by_project),
            ctx.fetch_many(&checklist_type, &by_project),
            ctx.fetch_many(&defect_type, &by_project),
            ctx.fetch_many(&measurement_type, &by_project),
        )?;

        Ok(Snapshot::new(EntityType::PROJECT, root_id, project)
            .with(Self::ASSET, asset)
            .with(Self::MEDIA, media)
            .with(Self::CHECKLISTS, checklists)
            .with(Self::DEFECTS, defects)
            .with(Self::MEASUREMENTS, measurements))
    }
}

/// Task → project (optional), then the project's assets, findings, library
/// items, measurements and media.
#[derive(Debug, Clone, Default)]
pub struct TaskAssembler;

impl TaskAssembler {
    pub const PROJECT: &'static str = "project";
    pub const ASSETS: &'static str = "assets";
    pub const FINDINGS: &'static str = "findings";
    pub const LIBRARY_ITEMS: &'static str = "library_items";
    pub const MEASUREMENTS: &'static str = "measurements";
    pub const MEDIA: &'static str = "media";

    /// Library media for every distinct library the assets point at.
    async fn library_items(ctx: &FetchContext<'_>, assets: &[Record]) -> FetchResult<Vec<Record>> {
        let mut library_ids: Vec<String> =
            assets.iter().filter_map(|a| a.key_at("LibraryId")).collect();
        library_ids.sort();
        library_ids.dedup();

        let batches = futures::future::try_join_all(library_ids.iter().map(|library_id| {
            let by_library = filter("library_id", library_id);
            async move {
                let library_media = EntityType::LIBRARY_MEDIA;
                ctx.fetch_all(&library_media, &by_library).await
            }
        }))
        .await?;
        Ok(batches.into_iter().flatten().collect())
    }
}

#[async_trait]
impl SnapshotAssembler for TaskAssembler {
    fn root_type(&self) -> EntityType {
        EntityType::TASK
    }

    async fn assemble(&self, ctx: &FetchContext<'_>, root_id: &str) -> FetchResult<Snapshot> {
        let task = ctx.fetch_one(&EntityType::TASK, root_id).await?;
        let project = ctx
            .optional_one(&EntityType::PROJECT, task.key_at("ProjectId").as_deref())
            .await?;

        let Some(project_id) = project.as_one().and_then(Record::id) else {
            let empty = || Related::Many(Vec::new());
            return Ok(Snapshot::new(EntityType::TASK, root_id, task)
                .with(Self::PROJECT, project)
                .with(Self::ASSETS, empty())
                .with(Self::FINDINGS, empty())
                .with(Self::LIBRARY_ITEMS, empty())
                .with(Self::MEASUREMENTS, empty())
                .with(Self::MEDIA, empty()));
        };

        let asset = ctx
            .optional_one(
                &EntityType::ASSET,
                project.as_one().and_then(|p| p.key_at("AssetId")).as_deref(),
            )
            .await?;
        let assets: Vec<Record> = asset.as_one().cloned().into_iter().collect();

        let by_project = filter("project_id", &project_id);
        let (defect_type, measurement_type, media_type) = (
            EntityType::DEFECT,
            EntityType::MEASUREMENT,
            EntityType::INSPECTION_MEDIA,
        );
        let (findings, measurements, media, library_items) = futures::try_join!(
            ctx.fetch_many(&defect_type, &by_project),
            ctx.fetch_many(&measurement_type, &by_project),
            ctx.fetch_many(&media_type, &by_project),
            Self::library_items(ctx, &assets),
        )?;

        Ok(Snapshot::new(EntityType::TASK, root_id, task)
            .with(Self::PROJECT, project)
            .with(Self::ASSETS, Related::Many(assets))
            .with(Self::FINDINGS, findings)
            .with(Self::LIBRARY_ITEMS, Related::Many(library_items))
            .with(Self::MEASUREMENTS, measurements)
            .with(Self::MEDIA, media))
    }
}
