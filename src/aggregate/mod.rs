//! Bounded snapshot aggregation.
//!
//! Fetches a root entity plus its dependent collections for many roots at
//! once, with a fixed ceiling on assemblies in flight.
//!
//! # Architecture
//!
//! ```text
//!   (index, root id) ──▶ buffer_unordered(max_concurrency) ──▶ sort by index ──▶ results
//!                                      │
//!                                      ▼
//!                     SnapshotAssembler::assemble(ctx, id)
//!                          │ mandatory: ctx.fetch_one / fetch_all
//!                          │ optional:  ctx.optional_one → Related::Absent on failure
//!                          ▼
//!                     FetchContext ──(CancelSignal::run)──▶ EntityFetcher
//! ```
//!
//! Batches are fail-together: every item runs to completion, then the call
//! fails if any mandatory fetch failed, reporting each failure alongside the
//! snapshots that did complete. Cancellation discards everything.

mod assemblers;
mod cancel;
mod error;
mod snapshot;
mod summary;

pub use assemblers::{ProjectAssembler, TaskAssembler};
pub use cancel::CancelSignal;
pub use error::{GatherError, GatherResult, ItemFailure};
pub use snapshot::{FetchContext, Related, Snapshot, SnapshotAssembler};
pub use summary::{DefectSummary, WorkspaceSummary};

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::EntityType;
use crate::fetch::{filter, EntityFetcher, FetchError, FetchResult, Filters};
use crate::record::Record;

/// Default number of snapshot assemblies in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// An asset with every project that references it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSnapshot {
    pub asset: Record,
    pub projects: Vec<Record>,
    pub project_snapshots: Vec<Snapshot>,
}

/// Gathers snapshots through an [`EntityFetcher`].
#[derive(Clone)]
pub struct Aggregator {
    fetcher: Arc<dyn EntityFetcher>,
    max_concurrency: usize,
    cancel: CancelSignal,
}

impl Aggregator {
    pub fn new(fetcher: Arc<dyn EntityFetcher>) -> Self {
        Self {
            fetcher,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cancel: CancelSignal::new(),
        }
    }

    /// Set the ceiling on assemblies in flight. Zero is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    fn context(&self) -> FetchContext<'_> {
        FetchContext::new(self.fetcher.as_ref(), &self.cancel)
    }

    /// Assemble one snapshot. A failed mandatory fetch is returned as-is.
    pub async fn gather_snapshot(
        &self,
        root_id: &str,
        assembler: &dyn SnapshotAssembler,
    ) -> GatherResult<Snapshot> {
        if self.cancel.is_cancelled() {
            return Err(GatherError::Cancelled);
        }
        Ok(assembler.assemble(&self.context(), root_id).await?)
    }

    /// Assemble a snapshot per root id, at most `max_concurrency` at a time.
    ///
    /// Results are in input order. See the module docs for the failure
    /// policy.
    pub async fn gather_many(
        &self,
        root_ids: &[String],
        assembler: &dyn SnapshotAssembler,
    ) -> GatherResult<Vec<Snapshot>> {
        debug!(
            root_type = %assembler.root_type(),
            roots = root_ids.len(),
            max_concurrency = self.max_concurrency,
            "gathering snapshots"
        );

        let ctx = &self.context();
        let mut indexed: Vec<(usize, FetchResult<Snapshot>)> =
            stream::iter(root_ids.iter().enumerate())
                .map(|(index, root_id)| async move {
                    // Items not yet admitted when the signal fires never start
                    if ctx.is_cancelled() {
                        return (index, Err(FetchError::Cancelled));
                    }
                    (index, assembler.assemble(ctx, root_id).await)
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
        // Completion order; restore input order
        indexed.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<FetchResult<Snapshot>> =
            indexed.into_iter().map(|(_, outcome)| outcome).collect();

        let cancelled = outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(e) if e.is_cancelled()));
        if cancelled || self.cancel.is_cancelled() {
            info!("snapshot gathering cancelled, discarding partial results");
            return Err(GatherError::Cancelled);
        }

        let mut failures = Vec::new();
        let mut partial = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(snapshot) => partial.push(Some(snapshot)),
                Err(error) => {
                    warn!(root_id = %root_ids[index], %error, "snapshot assembly failed");
                    failures.push(ItemFailure {
                        index,
                        root_id: root_ids[index].clone(),
                        error,
                    });
                    partial.push(None);
                }
            }
        }

        if failures.is_empty() {
            Ok(partial.into_iter().flatten().collect())
        } else {
            Err(GatherError::Failed { failures, partial })
        }
    }

    /// List roots matching `filters`, keep the first `max_roots`, and gather
    /// a snapshot for each.
    pub async fn gather_by_filter(
        &self,
        filters: &Filters,
        assembler: &dyn SnapshotAssembler,
        max_roots: Option<usize>,
    ) -> GatherResult<Vec<Snapshot>> {
        let root_type = assembler.root_type();
        let roots = self.context().fetch_all(&root_type, filters).await?;

        let mut root_ids: Vec<String> = roots
            .iter()
            .filter_map(|root| {
                let id = root.id();
                if id.is_none() {
                    warn!(%root_type, "skipping root record without an id");
                }
                id
            })
            .collect();
        if let Some(max_roots) = max_roots {
            root_ids.truncate(max_roots);
        }

        self.gather_many(&root_ids, assembler).await
    }

    /// An asset, the projects that reference it, and a snapshot per project
    /// (without re-fetching the asset).
    pub async fn gather_asset(&self, asset_id: &str) -> GatherResult<AssetSnapshot> {
        let ctx = self.context();
        let asset = ctx.fetch_one(&EntityType::ASSET, asset_id).await?;
        let projects = ctx
            .fetch_all(&EntityType::PROJECT, &filter("asset_search", asset_id))
            .await?;

        let project_ids: Vec<String> = projects.iter().filter_map(Record::id).collect();
        let project_snapshots = self
            .gather_many(&project_ids, &ProjectAssembler::without_asset())
            .await?;

        Ok(AssetSnapshot {
            asset,
            projects,
            project_snapshots,
        })
    }

    /// Defect counts over every defect matching `filters`.
    pub async fn defects_summary(&self, filters: &Filters) -> GatherResult<DefectSummary> {
        let defects = self.context().fetch_all(&EntityType::DEFECT, filters).await?;
        Ok(DefectSummary::from_defects(defects))
    }

    /// Workspace, user, project and asset counts.
    pub async fn workspace_summary(&self) -> GatherResult<WorkspaceSummary> {
        let ctx = self.context();
        let everything = Filters::new();
        let (workspace_type, user_type, project_type, asset_type) = (
            EntityType::WORKSPACE,
            EntityType::USER,
            EntityType::PROJECT,
            EntityType::ASSET,
        );
        let (workspaces, users, projects, assets) = futures::try_join!(
            ctx.fetch_all(&workspace_type, &everything),
            ctx.fetch_all(&user_type, &everything),
            ctx.fetch_all(&project_type, &everything),
            ctx.fetch_all(&asset_type, &everything),
        )?;
        Ok(WorkspaceSummary::new(workspaces, &users, &projects, &assets))
    }
}
