// tests/aggregate/gather_test.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tabula::aggregate::{
    Aggregator, CancelSignal, FetchContext, GatherError, ProjectAssembler, Related, Snapshot,
    SnapshotAssembler, TaskAssembler,
};
use tabula::fetch::{filter, FetchResult, Filters, InMemoryFetcher};
use tabula::{EntityType, Record, Value};

fn project(id: &str, asset_id: &str) -> Record {
    Record::new()
        .with("Id", id)
        .with("Name", format!("Inspection {id}"))
        .with("AssetId", asset_id)
}

fn child(id: &str, project_id: &str) -> Record {
    Record::new().with("Id", id).with("ProjectId", project_id)
}

fn site() -> InMemoryFetcher {
    InMemoryFetcher::new()
        .with_records(
            EntityType::PROJECT,
            (1..=8).map(|n| project(&format!("P{n}"), "A1")).collect(),
        )
        .with_records(
            EntityType::ASSET,
            vec![Record::new()
                .with("Id", "A1")
                .with("Name", "Pump")
                .with("LibraryId", "L1")],
        )
        .with_records(
            EntityType::DEFECT,
            vec![
                child("D1", "P1")
                    .with("Severity", "High")
                    .with("Status", "Open")
                    .with("DefectType", "Corrosion"),
                child("D2", "P1").with("Severity", "Low").with("Status", "Open"),
                child("D3", "P2").with("Severity", "High").with("Status", ""),
            ],
        )
        .with_records(EntityType::CHECKLIST, vec![child("C1", "P1")])
        .with_records(EntityType::MEASUREMENT, vec![child("M1", "P2")])
        .with_records(EntityType::INSPECTION_MEDIA, vec![child("IM1", "P1")])
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Fetches only the root, after a per-root delay.
struct DelayedRootAssembler;

#[async_trait]
impl SnapshotAssembler for DelayedRootAssembler {
    fn root_type(&self) -> EntityType {
        EntityType::PROJECT
    }

    async fn assemble(&self, ctx: &FetchContext<'_>, root_id: &str) -> FetchResult<Snapshot> {
        // Later roots finish first
        let n: u64 = root_id.trim_start_matches('P').parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(80u64.saturating_sub(n * 10))).await;
        let root = ctx.fetch_one(&EntityType::PROJECT, root_id).await?;
        Ok(Snapshot::new(EntityType::PROJECT, root_id, root))
    }
}

#[tokio::test]
async fn test_project_snapshot_contents() {
    let aggregator = Aggregator::new(Arc::new(site()));

    let snapshot = aggregator
        .gather_snapshot("P1", &ProjectAssembler::new())
        .await
        .unwrap();

    assert_eq!(snapshot.root_id, "P1");
    assert_eq!(
        snapshot.one(ProjectAssembler::ASSET).and_then(|a| a.field("Name")),
        Some(&Value::from("Pump"))
    );
    assert_eq!(snapshot.many(ProjectAssembler::DEFECTS).len(), 2);
    assert_eq!(snapshot.many(ProjectAssembler::CHECKLISTS).len(), 1);
    assert_eq!(snapshot.many(ProjectAssembler::MEDIA).len(), 1);
    assert!(snapshot.many(ProjectAssembler::MEASUREMENTS).is_empty());
}

#[tokio::test]
async fn test_missing_asset_is_absent_not_an_error() {
    let fetcher = site().with_records(EntityType::PROJECT, vec![project("P99", "A404")]);
    let aggregator = Aggregator::new(Arc::new(fetcher));

    let snapshot = aggregator
        .gather_snapshot("P99", &ProjectAssembler::new())
        .await
        .unwrap();
    assert!(snapshot.is_absent(ProjectAssembler::ASSET));
}

#[tokio::test]
async fn test_missing_root_fails() {
    let aggregator = Aggregator::new(Arc::new(site()));
    let err = aggregator
        .gather_snapshot("P404", &ProjectAssembler::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatherError::Fetch(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn test_gather_many_preserves_input_order() {
    let aggregator = Aggregator::new(Arc::new(site())).with_max_concurrency(4);
    let roots = ids(&["P1", "P2", "P3", "P4", "P5", "P6", "P7"]);

    let snapshots = aggregator.gather_many(&roots, &DelayedRootAssembler).await.unwrap();

    let got: Vec<&str> = snapshots.iter().map(|s| s.root_id.as_str()).collect();
    assert_eq!(got, ["P1", "P2", "P3", "P4", "P5", "P6", "P7"]);
}

#[tokio::test]
async fn test_gather_many_respects_concurrency_ceiling() {
    let fetcher = Arc::new(site().with_latency(Duration::from_millis(20)));
    let aggregator = Aggregator::new(fetcher.clone()).with_max_concurrency(3);
    let roots = ids(&["P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8"]);

    let snapshots = aggregator.gather_many(&roots, &DelayedRootAssembler).await.unwrap();

    assert_eq!(snapshots.len(), 8);
    assert!(fetcher.peak_in_flight() <= 3, "peak {}", fetcher.peak_in_flight());
    assert_eq!(fetcher.fetch_one_calls(&EntityType::PROJECT), 8);
}

/// Records completion order; `P1` is much slower than the rest.
#[derive(Default)]
struct SlowFirstAssembler {
    finished: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl SnapshotAssembler for SlowFirstAssembler {
    fn root_type(&self) -> EntityType {
        EntityType::PROJECT
    }

    async fn assemble(&self, ctx: &FetchContext<'_>, root_id: &str) -> FetchResult<Snapshot> {
        let delay = if root_id == "P1" { 300 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let root = ctx.fetch_one(&EntityType::PROJECT, root_id).await?;
        self.finished.lock().unwrap().push(root_id.to_string());
        Ok(Snapshot::new(EntityType::PROJECT, root_id, root))
    }
}

#[tokio::test]
async fn test_slow_root_does_not_block_admission() {
    let aggregator = Aggregator::new(Arc::new(site())).with_max_concurrency(2);
    let assembler = SlowFirstAssembler::default();
    let roots = ids(&["P1", "P2", "P3", "P4", "P5"]);

    let snapshots = aggregator.gather_many(&roots, &assembler).await.unwrap();

    let got: Vec<&str> = snapshots.iter().map(|s| s.root_id.as_str()).collect();
    assert_eq!(got, ["P1", "P2", "P3", "P4", "P5"]);
    // The free slot keeps admitting later roots while P1 is still running
    let finished = assembler.finished.lock().unwrap().clone();
    assert_eq!(finished, ["P2", "P3", "P4", "P5", "P1"]);
}

#[tokio::test]
async fn test_zero_concurrency_is_clamped() {
    let aggregator = Aggregator::new(Arc::new(site())).with_max_concurrency(0);
    assert_eq!(aggregator.max_concurrency(), 1);

    let snapshots = aggregator
        .gather_many(&ids(&["P1", "P2"]), &DelayedRootAssembler)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 2);
}

#[tokio::test]
async fn test_gather_many_fails_together() {
    let fetcher = site().failing_one(EntityType::PROJECT, "P2");
    let aggregator = Aggregator::new(Arc::new(fetcher));
    let roots = ids(&["P1", "P2", "P3"]);

    let err = aggregator
        .gather_many(&roots, &ProjectAssembler::new())
        .await
        .unwrap_err();

    let (failures, partial) = match err {
        GatherError::Failed { failures, partial } => (failures, partial),
        other => panic!("expected a batch failure, got {other:?}"),
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 1);
    assert_eq!(failures[0].root_id, "P2");
    assert_eq!(partial.len(), 3);
    assert_eq!(partial[0].as_ref().map(|s| s.root_id.as_str()), Some("P1"));
    assert!(partial[1].is_none());
    assert_eq!(partial[2].as_ref().map(|s| s.root_id.as_str()), Some("P3"));
}

#[tokio::test]
async fn test_cancellation_discards_results() {
    let fetcher = site().with_latency(Duration::from_millis(200));
    let cancel = CancelSignal::new();
    let aggregator = Aggregator::new(Arc::new(fetcher))
        .with_max_concurrency(2)
        .with_cancel(cancel.clone());
    let roots = ids(&["P1", "P2", "P3", "P4", "P5", "P6"]);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = aggregator
        .gather_many(&roots, &ProjectAssembler::new())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let cancel = CancelSignal::new();
    cancel.cancel();
    let fetcher = Arc::new(site());
    let aggregator = Aggregator::new(fetcher.clone()).with_cancel(cancel);

    let err = aggregator
        .gather_many(&ids(&["P1", "P2"]), &ProjectAssembler::new())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_gather_by_filter_with_limit() {
    let fetcher = site().with_records(EntityType::PROJECT, vec![project("P20", "A2")]);
    let aggregator = Aggregator::new(Arc::new(fetcher));

    let snapshots = aggregator
        .gather_by_filter(&filter("asset_search", "A1"), &ProjectAssembler::without_asset(), Some(3))
        .await
        .unwrap();

    let got: Vec<&str> = snapshots.iter().map(|s| s.root_id.as_str()).collect();
    assert_eq!(got, ["P1", "P2", "P3"]);
    assert!(snapshots.iter().all(|s| s.is_absent(ProjectAssembler::ASSET)));
}

#[tokio::test]
async fn test_gather_asset() {
    let fetcher = Arc::new(site());
    let aggregator = Aggregator::new(fetcher.clone());

    let asset = aggregator.gather_asset("A1").await.unwrap();

    assert_eq!(asset.asset.id().as_deref(), Some("A1"));
    assert_eq!(asset.projects.len(), 8);
    assert_eq!(asset.project_snapshots.len(), 8);
    // The asset is fetched once, not once per project
    assert_eq!(fetcher.fetch_one_calls(&EntityType::ASSET), 1);
}

#[tokio::test]
async fn test_task_snapshot() {
    let fetcher = site()
        .with_records(
            EntityType::TASK,
            vec![
                Record::new().with("Id", "T1").with("ProjectId", "P1"),
                Record::new().with("Id", "T2"),
            ],
        )
        .with_records(
            EntityType::LIBRARY_MEDIA,
            vec![
                Record::new().with("Id", "LM1").with("LibraryId", "L1"),
                Record::new().with("Id", "LM2").with("LibraryId", "L2"),
            ],
        );
    let aggregator = Aggregator::new(Arc::new(fetcher));

    let snapshots = aggregator
        .gather_many(&ids(&["T1", "T2"]), &TaskAssembler)
        .await
        .unwrap();

    let linked = &snapshots[0];
    assert_eq!(linked.one(TaskAssembler::PROJECT).and_then(Record::id).as_deref(), Some("P1"));
    assert_eq!(linked.many(TaskAssembler::ASSETS).len(), 1);
    assert_eq!(linked.many(TaskAssembler::FINDINGS).len(), 2);
    assert_eq!(linked.many(TaskAssembler::MEDIA).len(), 1);
    let library: Vec<_> = linked
        .many(TaskAssembler::LIBRARY_ITEMS)
        .iter()
        .filter_map(Record::id)
        .collect();
    assert_eq!(library, ["LM1"]);

    let orphan = &snapshots[1];
    assert!(orphan.is_absent(TaskAssembler::PROJECT));
    assert!(matches!(orphan.get(TaskAssembler::FINDINGS), Some(Related::Many(v)) if v.is_empty()));
}

#[tokio::test]
async fn test_defects_summary() {
    let aggregator = Aggregator::new(Arc::new(site()));

    let summary = aggregator.defects_summary(&Filters::new()).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.by_severity.get("High"), Some(&2));
    assert_eq!(summary.by_status.get("Open"), Some(&2));
    assert_eq!(summary.by_status.get("Unknown"), Some(&1));
    assert_eq!(summary.by_type.get("Unknown"), Some(&2));

    let scoped = aggregator
        .defects_summary(&filter("project_id", "P2"))
        .await
        .unwrap();
    assert_eq!(scoped.total, 1);
}

#[tokio::test]
async fn test_workspace_summary() {
    let fetcher = site()
        .with_records(EntityType::WORKSPACE, vec![Record::new().with("Id", "W1")])
        .with_records(
            EntityType::USER,
            vec![
                Record::new().with("Id", "U1").with("IsActive", true),
                Record::new().with("Id", "U2").with("IsActive", false),
                Record::new().with("Id", "U3"),
            ],
        );
    let aggregator = Aggregator::new(Arc::new(fetcher));

    let summary = aggregator.workspace_summary().await.unwrap();

    assert_eq!(summary.workspaces.len(), 1);
    assert_eq!(summary.total_users, 3);
    assert_eq!(summary.active_users, 1);
    assert_eq!(summary.total_projects, 8);
    assert_eq!(summary.total_assets, 1);
}
