use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use clinic_backup::backup::{
    BackupGateway, BackupScheduler, BackupStrategy, Clock, DumpTool, ProcessOutput,
    ProcessRunner, ScheduleSpec, SnapshotManifest, SystemClock, TokioClock,
};
use clinic_backup::config::{ClinicPaths, Settings};
use clinic_backup::models::{ArtifactKind, Collection, Record};
use clinic_backup::storage::{Datastore, MemoryDatastore};
use clinic_backup::{BackupError, BackupResult};

#[derive(Clone, Copy)]
enum Behavior {
    /// Writes a small dump into `--out=`
    Succeed,
    /// The executable cannot be found
    Missing,
    /// Runs and exits 1
    ExitNonzero,
}

struct FakeRunner {
    behavior: Behavior,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeRunner {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> BackupResult<ProcessOutput> {
        self.calls.lock().push((program.to_string(), args.to_vec()));
        match self.behavior {
            Behavior::Succeed => {
                if let Some(out) = args.iter().find_map(|a| a.strip_prefix("--out=")) {
                    let db = Path::new(out).join("clinic");
                    fs::create_dir_all(&db)?;
                    fs::write(db.join("users.bson"), vec![1u8; 2048])?;
                    fs::write(db.join("users.metadata.json"), b"{}")?;
                }
                Ok(ProcessOutput {
                    exit_code: Some(0),
                    ..ProcessOutput::default()
                })
            }
            Behavior::Missing => Err(BackupError::ExternalTool(format!(
                "{} not found: No such file or directory",
                program
            ))),
            Behavior::ExitNonzero => Ok(ProcessOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "Failed: could not connect to server".to_string(),
            }),
        }
    }
}

/// Always reports the same instant
struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct Harness {
    gateway: BackupGateway,
    store: Arc<MemoryDatastore>,
    runner: Arc<FakeRunner>,
    paths: ClinicPaths,
    _temp: TempDir,
}

fn harness_with(
    behavior: Behavior,
    settings: Settings,
    store: Arc<MemoryDatastore>,
    clock: Arc<dyn Clock>,
) -> Harness {
    let temp = TempDir::new().unwrap();
    let paths = ClinicPaths::with_base_dir(temp.path().to_path_buf());
    paths.ensure_directories().unwrap();

    let runner = FakeRunner::new(behavior);
    let tool = DumpTool::new(
        runner.clone(),
        &settings.tools,
        Some("mongodb://localhost:27017/clinic".to_string()),
    );
    let gateway = BackupGateway::new(paths.clone(), &settings, store.clone(), tool, clock);

    Harness {
        gateway,
        store,
        runner,
        paths,
        _temp: temp,
    }
}

fn harness(behavior: Behavior) -> Harness {
    harness_with(
        behavior,
        Settings::default(),
        seeded_store(),
        Arc::new(SystemClock),
    )
}

fn record(value: serde_json::Value) -> Record {
    Record::try_from(value).unwrap()
}

fn seeded_store() -> Arc<MemoryDatastore> {
    let store = Arc::new(MemoryDatastore::new());
    store
        .insert_many(
            Collection::Users,
            vec![
                record(json!({"_id": "u1", "email": "vet@clinic.test", "role": "vet"})),
                record(json!({"_id": "u2", "email": "owner@clinic.test", "role": "client"})),
            ],
        )
        .unwrap();
    store
        .insert_many(
            Collection::Animals,
            vec![record(json!({"_id": "a1", "name": "Rex", "owner": "u2"}))],
        )
        .unwrap();
    store
        .insert_many(
            Collection::Products,
            vec![
                record(json!({"_id": "p1", "name": "Flea collar", "price": 12.5})),
                record(json!({"_id": "p2", "name": "Dog food", "price": 40})),
                record(json!({"_id": "p3", "name": "Leash", "price": 9.99})),
            ],
        )
        .unwrap();
    store
        .insert_many(
            Collection::Orders,
            vec![record(json!({"_id": "o1", "user": "u2", "total": 52.5}))],
        )
        .unwrap();
    store
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Create `count` fake archives, oldest first, all older than "now"
fn old_archives(dir: &Path, count: u64) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("backup-{}.zip", 1_600_000_000_000 + i));
            let file = File::create(&path).unwrap();
            file.set_modified(SystemTime::now() - Duration::from_secs(3600 * (count - i)))
                .unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn test_prune_keeps_newest_window() {
    let h = harness(Behavior::Succeed);
    let archives = old_archives(&h.paths.backups_dir(), 10);

    let deleted = h.gateway.prune().await.unwrap();

    assert_eq!(deleted.len(), 3);
    for path in &archives[..3] {
        assert!(!path.exists(), "{} should be pruned", path.display());
    }
    for path in &archives[3..] {
        assert!(path.exists(), "{} should be kept", path.display());
    }
}

#[tokio::test]
async fn test_scheduled_backup_with_full_window() {
    let h = harness(Behavior::Succeed);
    old_archives(&h.paths.backups_dir(), 8);

    let artifact = h.gateway.run_scheduled_backup().await.unwrap();

    let remaining = h.gateway.list_backups().await.unwrap();
    assert_eq!(remaining.len(), 7);
    assert_eq!(remaining[0].identifier, artifact.identifier);
    assert!(artifact.location.exists());
    assert!(!file_names(&h.paths.backups_dir())
        .iter()
        .any(|n| n.starts_with("temp-")));
}

#[tokio::test]
async fn test_scheduled_backup_invokes_dump_tool() {
    let h = harness(Behavior::Succeed);

    let artifact = h.gateway.run_scheduled_backup().await.unwrap();

    assert_eq!(artifact.kind, ArtifactKind::DumpArchive);
    let calls = h.runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "mongodump");
    assert_eq!(calls[0].1[0], "--uri=mongodb://localhost:27017/clinic");
    assert!(calls[0].1[1].starts_with("--out="));
    assert!(calls[0].1[1].contains("temp-"));
}

#[tokio::test]
async fn test_consecutive_backups_get_distinct_names() {
    let instant = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    let h = harness_with(
        Behavior::Succeed,
        Settings::default(),
        seeded_store(),
        Arc::new(FixedClock(instant)),
    );

    let first = h.gateway.run_scheduled_backup().await.unwrap();
    let second = h.gateway.run_scheduled_backup().await.unwrap();
    let third = h.gateway.run_scheduled_backup().await.unwrap();

    assert_eq!(first.identifier, format!("backup-{}", instant.timestamp_millis()));
    assert_ne!(first.identifier, second.identifier);
    assert_ne!(second.identifier, third.identifier);
    assert_eq!(h.gateway.list_backups().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_concurrent_backups_do_not_collide() {
    let instant = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    let h = harness_with(
        Behavior::Succeed,
        Settings::default(),
        seeded_store(),
        Arc::new(FixedClock(instant)),
    );

    let (a, b) = tokio::join!(
        h.gateway.run_scheduled_backup(),
        h.gateway.run_scheduled_backup()
    );
    assert_ne!(a.unwrap().identifier, b.unwrap().identifier);
}

#[tokio::test]
async fn test_missing_tool_creates_no_archive() {
    let h = harness(Behavior::Missing);

    let err = h.gateway.run_scheduled_backup().await.unwrap_err();

    assert!(matches!(err, BackupError::ExternalTool(_)));
    assert!(file_names(&h.paths.backups_dir()).is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_creates_no_archive() {
    let h = harness(Behavior::ExitNonzero);

    let err = h.gateway.run_scheduled_backup().await.unwrap_err();

    assert!(matches!(err, BackupError::ExternalTool(_)));
    assert!(err.to_string().contains("could not connect"));
    assert!(file_names(&h.paths.backups_dir()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_fires_survive_missing_tool() {
    let origin = Utc.with_ymd_and_hms(2024, 1, 1, 23, 58, 0).unwrap();
    let clock = Arc::new(TokioClock::starting_at(origin));
    let h = harness_with(
        Behavior::Missing,
        Settings::default(),
        seeded_store(),
        clock.clone(),
    );
    let gateway = Arc::new(h.gateway);

    let mut scheduler = BackupScheduler::new(ScheduleSpec::default(), clock);
    scheduler.start(gateway.clone()).unwrap();

    // Crosses two midnights
    tokio::time::sleep(Duration::from_secs(24 * 60 * 60 + 5 * 60)).await;
    scheduler.stop().await.unwrap();

    let stats = scheduler.stats();
    assert_eq!(stats.fired, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 0);
    assert_eq!(h.runner.calls().len(), 2);
    assert!(file_names(&h.paths.backups_dir()).is_empty());
}

#[tokio::test]
async fn test_export_backup_streams_and_cleans_up() {
    let h = harness(Behavior::Succeed);
    let mut sink: Vec<u8> = Vec::new();

    let exported = h.gateway.export_backup(&mut sink).await.unwrap();

    assert!(exported.file_name.starts_with("backup-"));
    assert!(exported.file_name.ends_with(".zip"));
    assert_eq!(exported.bytes, sink.len() as u64);
    assert_eq!(&sink[..2], b"PK");
    assert!(file_names(&h.paths.exports_dir()).is_empty());
    // Staged outside the backups directory, so retention never saw it
    assert!(file_names(&h.paths.backups_dir()).is_empty());
}

#[tokio::test]
async fn test_slow_export_reader_does_not_block_backups() {
    let h = harness(Behavior::Succeed);
    let gateway = &h.gateway;
    let (mut client, server) = tokio::io::duplex(16);

    let export = async move {
        let mut server = server;
        let result = gateway.export_backup(&mut server).await;
        drop(server);
        result
    };
    let backup_while_streaming = async {
        let mut magic = [0u8; 2];
        client.read_exact(&mut magic).await.unwrap();

        let artifact = tokio::time::timeout(Duration::from_secs(10), gateway.run_scheduled_backup())
            .await
            .expect("backup waited for the export reader")
            .unwrap();

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        (magic, artifact, rest.len() as u64 + 2)
    };

    let (exported, (magic, artifact, received)) = tokio::join!(export, backup_while_streaming);
    let exported = exported.unwrap();

    assert_eq!(&magic, b"PK");
    assert_eq!(exported.bytes, received);
    assert!(artifact.location.starts_with(h.paths.backups_dir()));
    assert!(file_names(&h.paths.exports_dir()).is_empty());
}

#[tokio::test]
async fn test_export_backup_failure_leaves_nothing() {
    let h = harness(Behavior::ExitNonzero);
    let mut sink: Vec<u8> = Vec::new();

    let err = h.gateway.export_backup(&mut sink).await.unwrap_err();

    assert!(matches!(err, BackupError::ExternalTool(_)));
    assert!(sink.is_empty());
    assert!(file_names(&h.paths.exports_dir()).is_empty());
}

#[tokio::test]
async fn test_import_backup_runs_restore_tool() {
    let h = harness(Behavior::Succeed);
    let dump = h.paths.backups_dir().join("dump-2024");
    fs::create_dir_all(dump.join("clinic")).unwrap();

    h.gateway.import_backup(Path::new("dump-2024")).await.unwrap();

    let calls = h.runner.calls();
    assert_eq!(calls[0].0, "mongorestore");
    assert!(calls[0].1.iter().any(|a| a.starts_with("--dir=")));
    assert!(calls[0].1.contains(&"--drop".to_string()));
}

#[tokio::test]
async fn test_import_backup_rejects_paths_outside_root() {
    let h = harness(Behavior::Succeed);
    fs::create_dir_all(h.paths.base_dir().join("elsewhere")).unwrap();

    let err = h
        .gateway
        .import_backup(Path::new("../elsewhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::PathOutsideRoot(_)));

    let err = h
        .gateway
        .import_backup(&h.paths.base_dir().join("elsewhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::PathOutsideRoot(_)));
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_import_backup_requires_directory() {
    let h = harness(Behavior::Succeed);
    fs::write(h.paths.backups_dir().join("not-a-dump.txt"), b"x").unwrap();

    let err = h
        .gateway
        .import_backup(Path::new("not-a-dump.txt"))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = h
        .gateway
        .import_backup(Path::new("missing-dump"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_snapshot_export_then_import_reproduces_counts() {
    let source = harness(Behavior::Succeed);
    let path = source.gateway.export_snapshot().await.unwrap();
    assert!(path.starts_with(source.paths.exports_dir()));

    let empty = harness_with(
        Behavior::Succeed,
        Settings::default(),
        Arc::new(MemoryDatastore::new()),
        Arc::new(SystemClock),
    );
    let manifest = SnapshotManifest::read_from_file(&path).unwrap();
    empty.gateway.import_snapshot(manifest).await.unwrap();

    assert_eq!(empty.store.counts(), source.store.counts());
}

#[tokio::test]
async fn test_snapshot_import_twice_doubles_counts() {
    let source = harness(Behavior::Succeed);
    let artifact = source.gateway.create_snapshot().await.unwrap();
    let manifest = SnapshotManifest::read_from_file(&artifact.location).unwrap();

    let empty = harness_with(
        Behavior::Succeed,
        Settings::default(),
        Arc::new(MemoryDatastore::new()),
        Arc::new(SystemClock),
    );
    empty.gateway.import_snapshot(manifest.clone()).await.unwrap();
    empty.gateway.import_snapshot(manifest).await.unwrap();

    let source_counts = source.store.counts();
    for (collection, count) in empty.store.counts() {
        assert_eq!(count, source_counts[&collection] * 2, "{}", collection);
    }
}

#[tokio::test]
async fn test_restore_without_users_changes_nothing() {
    let h = harness(Behavior::Succeed);
    fs::write(
        h.paths.backups_dir().join("backup-incomplete.json"),
        json!({"orders": [], "products": [{"_id": "p9"}]}).to_string(),
    )
    .unwrap();
    let before = h.store.counts();

    let err = h
        .gateway
        .restore_snapshot(Path::new("backup-incomplete.json"))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("users"));
    assert_eq!(h.store.counts(), before);
}

#[tokio::test]
async fn test_restore_snapshot_replaces_contents() {
    let h = harness(Behavior::Succeed);
    let artifact = h.gateway.create_snapshot().await.unwrap();
    let expected = h.store.counts();

    h.store
        .insert_many(Collection::Payments, vec![Record::new(), Record::new()])
        .unwrap();
    h.store.delete_all(Collection::Users).unwrap();

    let report = h
        .gateway
        .restore_snapshot(&artifact.location)
        .await
        .unwrap();

    assert!(report.transactional);
    assert_eq!(h.store.counts(), expected);
}

#[tokio::test]
async fn test_restore_leaves_animals_alone() {
    let h = harness(Behavior::Succeed);
    fs::write(
        h.paths.backups_dir().join("backup-routes.json"),
        json!({
            "timestamp": "2024-03-05T14:07:09.123Z",
            "orders": [],
            "users": [{"_id": "u1"}],
            "products": [],
            "payments": [],
            "orderItems": []
        })
        .to_string(),
    )
    .unwrap();

    let report = h
        .gateway
        .restore_snapshot(Path::new("backup-routes.json"))
        .await
        .unwrap();

    assert_eq!(
        report.restored.keys().copied().collect::<Vec<_>>(),
        vec![
            Collection::Users,
            Collection::Orders,
            Collection::OrderItems,
            Collection::Payments,
            Collection::Products,
        ]
    );
    let counts = h.store.counts();
    assert_eq!(counts[&Collection::Animals], 1);
    assert_eq!(counts[&Collection::Users], 1);
    assert_eq!(counts[&Collection::Products], 0);
}

#[tokio::test]
async fn test_restore_without_transactions() {
    let h = harness_with(
        Behavior::Succeed,
        Settings::default(),
        Arc::new(MemoryDatastore::without_transactions()),
        Arc::new(SystemClock),
    );
    let manifest = SnapshotManifest::from_value(json!({
        "users": [{"_id": "u1"}],
        "orders": [],
        "products": [{"_id": "p1"}, {"_id": "p2"}]
    }))
    .unwrap();

    let report = h.gateway.restore_manifest(manifest).await.unwrap();

    assert!(!report.transactional);
    assert_eq!(report.total(), 3);
    assert_eq!(h.store.counts()[&Collection::Products], 2);
}

#[tokio::test]
async fn test_restore_snapshot_path_confinement() {
    let h = harness(Behavior::Succeed);
    Settings::default().save(&h.paths).unwrap();

    let err = h
        .gateway
        .restore_snapshot(Path::new("../config.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::PathOutsideRoot(_)));
    assert!(err.is_client_error());

    let err = h
        .gateway
        .restore_snapshot(Path::new("backup-nope.json"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_restore_snapshot_invalid_json() {
    let h = harness(Behavior::Succeed);
    fs::write(h.paths.backups_dir().join("backup-broken.json"), "{\"users\": [").unwrap();
    let before = h.store.counts();

    let err = h
        .gateway
        .restore_snapshot(Path::new("backup-broken.json"))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(h.store.counts(), before);
}

#[tokio::test]
async fn test_json_snapshot_strategy_with_retention() {
    let mut settings = Settings::default();
    settings.scheduled_strategy = BackupStrategy::JsonSnapshot;
    settings.retention.snapshot_window = Some(2);
    let h = harness_with(
        Behavior::Missing,
        settings,
        seeded_store(),
        Arc::new(SystemClock),
    );

    for _ in 0..4 {
        h.gateway.run_scheduled_backup().await.unwrap();
    }

    let remaining = h.gateway.list_backups().await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining
        .iter()
        .all(|a| a.kind == ArtifactKind::JsonSnapshot));
    // Snapshots never need the dump tool
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_list_backups_includes_both_kinds() {
    let h = harness(Behavior::Succeed);
    h.gateway.run_scheduled_backup().await.unwrap();
    h.gateway.create_snapshot().await.unwrap();
    fs::write(h.paths.backups_dir().join("notes.txt"), b"ignore me").unwrap();

    let backups = h.gateway.list_backups().await.unwrap();

    assert_eq!(backups.len(), 2);
    assert!(backups.iter().any(|b| b.kind == ArtifactKind::DumpArchive));
    assert!(backups.iter().any(|b| b.kind == ArtifactKind::JsonSnapshot));
}
