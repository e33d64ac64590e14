// tests/retention_prune.rs
//
// cleanup(keep): остаются keep самых новых по полю created, остальные удаляются.
// keep >= N: ничего не удаляется; keep = 0 и отрицательный: удаляется всё.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};

use layersnap::retention::prune;
use layersnap::tracked::TrackedDirectory;
use layersnap::{CaptureMode, Engine, Operation, Outcome, SnapConfig, SnapshotMeta, SnapshotStore};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("lstest-prune-{prefix}-{pid}-{t}-{id}"))
}

/// Store with s1..s5, s5 newest. Names are written in shuffled order so the
/// directory listing order does not accidentally match recency.
fn seeded_store(prefix: &str) -> Result<SnapshotStore> {
    let store = SnapshotStore::new(unique_root(prefix));
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    for i in [3i64, 1, 5, 2, 4] {
        let name = format!("s{i}");
        let mut m = SnapshotMeta::new(&name, t0 + Duration::minutes(i));
        m.tracked_dirs = vec!["/etc".into()];
        m.captured = Some(vec!["etc".into()]);
        store.write(&m)?;
        fs::create_dir_all(store.layer_dir(&name, "etc"))?;
        fs::write(store.layer_dir(&name, "etc").join("f"), &name)?;
    }
    Ok(store)
}

fn engine_over(store: &SnapshotStore) -> Result<Engine> {
    let etc = unique_root("live").join("etc");
    fs::create_dir_all(&etc)?;
    let cfg = SnapConfig::default()
        .with_root(store.root())
        .with_tracked_dirs(vec![TrackedDirectory::new(etc)?])
        .with_capture(CaptureMode::Copy)
        .with_package_cmd(None::<String>)
        .with_keep(3)
        .build()?;
    Ok(Engine::new(cfg)?)
}

fn names(store: &SnapshotStore) -> Result<Vec<String>> {
    Ok(store.list()?.into_iter().map(|s| s.name).collect())
}

#[test]
fn keep_two_of_five_leaves_the_newest() -> Result<()> {
    let store = seeded_store("two")?;
    let report = prune(&store, 2)?;

    assert_eq!(report.kept, vec!["s5".to_string(), "s4".to_string()]);
    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["s1", "s2", "s3"]);

    assert_eq!(names(&store)?, vec!["s4".to_string(), "s5".to_string()]);
    for gone in ["s1", "s2", "s3"] {
        assert!(!store.snapshot_dir(gone).exists(), "{gone} must be removed from disk");
    }
    Ok(())
}

#[test]
fn keep_at_least_count_deletes_nothing() -> Result<()> {
    let store = seeded_store("all")?;
    for k in [5usize, 6, 100] {
        let report = prune(&store, k)?;
        assert!(report.deleted.is_empty());
        assert_eq!(report.kept.len(), 5);
    }
    assert_eq!(names(&store)?.len(), 5);
    Ok(())
}

#[test]
fn keep_zero_removes_everything() -> Result<()> {
    let store = seeded_store("zero")?;
    let report = prune(&store, 0)?;
    assert_eq!(report.deleted.len(), 5);
    assert!(names(&store)?.is_empty());
    Ok(())
}

#[test]
fn engine_cleanup_negative_keep_is_zero() -> Result<()> {
    let store = seeded_store("neg")?;
    let eng = engine_over(&store)?;
    let out = eng.dispatch(Operation::Cleanup { keep: Some(-3) })?;
    match out {
        Outcome::Pruned(r) => {
            assert!(r.kept.is_empty());
            assert_eq!(r.deleted.len(), 5);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(names(&store)?.is_empty());
    Ok(())
}

#[test]
fn engine_cleanup_default_uses_configured_keep() -> Result<()> {
    let store = seeded_store("dflt")?;
    let eng = engine_over(&store)?;
    let r = eng.cleanup(None)?;
    assert_eq!(r.kept, vec!["s5".to_string(), "s4".to_string(), "s3".to_string()]);
    assert_eq!(names(&store)?, vec!["s3", "s4", "s5"]);
    Ok(())
}

#[test]
fn corrupt_records_are_ignored_by_cleanup() -> Result<()> {
    let store = seeded_store("junk")?;
    fs::create_dir_all(store.snapshot_dir("junk"))?;
    fs::write(store.metadata_path("junk"), b"[]")?;

    let report = prune(&store, 1)?;
    assert_eq!(report.kept, vec!["s5".to_string()]);
    assert!(!report.deleted.iter().any(|n| n == "junk"));
    // Невалидный каталог не трогаем.
    assert!(store.snapshot_dir("junk").exists());
    Ok(())
}
