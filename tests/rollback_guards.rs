// tests/rollback_guards.rs
//
// Ошибочные вызовы rollback не должны трогать живые каталоги:
// - неизвестный снапшот → NotFound;
// - неотслеживаемый компонент → InvalidComponent;
// - компонент, слой которого не был захвачен → NotFound "<name>/<component>";
// - сломанный слой на одном из каталогов → PartialFailure, остальные восстановлены.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use layersnap::tracked::TrackedDirectory;
use layersnap::{CaptureMode, Engine, Operation, Outcome, Scope, SnapConfig, SnapError};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("lstest-guard-{prefix}-{pid}-{t}-{id}"))
}

fn engine(prefix: &str, tracked: &[&Path]) -> Result<Engine> {
    let dirs = tracked
        .iter()
        .map(|p| TrackedDirectory::new(*p))
        .collect::<layersnap::Result<Vec<_>>>()?;
    let cfg = SnapConfig::default()
        .with_root(unique_root(&format!("{prefix}-store")))
        .with_tracked_dirs(dirs)
        .with_capture(CaptureMode::Copy)
        .with_package_cmd(None::<String>)
        .build()?;
    Ok(Engine::new(cfg)?)
}

#[test]
fn unknown_snapshot_is_not_found_and_tree_untouched() -> Result<()> {
    let etc = unique_root("nf").join("etc");
    fs::create_dir_all(&etc)?;
    fs::write(etc.join("test.conf"), "B")?;
    fs::write(etc.join("other"), "keep me")?;

    let eng = engine("nf", &[&etc])?;
    let err = eng
        .rollback("does_not_exist", &Scope::All)
        .expect_err("rollback of a missing snapshot must fail");
    assert!(matches!(err, SnapError::NotFound { ref name } if name == "does_not_exist"));
    assert!(err.is_not_found());

    assert_eq!(fs::read_to_string(etc.join("test.conf"))?, "B");
    assert_eq!(fs::read_to_string(etc.join("other"))?, "keep me");
    Ok(())
}

#[test]
fn untracked_component_is_rejected_before_any_write() -> Result<()> {
    let etc = unique_root("ic").join("etc");
    fs::create_dir_all(&etc)?;
    fs::write(etc.join("test.conf"), "A")?;

    let eng = engine("ic", &[&etc])?;
    eng.create(Some("s1"))?;
    fs::write(etc.join("test.conf"), "B")?;

    let err = eng
        .rollback("s1", &Scope::Component("nonexistent".into()))
        .expect_err("untracked component must fail");
    match err {
        SnapError::InvalidComponent { component, tracked } => {
            assert_eq!(component, "nonexistent");
            assert_eq!(tracked, vec!["etc".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Ничего не восстановлено.
    assert_eq!(fs::read_to_string(etc.join("test.conf"))?, "B");
    Ok(())
}

#[test]
fn component_missing_from_snapshot_is_not_found() -> Result<()> {
    let base = unique_root("miss");
    let etc = base.join("etc");
    let boot = base.join("boot");
    fs::create_dir_all(&etc)?;
    fs::write(etc.join("a"), "1")?;
    // boot ещё не существует → снапшот частичный.

    let eng = engine("miss", &[&etc, &boot])?;
    let err = eng.create(Some("partial")).expect_err("boot capture must fail");
    assert!(matches!(err, SnapError::PartialFailure { op: "create", .. }));

    fs::create_dir_all(&boot)?;
    fs::write(boot.join("b"), "2")?;

    let err = eng
        .rollback("partial", &Scope::Component("boot".into()))
        .expect_err("boot layer was never captured");
    assert!(matches!(err, SnapError::NotFound { ref name } if name == "partial/boot"));
    assert_eq!(fs::read_to_string(boot.join("b"))?, "2");
    Ok(())
}

#[test]
fn failing_layer_reports_partial_failure_and_restores_the_rest() -> Result<()> {
    let base = unique_root("pf");
    let etc = base.join("etc");
    let opt = base.join("opt");
    fs::create_dir_all(&etc)?;
    fs::create_dir_all(&opt)?;
    fs::write(etc.join("hosts"), "127.0.0.1 localhost\n")?;
    fs::write(opt.join("app.conf"), "v=1\n")?;

    let eng = engine("pf", &[&etc, &opt])?;
    eng.create(Some("s"))?;

    fs::write(etc.join("hosts"), "garbage\n")?;
    // Живой каталог opt заменён файлом: зеркалирование в него невозможно.
    fs::remove_dir_all(&opt)?;
    fs::write(&opt, "not a directory")?;

    let err = eng.rollback("s", &Scope::All).expect_err("opt must fail");
    match err {
        SnapError::PartialFailure { op, failed } => {
            assert_eq!(op, "rollback");
            assert_eq!(failed, vec![opt.display().to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fs::read_to_string(etc.join("hosts"))?, "127.0.0.1 localhost\n");
    Ok(())
}

#[test]
fn dispatch_routes_rollback_and_rejects_unrecognized() -> Result<()> {
    let etc = unique_root("disp").join("etc");
    fs::create_dir_all(&etc)?;
    fs::write(etc.join("x"), "1")?;

    let eng = engine("disp", &[&etc])?;
    eng.create(Some("s"))?;
    fs::write(etc.join("x"), "2")?;

    let out = eng.dispatch(Operation::Rollback {
        name: "s".into(),
        component: Some("etc".into()),
    })?;
    assert!(matches!(out, Outcome::RolledBack(ref r) if r.snapshot == "s"));
    assert_eq!(fs::read_to_string(etc.join("x"))?, "1");

    let err = eng
        .dispatch(Operation::Unrecognized {
            command: "frobnicate".into(),
        })
        .expect_err("unknown command");
    assert!(matches!(err, SnapError::Unrecognized { ref command } if command == "frobnicate"));
    Ok(())
}
