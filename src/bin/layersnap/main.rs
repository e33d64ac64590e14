use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{error, warn};
use std::fs::OpenOptions;

use layersnap::tracked::parse_tracked_list;
use layersnap::{Engine, Outcome, SnapConfig};

mod cli;
mod util;
mod cmd_cleanup;
mod cmd_create;
mod cmd_delete;
mod cmd_list;
mod cmd_rollback;
mod cmd_show;
mod cmd_status;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт info.
    // LAYERSNAP_LOG_FILE=<path>: дописывать лог в файл вместо stderr.
    let mut b = Builder::from_env(Env::default().default_filter_or("info"));
    b.format_timestamp_millis();

    let log_file = std::env::var("LAYERSNAP_LOG_FILE")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut open_err = None;
    if let Some(path) = &log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => {
                b.target(Target::Pipe(Box::new(f)));
            }
            Err(e) => open_err = Some((path.clone(), e)),
        }
    }
    b.init();

    if let Some((path, e)) = open_err {
        warn!("log file {} unavailable ({}), logging to stderr", path, e);
    }
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();

    let mut cfg = SnapConfig::from_env().context("load configuration from environment")?;
    if let Some(root) = cli.root {
        cfg = cfg.with_root(root);
    }
    if let Some(tracked) = cli.tracked.as_deref() {
        cfg = cfg.with_tracked_dirs(parse_tracked_list(tracked).context("parse --tracked")?);
    }
    if let Some(mode) = cli.capture {
        cfg = cfg.with_capture(mode);
    }

    let (op, json) = cli.cmd.into_operation();
    if op.is_mutating() {
        util::require_root()?;
    }

    let engine = Engine::new(cfg)
        .context("invalid configuration")?
        .wait_for_lock(!cli.no_wait);

    let what = op.to_string();
    let outcome = engine.dispatch(op).with_context(|| what)?;

    match outcome {
        Outcome::Created(r) => cmd_create::print(&r),
        Outcome::Listed(v) => cmd_list::print(&v, json),
        Outcome::Shown(s) => cmd_show::print(&s, json),
        Outcome::Deleted(name) => cmd_delete::print(&name),
        Outcome::RolledBack(r) => cmd_rollback::print(&r),
        Outcome::Pruned(r) => cmd_cleanup::print(&r),
        Outcome::Status(s) => cmd_status::print(&s, json),
    }
    Ok(())
}
