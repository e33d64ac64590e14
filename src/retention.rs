//! RetentionPolicy: keep the N most recent snapshots, delete the rest.
//!
//! Recency comes from the `created` field of metadata.json (RFC 3339), newest
//! first, ties broken by name descending. Records with an unparsable
//! timestamp fall back to the metadata file mtime.

use log::{error, info};
use std::cmp::Ordering;

use crate::error::{Result, SnapError};
use crate::store::{SnapshotStore, SnapshotSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
}

/// Newest first.
pub fn order_by_recency(mut v: Vec<SnapshotSummary>) -> Vec<SnapshotSummary> {
    v.sort_by(compare_recency);
    v
}

fn compare_recency(a: &SnapshotSummary, b: &SnapshotSummary) -> Ordering {
    let ka = a.created_at.or(a.modified);
    let kb = b.created_at.or(b.modified);
    kb.cmp(&ka).then_with(|| b.name.cmp(&a.name))
}

/// Split into (keep, drop) without touching the disk.
pub fn select(v: Vec<SnapshotSummary>, keep: usize) -> (Vec<SnapshotSummary>, Vec<SnapshotSummary>) {
    let mut ordered = order_by_recency(v);
    let drop = if keep < ordered.len() {
        ordered.split_off(keep)
    } else {
        Vec::new()
    };
    (ordered, drop)
}

/// Delete everything beyond the `keep` newest. Deletion continues past a
/// failing snapshot; any failure turns the result into `PartialFailure`.
pub fn prune(store: &SnapshotStore, keep: usize) -> Result<PruneReport> {
    let (kept, doomed) = select(store.list()?, keep);
    info!(
        "cleanup: keep={}, existing={}, to_delete={}",
        keep,
        kept.len() + doomed.len(),
        doomed.len()
    );

    let mut report = PruneReport {
        kept: kept.into_iter().map(|s| s.name).collect(),
        deleted: Vec::new(),
    };
    let mut failed = Vec::new();
    for s in doomed {
        match store.delete(&s.name) {
            Ok(()) => {
                info!("cleanup: deleted '{}' (created {})", s.name, s.created);
                report.deleted.push(s.name);
            }
            Err(e) => {
                error!("cleanup: delete '{}' failed: {}", s.name, e);
                failed.push(s.name);
            }
        }
    }

    if !failed.is_empty() {
        return Err(SnapError::PartialFailure {
            op: "cleanup",
            failed,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn summary(name: &str, created: Option<DateTime<Utc>>) -> SnapshotSummary {
        SnapshotSummary {
            name: name.to_string(),
            created: created.map(|c| c.to_rfc3339()).unwrap_or_default(),
            created_at: created,
            modified: None,
        }
    }

    #[test]
    fn keeps_newest_by_created() {
        let t0 = Utc::now();
        let v = vec![
            summary("b", Some(t0 + Duration::seconds(2))),
            summary("a", Some(t0 + Duration::seconds(5))),
            summary("c", Some(t0)),
        ];
        let (keep, drop) = select(v, 2);
        let keep: Vec<_> = keep.iter().map(|s| s.name.as_str()).collect();
        let drop: Vec<_> = drop.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(keep, vec!["a", "b"]);
        assert_eq!(drop, vec!["c"]);
    }

    #[test]
    fn equal_timestamps_order_by_name() {
        let t0 = Utc::now();
        let v = vec![summary("s1", Some(t0)), summary("s3", Some(t0)), summary("s2", Some(t0))];
        let (keep, _) = select(v, 1);
        assert_eq!(keep[0].name, "s3");
    }

    #[test]
    fn keep_zero_drops_all_and_large_keep_drops_none() {
        let t0 = Utc::now();
        let v = vec![summary("x", Some(t0)), summary("y", None)];
        assert_eq!(select(v.clone(), 0).1.len(), 2);
        assert!(select(v, 10).1.is_empty());
    }
}
