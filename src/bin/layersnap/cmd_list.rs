use serde_json::json;

use layersnap::SnapshotSummary;

use crate::util::print_json;

/// Список снапшотов (oldest first), опционально JSON.
pub fn print(v: &[SnapshotSummary], json: bool) {
    if json {
        let arr: Vec<_> = v
            .iter()
            .map(|s| json!({ "name": s.name, "created": s.created }))
            .collect();
        print_json(&serde_json::Value::Array(arr));
        return;
    }
    if v.is_empty() {
        println!("(no snapshots)");
        return;
    }
    let width = v.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for s in v {
        println!("{:width$}  {}", s.name, s.created, width = width);
    }
}
