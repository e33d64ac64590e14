use layersnap::PruneReport;

pub fn print(r: &PruneReport) {
    println!("cleanup: OK (kept={}, deleted={})", r.kept.len(), r.deleted.len());
    for name in &r.deleted {
        println!("  - deleted {}", name);
    }
}
