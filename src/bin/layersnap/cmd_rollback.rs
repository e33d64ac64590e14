use layersnap::RollbackReport;

/// CLI: rollback: итог по каждому восстановленному каталогу.
pub fn print(r: &RollbackReport) {
    println!("rollback: OK (snapshot='{}', dirs={})", r.snapshot, r.restored.len());
    for (component, st) in &r.restored {
        println!(
            "  - {:10} copied={} deleted={} unchanged={} special={}",
            component, st.copied, st.deleted, st.unchanged, st.special
        );
    }
}
