use layersnap::CreateReport;

/// CLI: create: подтверждение созданного снапшота.
pub fn print(r: &CreateReport) {
    println!("create: OK (name='{}', created={})", r.name, r.created);
    for l in &r.layers {
        println!("  - {:10} {} -> {}", l.component, l.tracked.display(), l.path.display());
    }
}
