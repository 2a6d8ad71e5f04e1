use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::apartment::InlineApartment;
use crate::config::Config;
use crate::icon_service::IconService;
use crate::model::{Entry, IconOwnership};
use crate::shell::MockShell;

fn p95_us(samples: &mut [f64]) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let last = samples.len().saturating_sub(1);
    let idx = ((last as f64) * 0.95).round() as usize;
    samples[idx.min(last)]
}

#[test]
fn warm_cache_hit_p95_under_200us() {
    let mut shell = MockShell::new();
    for i in 0..200 {
        shell = shell.with_file_type(&format!(".t{i:03}"), 0xFF00_0000 | i);
    }
    let service =
        IconService::with_parts(Config::default(), Arc::new(shell), Arc::new(InlineApartment))
            .unwrap();

    let paths: Vec<PathBuf> = (0..2_000)
        .map(|i| PathBuf::from(format!("C:\\Menu\\file_{i:05}.t{:03}", i % 200)))
        .collect();

    for path in &paths {
        let mut entry = Entry::new(path, false);
        let _ = service.resolve_icon(&mut entry).unwrap();
    }

    let mut batch_p95 = Vec::with_capacity(5);
    for _ in 0..5 {
        let mut samples = Vec::with_capacity(paths.len());
        for path in &paths {
            let mut entry = Entry::new(path, false);
            let start = Instant::now();
            let icon = service.resolve_icon(&mut entry).unwrap();
            samples.push(start.elapsed().as_secs_f64() * 1_000_000.0);
            assert_eq!(icon.ownership(), IconOwnership::Cache);
        }
        batch_p95.push(p95_us(&mut samples));
    }

    batch_p95.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_p95 = batch_p95[batch_p95.len() / 2];

    let stats = service.cache().stats();
    assert_eq!(stats.misses, 200);
    assert_eq!(stats.entries, 200);

    assert!(
        median_p95 <= 200.0,
        "median batch p95 too high: {median_p95:.1}us (budget 200us); batches={batch_p95:?}",
    );
}
