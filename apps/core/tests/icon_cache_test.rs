use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use menuicon_core::cache::{CacheLookup, IconCache};
use menuicon_core::model::{CacheKey, Icon};

fn key(path: &str) -> CacheKey {
    CacheKey::for_path(Path::new(path))
}

#[test]
fn second_lookup_reuses_stored_icon() {
    let cache = IconCache::new();
    let computed = AtomicUsize::new(0);
    let compute = || {
        computed.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ()>(Some(Icon::filled(16, 16, 0xFF00_00FF)))
    };

    let (first, first_lookup) = cache.get_or_compute(&key("C:\\a\\readme.txt"), compute).unwrap().unwrap();
    let (second, second_lookup) = cache
        .get_or_compute(&key("D:\\other\\NOTES.TXT"), compute)
        .unwrap()
        .unwrap();

    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert_eq!(first_lookup, CacheLookup::Computed);
    assert_eq!(second_lookup, CacheLookup::Hit);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(cache.get(".txt").is_some());
    assert_eq!(cache.len(), 1);
}

#[test]
fn instance_specific_files_are_computed_every_time() {
    let cache = IconCache::new();
    let computed = AtomicUsize::new(0);
    let compute = || {
        computed.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ()>(Some(Icon::filled(16, 16, 0xFF00_FF00)))
    };

    let (first, lookup) = cache.get_or_compute(&key("C:\\a\\setup.exe"), compute).unwrap().unwrap();
    let (second, _) = cache.get_or_compute(&key("C:\\a\\setup.exe"), compute).unwrap().unwrap();

    assert_eq!(lookup, CacheLookup::Uncached);
    assert_eq!(computed.load(Ordering::SeqCst), 2);
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(cache.is_empty());
}

#[test]
fn concurrent_first_lookups_compute_once() {
    let cache = Arc::new(IconCache::new());
    let computed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let computed = Arc::clone(&computed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let path = format!("C:\\docs\\report_{i}.pdf");
                cache
                    .get_or_compute(&key(&path), || {
                        computed.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(30));
                        Ok::<_, ()>(Some(Icon::filled(16, 16, 0xFFAA_0000)))
                    })
                    .unwrap()
                    .unwrap()
                    .0
            })
        })
        .collect();

    let icons: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(computed.load(Ordering::SeqCst), 1);
    assert!(icons.iter().all(|icon| Arc::ptr_eq(icon, &icons[0])));
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 7);
}

#[test]
fn drain_releases_every_cached_icon() {
    let cache = IconCache::new();
    for path in ["C:\\a.txt", "C:\\b.pdf", "C:\\c.docx", "C:\\d.exe"] {
        cache
            .get_or_compute(&key(path), || Ok::<_, ()>(Some(Icon::filled(16, 16, 0xFF11_1111))))
            .unwrap();
    }

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.drain(), 3);
    assert!(cache.is_empty());
    assert!(cache.get(".txt").is_none());
}
