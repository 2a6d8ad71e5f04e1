use std::time::{SystemTime, UNIX_EPOCH};

use menuicon_core::config::Config;
use menuicon_core::icon_service::IconService;
use menuicon_core::model::{Entry, FormatHint, IconOwnership};
use menuicon_core::runtime::collect_entries;

fn unique_dir(tag: &str) -> std::path::PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("menuicon-{tag}-{unique}"));
    std::fs::create_dir_all(&dir).expect("temp dir should be created");
    dir
}

#[test]
fn collects_one_menu_level_by_default() {
    let dir = unique_dir("collect");
    std::fs::write(dir.join("b.txt"), b"b").unwrap();
    std::fs::write(dir.join("a.url"), b"[InternetShortcut]").unwrap();
    std::fs::create_dir_all(dir.join("sub")).unwrap();
    std::fs::write(dir.join("sub").join("deep.txt"), b"d").unwrap();

    let entries = collect_entries(&[dir.clone()], 1);
    let names: Vec<String> = entries.iter().map(|e| e.label.clone()).collect();

    assert_eq!(names, vec!["a.url", "b.txt", "sub"]);
    assert_eq!(entries[0].format_hint, FormatHint::InternetShortcut);
    assert!(entries[2].is_directory);

    let deeper = collect_entries(&[dir.clone()], 2);
    assert_eq!(deeper.len(), 4);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn file_arguments_become_single_entries() {
    let dir = unique_dir("collect-file");
    let file = dir.join("notes.txt");
    std::fs::write(&file, b"n").unwrap();

    let entries = collect_entries(&[file.clone(), dir.join("gone.pdf")], 3);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].original_path(), file.as_path());
    assert!(!entries[1].is_directory);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[cfg(not(target_os = "windows"))]
#[test]
fn non_windows_service_falls_back_to_placeholder() {
    let service = IconService::initialize(Config::default()).expect("service should start");

    let icon = service
        .resolve_icon(&mut Entry::new("/tmp/readme.txt", false))
        .expect("lookup should not fail");
    assert_eq!(icon.ownership(), IconOwnership::Shared);

    let link = service
        .resolve_icon(&mut Entry::new("/tmp/App.lnk", false))
        .expect("unsupported links are recoverable");
    assert_eq!(link.ownership(), IconOwnership::Shared);

    drop((icon, link));
    let report = service.shutdown();
    assert!(report.placeholder_released);
}
