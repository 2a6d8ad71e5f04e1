use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

const LOG_STEM: &str = "menuicon";
const ROTATE_AT_BYTES: u64 = 1_000_000;
const KEPT_ARCHIVES: usize = 5;

static SINK: OnceLock<Mutex<File>> = OnceLock::new();
static PANIC_HOOK: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Self::Info => "INFO ",
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

pub fn logs_dir() -> PathBuf {
    crate::config::stable_app_data_dir().join("logs")
}

pub fn init() -> Result<(), std::io::Error> {
    init_in(&logs_dir())
}

/// Opens `<dir>/menuicon.log` for appending, rolling it over first when it
/// has grown past the limit. Only the first successful call takes effect.
pub fn init_in(dir: &Path) -> Result<(), std::io::Error> {
    fs::create_dir_all(dir)?;
    let current = archive_path(dir, 0);
    if fs::metadata(&current).is_ok_and(|meta| meta.len() >= ROTATE_AT_BYTES) {
        roll_archives(dir)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(&current)?;
    let _ = SINK.set(Mutex::new(file));
    install_panic_hook();
    Ok(())
}

pub fn info(message: &str) {
    emit(Level::Info, None, message);
}

pub fn warn(message: &str) {
    emit(Level::Warn, None, message);
}

pub fn error(message: &str) {
    emit(Level::Error, None, message);
}

pub fn info_at(path: &Path, message: &str) {
    emit(Level::Info, Some(path), message);
}

pub fn warn_at(path: &Path, message: &str, cause: &dyn std::error::Error) {
    emit(Level::Warn, Some(path), &format!("{message}: {cause}"));
}

pub fn error_at(path: &Path, message: &str, cause: &dyn std::error::Error) {
    emit(Level::Error, Some(path), &format!("{message}: {cause}"));
}

fn emit(level: Level, path: Option<&Path>, message: &str) {
    let Some(sink) = SINK.get() else {
        return;
    };
    let line = format_line(unix_secs(), level, thread_label().as_str(), path, message);
    let mut file = sink.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = file.write_all(line.as_bytes());
}

/// `<secs> <LEVEL> [<thread>] path="<path>" <message>`; the path field is
/// left out for lines that are not about one entry.
fn format_line(
    secs: u64,
    level: Level,
    thread: &str,
    path: Option<&Path>,
    message: &str,
) -> String {
    let single_line = message.replace(['\r', '\n'], " ");
    match path {
        Some(path) => format!(
            "{secs} {} [{thread}] path=\"{}\" {single_line}\n",
            level.tag(),
            path.display()
        ),
        None => format!("{secs} {} [{thread}] {single_line}\n", level.tag()),
    }
}

fn thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// `menuicon.log` for `n == 0`, `menuicon.<n>.log` for archives.
fn archive_path(dir: &Path, n: usize) -> PathBuf {
    if n == 0 {
        dir.join(format!("{LOG_STEM}.log"))
    } else {
        dir.join(format!("{LOG_STEM}.{n}.log"))
    }
}

/// Shifts every archive up by one, dropping the oldest, and moves the
/// current log to `.1`.
fn roll_archives(dir: &Path) -> Result<(), std::io::Error> {
    let oldest = archive_path(dir, KEPT_ARCHIVES);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (0..KEPT_ARCHIVES).rev() {
        let from = archive_path(dir, n);
        if from.exists() {
            fs::rename(&from, archive_path(dir, n + 1))?;
        }
    }
    Ok(())
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let at = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "<unknown>".to_string());
            let payload = info.payload();
            let what = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("non-string panic payload");
            emit(Level::Error, None, &format!("panic at {at}: {what}"));
            previous(info);
        }));
    });
}
