use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;
use std::time::Duration;

use crate::error::{IconError, IconErrorKind};
use crate::model::{extension_of, FolderType, Icon, IconSize};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTarget {
    pub target_path: PathBuf,
    pub is_directory: bool,
    pub is_network_root: bool,
    pub arguments: String,
    pub working_directory: String,
    pub icon_location: String,
}

/// The host shell's icon and association services. Every method must be
/// called from the icon apartment.
pub trait ShellProvider: Send + Sync {
    fn lookup_file_icon(
        &self,
        path: &Path,
        link_overlay: bool,
        size: IconSize,
    ) -> Result<Option<Icon>, IconError>;

    fn lookup_folder_icon(
        &self,
        path: &Path,
        folder: FolderType,
        link_overlay: bool,
        size: IconSize,
    ) -> Result<Option<Icon>, IconError>;

    fn resolve_link(&self, path: &Path) -> Result<LinkTarget, IconError>;

    fn extract_associated_icon(&self, path: &Path) -> Result<Option<Icon>, IconError>;

    fn default_browser_path(&self) -> Result<Option<PathBuf>, IconError>;

    fn find_executable(&self, path: &Path) -> Result<Option<PathBuf>, IconError>;

    fn extract_all_icons(&self, executable: &Path) -> Result<Vec<Icon>, IconError>;
}

/// `\\server` or `\\server\`, a UNC path without a share.
pub fn is_network_root(path: &Path) -> bool {
    let raw = path.to_string_lossy();
    let Some(rest) = raw.strip_prefix(r"\\") else {
        return false;
    };
    let host = rest.strip_suffix('\\').unwrap_or(rest);
    !host.is_empty() && !host.contains('\\')
}

/// Pulls the executable out of a shell `open` command line such as
/// `"C:\Program Files\App\app.exe" --single-argument %1`.
pub fn executable_from_command(command: &str) -> Option<PathBuf> {
    let trimmed = command.trim();
    if let Some(quoted) = trimmed.strip_prefix('"') {
        let end = quoted.find('"')?;
        let exe = quoted[..end].trim();
        return (!exe.is_empty()).then(|| PathBuf::from(exe));
    }

    let lower = trimmed.to_ascii_lowercase();
    if let Some(idx) = lower.find(".exe") {
        return Some(PathBuf::from(&trimmed[..idx + 4]));
    }

    trimmed
        .split_whitespace()
        .next()
        .map(PathBuf::from)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCall {
    FileIcon { path: PathBuf, link_overlay: bool },
    FolderIcon { path: PathBuf, folder: FolderType, link_overlay: bool },
    ResolveLink(PathBuf),
    AssociatedIcon(PathBuf),
    DefaultBrowser,
    FindExecutable(PathBuf),
    ExtractAllIcons(PathBuf),
}

#[derive(Debug, Default)]
struct MockLog {
    calls: Vec<ShellCall>,
    threads: HashSet<ThreadId>,
}

/// Scriptable stand-in for the host shell. Every icon it hands out is a
/// new allocation so tests can tell shared and fresh icons apart.
#[derive(Debug, Default)]
pub struct MockShell {
    file_types: HashMap<String, u32>,
    file_paths: HashMap<PathBuf, u32>,
    folder_color: u32,
    links: HashMap<PathBuf, LinkTarget>,
    associated_color: u32,
    browser: Option<PathBuf>,
    executables: HashMap<PathBuf, PathBuf>,
    embedded: HashMap<PathBuf, Vec<u32>>,
    failures: HashMap<PathBuf, IconErrorKind>,
    delay: Option<Duration>,
    log: Mutex<MockLog>,
}

impl MockShell {
    pub fn new() -> Self {
        Self {
            folder_color: 0xFFE8_C15A,
            associated_color: 0xFF20_60C0,
            ..Self::default()
        }
    }

    pub fn with_file_type(mut self, extension: &str, argb: u32) -> Self {
        self.file_types.insert(extension.to_ascii_lowercase(), argb);
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>, argb: u32) -> Self {
        self.file_paths.insert(path.into(), argb);
        self
    }

    pub fn with_link(mut self, path: impl Into<PathBuf>, target: LinkTarget) -> Self {
        self.links.insert(path.into(), target);
        self
    }

    pub fn with_default_browser(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser = Some(path.into());
        self
    }

    pub fn with_executable(mut self, document: impl Into<PathBuf>, exe: impl Into<PathBuf>) -> Self {
        self.executables.insert(document.into(), exe.into());
        self
    }

    pub fn with_embedded_icons(mut self, exe: impl Into<PathBuf>, colors: Vec<u32>) -> Self {
        self.embedded.insert(exe.into(), colors);
        self
    }

    /// Every call that touches `path` fails with `kind`.
    pub fn with_failure(mut self, path: impl Into<PathBuf>, kind: IconErrorKind) -> Self {
        self.failures.insert(path.into(), kind);
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.log().calls.clone()
    }

    pub fn file_lookup_count(&self) -> usize {
        self.log()
            .calls
            .iter()
            .filter(|call| matches!(call, ShellCall::FileIcon { .. }))
            .count()
    }

    pub fn calling_threads(&self) -> HashSet<ThreadId> {
        self.log().threads.clone()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, MockLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ShellCall) {
        let mut log = self.log();
        log.calls.push(call);
        log.threads.insert(std::thread::current().id());
    }

    fn check_failure(&self, path: &Path) -> Result<(), IconError> {
        match self.failures.get(path) {
            Some(kind) => Err(IconError::new(*kind, path, "scripted failure")),
            None => Ok(()),
        }
    }
}

impl ShellProvider for MockShell {
    fn lookup_file_icon(
        &self,
        path: &Path,
        link_overlay: bool,
        size: IconSize,
    ) -> Result<Option<Icon>, IconError> {
        self.record(ShellCall::FileIcon {
            path: path.to_path_buf(),
            link_overlay,
        });
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.check_failure(path)?;

        let color = self
            .file_paths
            .get(path)
            .or_else(|| self.file_types.get(&extension_of(path)));
        Ok(color.map(|argb| Icon::filled(size.pixels(), size.pixels(), *argb)))
    }

    fn lookup_folder_icon(
        &self,
        path: &Path,
        folder: FolderType,
        link_overlay: bool,
        size: IconSize,
    ) -> Result<Option<Icon>, IconError> {
        self.record(ShellCall::FolderIcon {
            path: path.to_path_buf(),
            folder,
            link_overlay,
        });
        self.check_failure(path)?;
        Ok(Some(Icon::filled(size.pixels(), size.pixels(), self.folder_color)))
    }

    fn resolve_link(&self, path: &Path) -> Result<LinkTarget, IconError> {
        self.record(ShellCall::ResolveLink(path.to_path_buf()));
        self.check_failure(path)?;
        self.links.get(path).cloned().ok_or_else(|| {
            IconError::new(IconErrorKind::InvalidArgument, path, "not a shortcut link")
        })
    }

    fn extract_associated_icon(&self, path: &Path) -> Result<Option<Icon>, IconError> {
        self.record(ShellCall::AssociatedIcon(path.to_path_buf()));
        self.check_failure(path)?;
        Ok(Some(Icon::filled(32, 32, self.associated_color)))
    }

    fn default_browser_path(&self) -> Result<Option<PathBuf>, IconError> {
        self.record(ShellCall::DefaultBrowser);
        Ok(self.browser.clone())
    }

    fn find_executable(&self, path: &Path) -> Result<Option<PathBuf>, IconError> {
        self.record(ShellCall::FindExecutable(path.to_path_buf()));
        self.check_failure(path)?;
        Ok(self.executables.get(path).cloned())
    }

    fn extract_all_icons(&self, executable: &Path) -> Result<Vec<Icon>, IconError> {
        self.record(ShellCall::ExtractAllIcons(executable.to_path_buf()));
        self.check_failure(executable)?;
        Ok(self
            .embedded
            .get(executable)
            .map(|colors| {
                colors
                    .iter()
                    .map(|argb| Icon::filled(32, 32, *argb))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Shell for hosts without a Windows shell: no icons, no associations.
#[cfg(not(target_os = "windows"))]
#[derive(Debug, Default)]
pub struct NoopShell;

#[cfg(not(target_os = "windows"))]
impl ShellProvider for NoopShell {
    fn lookup_file_icon(
        &self,
        _path: &Path,
        _link_overlay: bool,
        _size: IconSize,
    ) -> Result<Option<Icon>, IconError> {
        Ok(None)
    }

    fn lookup_folder_icon(
        &self,
        _path: &Path,
        _folder: FolderType,
        _link_overlay: bool,
        _size: IconSize,
    ) -> Result<Option<Icon>, IconError> {
        Ok(None)
    }

    fn resolve_link(&self, path: &Path) -> Result<LinkTarget, IconError> {
        Err(IconError::new(
            IconErrorKind::NotSupported,
            path,
            "shortcut links need the Windows shell",
        ))
    }

    fn extract_associated_icon(&self, _path: &Path) -> Result<Option<Icon>, IconError> {
        Ok(None)
    }

    fn default_browser_path(&self) -> Result<Option<PathBuf>, IconError> {
        Ok(None)
    }

    fn find_executable(&self, _path: &Path) -> Result<Option<PathBuf>, IconError> {
        Ok(None)
    }

    fn extract_all_icons(&self, _executable: &Path) -> Result<Vec<Icon>, IconError> {
        Ok(Vec::new())
    }
}

pub fn default_shell() -> Arc<dyn ShellProvider> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(crate::windows_shell::WindowsShell)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Arc::new(NoopShell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_network_roots() {
        assert!(is_network_root(Path::new(r"\\fileserver")));
        assert!(is_network_root(Path::new(r"\\fileserver\")));
        assert!(!is_network_root(Path::new(r"\\fileserver\share")));
        assert!(!is_network_root(Path::new(r"C:\Users")));
    }

    #[test]
    fn extracts_quoted_and_bare_executables() {
        assert_eq!(
            executable_from_command(r#""C:\Program Files\Mozilla Firefox\firefox.exe" -osint -url "%1""#),
            Some(PathBuf::from(r"C:\Program Files\Mozilla Firefox\firefox.exe"))
        );
        assert_eq!(
            executable_from_command(r"C:\Tools\browser.exe %1"),
            Some(PathBuf::from(r"C:\Tools\browser.exe"))
        );
        assert_eq!(executable_from_command("   "), None);
    }
}
