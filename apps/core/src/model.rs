use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Extensions whose icon is specific to each file rather than to the type.
pub const INSTANCE_SPECIFIC_EXTENSIONS: [&str; 5] = ["", ".exe", ".lnk", ".ico", ".url"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconSize {
    #[default]
    Small,
    Large,
}

impl IconSize {
    pub fn pixels(self) -> u32 {
        match self {
            Self::Small => 16,
            Self::Large => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    None,
    ShortcutLink,
    InternetShortcut,
    SolutionFile,
}

impl FormatHint {
    pub fn from_path(path: &Path) -> Self {
        match extension_of(path).as_str() {
            ".lnk" => Self::ShortcutLink,
            ".url" => Self::InternetShortcut,
            ".sln" => Self::SolutionFile,
            _ => Self::None,
        }
    }
}

/// Lowercased extension including the leading dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// One filesystem object on its way to a menu row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub target_path: PathBuf,
    original_path: PathBuf,
    pub is_directory: bool,
    pub format_hint: FormatHint,
    pub is_hidden_entry: bool,
    pub label: String,
    pub arguments: String,
    pub working_directory: String,
    pub reached_via_link: bool,
}

impl Entry {
    pub fn new(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        let path = path.into();
        let format_hint = if is_directory {
            FormatHint::None
        } else {
            FormatHint::from_path(&path)
        };
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            target_path: path.clone(),
            original_path: path,
            is_directory,
            format_hint,
            is_hidden_entry: false,
            label,
            arguments: String::new(),
            working_directory: String::new(),
            reached_via_link: false,
        }
    }

    pub fn hidden(mut self, is_hidden_entry: bool) -> Self {
        self.is_hidden_entry = is_hidden_entry;
        self
    }

    /// A path that cannot be inspected is treated as a plain, visible file.
    pub fn from_path(path: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();
        let is_directory = metadata.as_ref().is_some_and(|meta| meta.is_dir());
        let is_hidden = metadata
            .as_ref()
            .is_some_and(|meta| is_hidden_file(path, meta));
        Self::new(path, is_directory).hidden(is_hidden)
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }
}

#[cfg(target_os = "windows")]
fn is_hidden_file(_path: &Path, metadata: &std::fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    use windows_sys::Win32::Storage::FileSystem::FILE_ATTRIBUTE_HIDDEN;

    metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(target_os = "windows"))]
fn is_hidden_file(path: &Path, _metadata: &std::fs::Metadata) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    ByExtension(String),
    NotCacheable,
}

impl CacheKey {
    pub fn for_path(path: &Path) -> Self {
        let extension = extension_of(path);
        if INSTANCE_SPECIFIC_EXTENSIONS.contains(&extension.as_str()) {
            Self::NotCacheable
        } else {
            Self::ByExtension(extension)
        }
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::ByExtension(_))
    }
}

/// Straight-alpha 0xAARRGGBB pixels, row-major, top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

pub type SharedIcon = Arc<Icon>;

impl Icon {
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        if width == 0 || height == 0 || pixels.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: u32, height: u32, argb: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            pixels: vec![argb; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get((y as usize) * (self.width as usize) + x as usize)
            .copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconOwnership {
    /// Lives in the icon cache until shutdown.
    Cache,
    /// Allocated for this entry; the row that shows it disposes it.
    Caller,
    /// The process-wide placeholder.
    Shared,
}

#[derive(Debug, Clone)]
pub struct ResolvedIcon {
    icon: SharedIcon,
    ownership: IconOwnership,
}

impl ResolvedIcon {
    pub fn new(icon: SharedIcon, ownership: IconOwnership) -> Self {
        Self { icon, ownership }
    }

    pub fn caller_owned(icon: Icon) -> Self {
        Self::new(Arc::new(icon), IconOwnership::Caller)
    }

    pub fn icon(&self) -> &SharedIcon {
        &self.icon
    }

    pub fn ownership(&self) -> IconOwnership {
        self.ownership
    }

    pub fn is_cache_owned(&self) -> bool {
        self.ownership == IconOwnership::Cache
    }

    pub fn same_instance(&self, other: &ResolvedIcon) -> bool {
        Arc::ptr_eq(&self.icon, &other.icon)
    }

    /// Drops the row's handle. Returns true when this call disposed the
    /// icon, which only happens for caller-owned icons.
    pub fn release(self) -> bool {
        match self.ownership {
            IconOwnership::Caller => Arc::try_unwrap(self.icon).is_ok(),
            IconOwnership::Cache | IconOwnership::Shared => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_specific_extensions_are_not_cacheable() {
        for path in ["C:\\a\\setup.EXE", "C:\\a\\x.lnk", "C:\\a\\app.ico", "C:\\a\\s.url", "C:\\a\\README"] {
            assert_eq!(CacheKey::for_path(Path::new(path)), CacheKey::NotCacheable, "{path}");
        }
    }

    #[test]
    fn cache_key_is_case_insensitive() {
        assert_eq!(
            CacheKey::for_path(Path::new("notes.TXT")),
            CacheKey::ByExtension(".txt".to_string())
        );
    }

    #[test]
    fn format_hint_follows_extension() {
        assert_eq!(FormatHint::from_path(Path::new("a.LNK")), FormatHint::ShortcutLink);
        assert_eq!(FormatHint::from_path(Path::new("a.url")), FormatHint::InternetShortcut);
        assert_eq!(FormatHint::from_path(Path::new("a.sln")), FormatHint::SolutionFile);
        assert_eq!(FormatHint::from_path(Path::new("a.txt")), FormatHint::None);
    }

    #[test]
    fn icon_rejects_mismatched_buffer() {
        assert!(Icon::new(2, 2, vec![0; 3]).is_none());
        assert!(Icon::new(0, 2, Vec::new()).is_none());
    }

    #[test]
    fn release_disposes_only_caller_owned_icons() {
        let shared = Arc::new(Icon::filled(1, 1, 0));
        let cached = ResolvedIcon::new(shared.clone(), IconOwnership::Cache);
        assert!(!cached.release());
        assert_eq!(Arc::strong_count(&shared), 1);

        assert!(ResolvedIcon::caller_owned(Icon::filled(1, 1, 0)).release());
    }
}
