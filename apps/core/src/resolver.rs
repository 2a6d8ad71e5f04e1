use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};

use crate::apartment::AffineShell;
use crate::error::{IconError, IconErrorKind};
use crate::logging;
use crate::model::{Entry, FolderType, FormatHint, Icon};

const INTERNET_SHORTCUT_SECTION: &str = "InternetShortcut";

/// Where the icon for a handled entry comes from.
#[derive(Debug)]
pub enum IconSource {
    /// Extracted for this entry alone.
    Ready(Icon),
    /// Use the generic file-type icon of another file.
    FileTypeOf(PathBuf),
    /// Nothing found; continue with the entry's (possibly rewritten) target.
    Missing,
}

#[derive(Debug)]
pub enum Outcome {
    Directory { folder: FolderType, link_overlay: bool },
    Handled(IconSource),
    Unhandled,
}

/// Finds icons for formats that point at another file: shortcut links,
/// internet shortcuts and solution files.
pub struct IndirectionResolver {
    shell: AffineShell,
}

impl IndirectionResolver {
    pub fn new(shell: AffineShell) -> Self {
        Self { shell }
    }

    /// Classifies `entry` and may rewrite its target path, label, link
    /// arguments and directory flag.
    pub fn classify(&self, entry: &mut Entry) -> Result<Outcome, IconError> {
        match entry.format_hint {
            FormatHint::ShortcutLink => self.classify_link(entry),
            FormatHint::InternetShortcut => self.classify_url(entry),
            FormatHint::SolutionFile => self.classify_solution(entry),
            FormatHint::None => Ok(Outcome::Unhandled),
        }
    }

    fn classify_link(&self, entry: &mut Entry) -> Result<Outcome, IconError> {
        entry.label = file_stem(entry.original_path());

        let link_path = entry.target_path.clone();
        let resolved = {
            let path = link_path.clone();
            self.shell.call(&link_path, move |shell| shell.resolve_link(&path))
        };
        let Some(link) = recover(resolved, &link_path, "resolve shortcut")? else {
            return Ok(Outcome::Unhandled);
        };

        if link.is_directory {
            entry.is_directory = true;
            entry.reached_via_link = true;
            return Ok(Outcome::Directory {
                folder: FolderType::Open,
                link_overlay: true,
            });
        }

        if link.is_network_root {
            entry.is_directory = true;
            entry.reached_via_link = true;
            return Ok(Outcome::Handled(IconSource::Missing));
        }

        if link.target_path.as_os_str().is_empty() {
            logging::info_at(&link_path, "shortcut has no target");
            return Ok(Outcome::Handled(IconSource::Missing));
        }

        entry.arguments = link.arguments;
        entry.working_directory = link.working_directory;
        entry.target_path = link.target_path;

        let (icon_file, _) = split_icon_location(&link.icon_location);
        if icon_file.as_os_str().is_empty() || !icon_file.is_file() {
            return Ok(Outcome::Handled(IconSource::Missing));
        }

        let extracted = {
            let path = icon_file.clone();
            self.shell
                .call(&icon_file, move |shell| shell.extract_associated_icon(&path))
        };
        let icon = recover(extracted, &icon_file, "shortcut icon location")?.flatten();
        Ok(Outcome::Handled(match icon {
            Some(icon) => IconSource::Ready(icon),
            None => IconSource::Missing,
        }))
    }

    fn classify_url(&self, entry: &mut Entry) -> Result<Outcome, IconError> {
        entry.label = url_label(entry.original_path());

        let path = entry.target_path.clone();
        let source = recover(self.url_icon(&path), &path, "internet shortcut")?;
        Ok(Outcome::Handled(source.unwrap_or(IconSource::Missing)))
    }

    fn url_icon(&self, path: &Path) -> Result<IconSource, IconError> {
        let raw = std::fs::read(path).map_err(|e| IconError::from_io(path, &e))?;
        let text = String::from_utf8_lossy(&raw);
        let icon_file = descriptor_value(&text, INTERNET_SHORTCUT_SECTION, "IconFile")
            .map_err(|e| IconError::new(IconErrorKind::InvalidArgument, path, e))?
            .unwrap_or_default();

        if icon_file.is_empty() {
            let browser = self
                .shell
                .call(path, |shell| shell.default_browser_path())?;
            return Ok(match browser {
                Some(browser) => IconSource::FileTypeOf(browser),
                None => {
                    logging::info_at(path, "internet shortcut has no icon and no default browser");
                    IconSource::Missing
                }
            });
        }

        let icon_file = PathBuf::from(expand_env_vars(&icon_file));
        if !icon_file.is_file() {
            logging::info_at(path, "internet shortcut icon file is missing");
            return Ok(IconSource::Missing);
        }

        let target = icon_file.clone();
        let icon = self
            .shell
            .call(&icon_file, move |shell| shell.extract_associated_icon(&target))?;
        Ok(icon.map(IconSource::Ready).unwrap_or(IconSource::Missing))
    }

    fn classify_solution(&self, entry: &mut Entry) -> Result<Outcome, IconError> {
        let path = entry.target_path.clone();
        let source = recover(self.solution_icon(&path), &path, "solution file")?;
        Ok(Outcome::Handled(source.unwrap_or(IconSource::Missing)))
    }

    fn solution_icon(&self, path: &Path) -> Result<IconSource, IconError> {
        let document = path.to_path_buf();
        let executable = self
            .shell
            .call(path, move |shell| shell.find_executable(&document))?;
        let Some(executable) = executable else {
            logging::info_at(path, "solution file has no associated executable");
            return Ok(IconSource::Missing);
        };

        let exe = executable.clone();
        let mut icons = self
            .shell
            .call(&executable, move |shell| shell.extract_all_icons(&exe))?;
        match icons.pop() {
            Some(icon) => Ok(IconSource::Ready(icon)),
            None => {
                logging::info_at(
                    path,
                    &format!("'{}' has no embedded icons", executable.display()),
                );
                Ok(IconSource::Missing)
            }
        }
    }
}

/// Logs and swallows a recoverable failure; anything else is returned.
pub(crate) fn recover<T>(
    result: Result<T, IconError>,
    path: &Path,
    step: &str,
) -> Result<Option<T>, IconError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_recoverable() => {
            logging::warn_at(path, step, &error);
            Ok(None)
        }
        Err(error) => {
            logging::error_at(path, step, &error);
            Err(error)
        }
    }
}

/// Reads `key` from `section` of an INI-style descriptor such as an
/// internet shortcut. Section and key names compare case-insensitively.
pub fn descriptor_value(text: &str, section: &str, key: &str) -> Result<Option<String>, String> {
    let options = ParseOption {
        enabled_escape: false,
        ..ParseOption::default()
    };
    let ini = Ini::load_from_str_opt(text.trim_start_matches('\u{feff}'), options)
        .map_err(|e| e.to_string())?;

    let value = ini
        .iter()
        .filter(|(name, _)| name.is_some_and(|name| name.eq_ignore_ascii_case(section)))
        .flat_map(|(_, properties)| properties.iter())
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.trim().to_string());
    Ok(value)
}

pub fn split_icon_location(location: &str) -> (PathBuf, Option<i32>) {
    let location = location.trim();
    if let Some((file, index)) = location.rsplit_once(',') {
        if let Ok(index) = index.trim().parse::<i32>() {
            return (PathBuf::from(expand_env_vars(file.trim())), Some(index));
        }
    }
    (PathBuf::from(expand_env_vars(location)), None)
}

/// Expands `%NAME%` references; unknown names are left as written.
#[cfg(target_os = "windows")]
pub fn expand_env_vars(input: &str) -> String {
    crate::windows_shell::expand_environment_strings(input)
}

#[cfg(not(target_os = "windows"))]
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn url_label(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let keep = name.chars().count().saturating_sub(4);
    name.chars().take(keep).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_icon_file_from_internet_shortcut() {
        let text = "\u{feff}[InternetShortcut]\r\nURL=https://example.com/\r\niconfile = C:\\Icons\\site.ico\r\nIconIndex=0\r\n";
        assert_eq!(
            descriptor_value(text, "InternetShortcut", "IconFile").unwrap().as_deref(),
            Some("C:\\Icons\\site.ico")
        );
        assert_eq!(descriptor_value(text, "InternetShortcut", "HotKey").unwrap(), None);
    }

    #[test]
    fn icon_file_in_other_sections_is_ignored() {
        let text = "[InternetShortcut]\r\nURL=https://x/\r\n[{000214A0-0000-0000-C000-000000000046}]\r\nProp3=19,2\r\nIconFile=C:\\evil.ico\r\n";
        assert_eq!(descriptor_value(text, "InternetShortcut", "IconFile").unwrap(), None);
    }

    #[test]
    fn splits_icon_location_on_last_comma() {
        let (file, index) = split_icon_location(r"C:\Apps\tool,v2\tool.exe,3");
        assert_eq!(file, PathBuf::from(r"C:\Apps\tool,v2\tool.exe"));
        assert_eq!(index, Some(3));

        let (file, index) = split_icon_location(r"C:\Apps\tool.ico");
        assert_eq!(file, PathBuf::from(r"C:\Apps\tool.ico"));
        assert_eq!(index, None);
    }

    #[test]
    fn unknown_environment_references_are_kept() {
        assert_eq!(
            expand_env_vars("%MENUICON_SURELY_UNSET_VAR%\\x.ico"),
            "%MENUICON_SURELY_UNSET_VAR%\\x.ico"
        );
        assert_eq!(expand_env_vars("100%"), "100%");
    }

    #[test]
    fn url_label_strips_extension_characters() {
        assert_eq!(url_label(Path::new("C:\\x\\site.url")), "site");
    }
}
