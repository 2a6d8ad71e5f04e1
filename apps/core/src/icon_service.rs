use std::path::Path;
use std::sync::Arc;

use crate::apartment::{AffineShell, Apartment, ApartmentError, StaApartment};
use crate::cache::{CacheLookup, IconCache};
use crate::config::{validate, Config};
use crate::error::IconError;
use crate::logging;
use crate::model::{CacheKey, Entry, FolderType, IconOwnership, ResolvedIcon, SharedIcon};
use crate::overlay::{compose, placeholder_icon};
use crate::resolver::{recover, IconSource, IndirectionResolver, Outcome};
use crate::shell::{default_shell, ShellProvider};

const APARTMENT_THREAD_NAME: &str = "menuicon-sta";

#[derive(Debug)]
pub enum ServiceError {
    Config(String),
    Apartment(ApartmentError),
    Icon(IconError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(error) => write!(f, "config error: {error}"),
            Self::Apartment(error) => write!(f, "apartment error: {error}"),
            Self::Icon(error) => write!(f, "icon resolution failed: {error}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ApartmentError> for ServiceError {
    fn from(value: ApartmentError) -> Self {
        Self::Apartment(value)
    }
}

impl From<IconError> for ServiceError {
    fn from(value: IconError) -> Self {
        Self::Icon(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub cached_icons_released: usize,
    /// False when a row still held the placeholder at shutdown.
    pub placeholder_released: bool,
}

/// Turns entries into icons: indirection first, then the shared
/// per-extension cache, then the placeholder, then the hidden-entry
/// overlay. Owns the cache, the placeholder and the icon apartment for
/// the lifetime of the process.
pub struct IconService {
    config: Config,
    shell: AffineShell,
    resolver: IndirectionResolver,
    cache: IconCache,
    placeholder: SharedIcon,
}

impl IconService {
    pub fn initialize(config: Config) -> Result<Self, ServiceError> {
        let apartment = Arc::new(StaApartment::spawn(APARTMENT_THREAD_NAME)?);
        Self::with_parts(config, default_shell(), apartment)
    }

    pub fn with_parts(
        config: Config,
        shell: Arc<dyn ShellProvider>,
        apartment: Arc<dyn Apartment>,
    ) -> Result<Self, ServiceError> {
        validate(&config).map_err(ServiceError::Config)?;
        let shell = AffineShell::new(shell, apartment);
        let placeholder = Arc::new(placeholder_icon(config.icon_size, config.placeholder_alpha));
        Ok(Self {
            resolver: IndirectionResolver::new(shell.clone()),
            shell,
            cache: IconCache::new(),
            placeholder,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &IconCache {
        &self.cache
    }

    pub fn placeholder(&self) -> ResolvedIcon {
        ResolvedIcon::new(Arc::clone(&self.placeholder), IconOwnership::Shared)
    }

    /// Resolves the icon for one menu row. Recoverable shell failures end
    /// in the placeholder; only unexpected failures are returned.
    pub fn resolve_icon(&self, entry: &mut Entry) -> Result<ResolvedIcon, IconError> {
        let chosen = self
            .resolve_base(entry)?
            .unwrap_or_else(|| self.placeholder());

        if entry.is_hidden_entry {
            if let Some(composite) = compose(Some(chosen.icon()), &self.placeholder) {
                return Ok(ResolvedIcon::caller_owned(composite));
            }
        }
        Ok(chosen)
    }

    pub fn shutdown(self) -> ShutdownReport {
        let cached_icons_released = self.cache.drain();
        self.shell.apartment().shutdown();
        let placeholder_released = Arc::try_unwrap(self.placeholder).is_ok();
        logging::info(&format!(
            "icon service shut down: cached_icons_released={cached_icons_released} placeholder_released={placeholder_released}"
        ));
        ShutdownReport {
            cached_icons_released,
            placeholder_released,
        }
    }

    fn resolve_base(&self, entry: &mut Entry) -> Result<Option<ResolvedIcon>, IconError> {
        if entry.target_path.as_os_str().is_empty() {
            logging::info_at(entry.original_path(), "entry has an empty target path");
            return Ok(None);
        }

        if entry.is_directory {
            return self.folder_icon(&entry.target_path, FolderType::Closed, false);
        }

        match self.resolver.classify(entry)? {
            Outcome::Directory {
                folder,
                link_overlay,
            } => return self.folder_icon(&entry.target_path, folder, link_overlay),
            Outcome::Handled(IconSource::Ready(icon)) => {
                return Ok(Some(ResolvedIcon::caller_owned(icon)))
            }
            Outcome::Handled(IconSource::FileTypeOf(path)) => return self.file_icon(&path),
            Outcome::Handled(IconSource::Missing) | Outcome::Unhandled => {}
        }

        let target = entry.target_path.clone();
        self.file_icon(&target)
    }

    fn folder_icon(
        &self,
        path: &Path,
        folder: FolderType,
        link_overlay: bool,
    ) -> Result<Option<ResolvedIcon>, IconError> {
        let target = path.to_path_buf();
        let size = self.config.icon_size;
        let looked_up = self.shell.call(path, move |shell| {
            shell.lookup_folder_icon(&target, folder, link_overlay, size)
        });
        let icon = recover(looked_up, path, "folder icon")?.flatten();
        Ok(icon.map(ResolvedIcon::caller_owned))
    }

    fn file_icon(&self, path: &Path) -> Result<Option<ResolvedIcon>, IconError> {
        let key = CacheKey::for_path(path);
        let target = path.to_path_buf();
        let size = self.config.icon_size;
        let looked_up = self.cache.get_or_compute(&key, || {
            self.shell
                .call(path, move |shell| shell.lookup_file_icon(&target, false, size))
        });

        let found = recover(looked_up, path, "file icon")?.flatten();
        Ok(found.map(|(icon, lookup)| {
            let ownership = match lookup {
                CacheLookup::Hit | CacheLookup::Computed => IconOwnership::Cache,
                CacheLookup::Uncached => IconOwnership::Caller,
            };
            ResolvedIcon::new(icon, ownership)
        }))
    }
}
