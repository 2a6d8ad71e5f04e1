use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::{CacheKey, Icon, SharedIcon};

type Slot = Arc<Mutex<Option<SharedIcon>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Which path a `get_or_compute` call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Computed,
    Uncached,
}

/// Process-wide icon cache, one icon per shareable extension.
///
/// Each extension gets its own slot. The map lock is held only to find or
/// create a slot; computing an icon holds the slot lock, so concurrent
/// callers for the same extension wait for the first computation instead
/// of repeating it. A computation that produces nothing is not stored and
/// the next caller tries again.
#[derive(Debug, Default)]
pub struct IconCache {
    slots: Mutex<HashMap<String, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl IconCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<E, F>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<Option<(SharedIcon, CacheLookup)>, E>
    where
        F: FnOnce() -> Result<Option<Icon>, E>,
    {
        let CacheKey::ByExtension(extension) = key else {
            return Ok(compute()?.map(|icon| (Arc::new(icon), CacheLookup::Uncached)));
        };

        let slot = self.slot(extension);
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(icon) = cached.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some((Arc::clone(icon), CacheLookup::Hit)));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let Some(icon) = compute()? else {
            return Ok(None);
        };
        let icon = Arc::new(icon);
        *cached = Some(Arc::clone(&icon));
        Ok(Some((icon, CacheLookup::Computed)))
    }

    pub fn get(&self, extension: &str) -> Option<SharedIcon> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(extension).cloned()
        }?;
        let cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        cached.clone()
    }

    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Empties the cache and disposes every stored icon. Returns how many
    /// icons were released.
    pub fn drain(&self) -> usize {
        let slots: Vec<Slot> = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.drain().map(|(_, slot)| slot).collect()
        };
        slots
            .into_iter()
            .filter_map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).take())
            .count()
    }

    fn slot(&self, extension: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(extension.to_string()).or_default())
    }
}
