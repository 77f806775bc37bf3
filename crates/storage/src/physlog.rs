// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical storage for one log: extents plus an index
//!
//! One read/write lock serializes appends and lets reads run concurrently.
//! Extent handles are opened lazily and cached for the life of the store.

use gdp_core::{Datum, GdpName, Metadata, Recno};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::extent::Extent;
use crate::index::Index;
use crate::layout::{self, IndexEntry, INDEX_SUFFIX};

/// Tunables for a store
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// `fsync` data and index after every append
    pub sync: bool,
}

struct Inner {
    index: Index,
    current: Arc<Extent>,
}

pub struct LogStore {
    name: GdpName,
    root: PathBuf,
    options: StoreOptions,
    inner: RwLock<Inner>,
    extents: Mutex<HashMap<u32, Arc<Extent>>>,
    /// Runs inside the append critical section, between the extent write
    /// and the index write
    #[cfg(test)]
    append_hook: Mutex<Option<Box<dyn Fn(Recno) + Send + Sync>>>,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl LogStore {
    /// Create extent 0 and the index for a new log
    pub fn create(
        root: &Path,
        name: GdpName,
        metadata: &Metadata,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let dir = layout::log_dir(root, &name);
        std::fs::create_dir_all(&dir)?;

        let index_path = layout::index_path(root, &name);
        if index_path.exists() {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let extent = Extent::create(
            &layout::extent_path(root, &name, 0),
            name,
            0,
            0,
            Some(metadata),
            options.sync,
        )?;
        let index = match Index::create(&index_path, 1, options.sync) {
            Ok(index) => index,
            Err(e) => {
                let path = extent.path().to_path_buf();
                drop(extent);
                let _ = std::fs::remove_file(path);
                return Err(e);
            }
        };
        info!(log = %name, "created physical log");

        let current = Arc::new(extent);
        Ok(Self {
            name,
            root: root.to_path_buf(),
            options,
            extents: Mutex::new(HashMap::from([(0, Arc::clone(&current))])),
            inner: RwLock::new(Inner { index, current }),
            #[cfg(test)]
            append_hook: Mutex::new(None),
        })
    }

    /// Open an existing log, validating the newest extent and the index
    pub fn open(root: &Path, name: GdpName, options: StoreOptions) -> Result<Self, StoreError> {
        let index_path = layout::index_path(root, &name);
        if !index_path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let index = Index::open(&index_path)?;

        let last = Self::extent_ids(root, &name)?
            .into_iter()
            .max()
            .ok_or_else(|| StoreError::corrupt(name.to_string(), "no extent files"))?;
        let current = Arc::new(Extent::open(&layout::extent_path(root, &name, last))?);
        if current.header().name != name {
            return Err(StoreError::corrupt(
                current.path().display().to_string(),
                "extent belongs to a different log",
            ));
        }
        debug!(
            log = %name,
            extent = last,
            max_recno = index.max_recno(),
            "opened physical log"
        );

        Ok(Self {
            name,
            root: root.to_path_buf(),
            options,
            extents: Mutex::new(HashMap::from([(last, Arc::clone(&current))])),
            inner: RwLock::new(Inner { index, current }),
            #[cfg(test)]
            append_hook: Mutex::new(None),
        })
    }

    fn extent_ids(root: &Path, name: &GdpName) -> Result<Vec<u32>, StoreError> {
        let dir = layout::log_dir(root, name);
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|f| layout::parse_extent_file(f, name))
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Every log stored under `root`
    pub fn list(root: &Path) -> Result<Vec<GdpName>, StoreError> {
        let mut names = Vec::new();
        let shards = match std::fs::read_dir(root) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for shard in shards {
            let shard = shard?;
            if !shard.file_name().to_string_lossy().starts_with('_') || !shard.path().is_dir() {
                continue;
            }
            for file in std::fs::read_dir(shard.path())? {
                let file = file?.file_name();
                let Some(stem) = file
                    .to_str()
                    .and_then(|f| f.strip_suffix(INDEX_SUFFIX))
                    .and_then(|f| f.strip_suffix('.'))
                else {
                    continue;
                };
                if let Ok(name) = stem.parse::<GdpName>() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn name(&self) -> GdpName {
        self.name
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of the newest record (0 when empty)
    pub fn max_recno(&self) -> Recno {
        self.read_inner().index.max_recno()
    }

    /// Oldest retained record
    pub fn min_recno(&self) -> Recno {
        self.read_inner().index.min_recno()
    }

    /// Append a record, assigning the next record number.
    ///
    /// The record is written to the current extent, then its index entry.
    /// The in-memory count advances only after both writes succeed.
    pub fn append(&self, datum: &mut Datum) -> Result<Recno, StoreError> {
        let mut inner = self.write_inner();
        let recno = inner.index.max_recno() + 1;
        datum.recno = recno;

        let offset = inner.current.append(datum, self.options.sync)?;
        #[cfg(test)]
        if let Some(hook) = &*self.append_hook.lock().unwrap_or_else(|e| e.into_inner()) {
            hook(recno);
        }
        let entry = IndexEntry {
            recno,
            offset,
            extent: inner.current.id(),
        };
        inner.index.append(entry, self.options.sync)?;
        debug!(log = %self.name, recno, offset, "appended record");
        Ok(recno)
    }

    /// Read one record by absolute number
    pub fn read(&self, recno: Recno) -> Result<Datum, StoreError> {
        let inner = self.read_inner();
        if recno > inner.index.max_recno() {
            return Err(StoreError::NoRecord(recno));
        }
        if recno < inner.index.min_recno() {
            return Err(StoreError::Expired(recno));
        }
        let entry = inner.index.entry(recno)?;
        let extent = self.extent(entry.extent, &inner)?;

        let datum = extent.read(entry.offset)?;
        if datum.recno != recno {
            return Err(StoreError::corrupt(
                extent.path().display().to_string(),
                format!("offset {} holds recno {} not {}", entry.offset, datum.recno, recno),
            ));
        }
        Ok(datum)
    }

    /// Byte location of a record, as recorded in the index
    pub fn locate(&self, recno: Recno) -> Result<IndexEntry, StoreError> {
        self.read_inner().index.entry(recno)
    }

    /// Re-read the metadata stored in extent 0
    pub fn metadata(&self) -> Result<Metadata, StoreError> {
        let inner = self.read_inner();
        let extent = self.extent(0, &inner)?;
        extent.read_metadata()
    }

    fn extent(&self, id: u32, inner: &Inner) -> Result<Arc<Extent>, StoreError> {
        if inner.current.id() == id {
            return Ok(Arc::clone(&inner.current));
        }
        let mut extents = self.extents.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ext) = extents.get(&id) {
            return Ok(Arc::clone(ext));
        }
        let ext = Arc::new(Extent::open(&layout::extent_path(&self.root, &self.name, id))?);
        extents.insert(id, Arc::clone(&ext));
        Ok(ext)
    }

    /// Start a new extent; later appends go there, older ones stay readable
    pub fn rotate(&self) -> Result<u32, StoreError> {
        let mut inner = self.write_inner();
        let id = inner.current.id() + 1;
        let extent = Arc::new(Extent::create(
            &layout::extent_path(&self.root, &self.name, id),
            self.name,
            id,
            inner.index.max_recno(),
            None,
            self.options.sync,
        )?);
        self.extents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&extent));
        inner.current = extent;
        info!(log = %self.name, extent = id, "rotated to new extent");
        Ok(id)
    }

    /// Id of the extent receiving appends
    pub fn current_extent(&self) -> u32 {
        self.read_inner().current.id()
    }
}

#[cfg(test)]
#[path = "physlog_tests.rs"]
mod tests;
