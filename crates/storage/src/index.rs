// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record index
//!
//! Entry `k` describes record `min_recno + k`, so lookup is a single
//! positioned read. A torn trailing entry is ignored and overwritten by the
//! next append.

use bytes::BytesMut;
use fs2::FileExt;
use gdp_core::Recno;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::error::StoreError;
use crate::layout::{IndexEntry, IndexHeader, INDEX_ENTRY_LEN, INDEX_HEADER_LEN};

pub struct Index {
    path: PathBuf,
    file: Mutex<File>,
    min_recno: Recno,
    /// Whole entries on disk
    count: u64,
}

impl Index {
    pub fn create(path: &Path, min_recno: Recno, sync: bool) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(path.display().to_string()))?;
        let mut buf = BytesMut::with_capacity(INDEX_HEADER_LEN);
        IndexHeader { min_recno }.encode(&mut buf);
        file.write_all(&buf)?;
        if sync {
            file.sync_all()?;
        }
        file.lock_shared()?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            min_recno,
            count: 0,
        })
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        file.try_lock_shared()
            .map_err(|_| StoreError::Locked(path.display().to_string()))?;
        let mut raw = [0u8; INDEX_HEADER_LEN];
        file.read_exact(&mut raw).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                StoreError::corrupt(path.display().to_string(), "truncated index header")
            }
            _ => StoreError::Io(e),
        })?;
        let header = IndexHeader::decode(&raw)?;
        let len = file.seek(SeekFrom::End(0))?;
        let body = len - INDEX_HEADER_LEN as u64;
        let count = body / INDEX_ENTRY_LEN as u64;
        if body % INDEX_ENTRY_LEN as u64 != 0 {
            warn!(
                path = %path.display(),
                trailing = body % INDEX_ENTRY_LEN as u64,
                "ignoring partial index entry"
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            min_recno: header.min_recno,
            count,
        })
    }

    pub fn min_recno(&self) -> Recno {
        self.min_recno
    }

    /// Highest indexed record, or `min_recno - 1` when empty
    pub fn max_recno(&self) -> Recno {
        self.min_recno - 1 + self.count as Recno
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn entry_offset(&self, recno: Recno) -> u64 {
        INDEX_HEADER_LEN as u64 + (recno - self.min_recno) as u64 * INDEX_ENTRY_LEN as u64
    }

    /// Append the entry for the next record; its recno must be `max_recno + 1`
    pub fn append(&mut self, entry: IndexEntry, sync: bool) -> Result<(), StoreError> {
        if entry.recno != self.max_recno() + 1 {
            return Err(StoreError::corrupt(
                self.path.display().to_string(),
                format!(
                    "index entry for {} after {}",
                    entry.recno,
                    self.max_recno()
                ),
            ));
        }
        let mut buf = BytesMut::with_capacity(INDEX_ENTRY_LEN);
        entry.encode(&mut buf);
        let offset = self.entry_offset(entry.recno);
        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&buf)?;
            file.flush()?;
            if sync {
                file.sync_data()?;
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Look up the location of `recno`; caller checks the range first
    pub fn entry(&self, recno: Recno) -> Result<IndexEntry, StoreError> {
        if recno < self.min_recno || recno > self.max_recno() {
            return Err(StoreError::NoRecord(recno));
        }
        let mut raw = [0u8; INDEX_ENTRY_LEN];
        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            file.seek(SeekFrom::Start(self.entry_offset(recno)))?;
            file.read_exact(&mut raw)?;
        }
        let entry = IndexEntry::decode(&raw)?;
        if entry.recno != recno {
            return Err(StoreError::corrupt(
                self.path.display().to_string(),
                format!("slot for {} holds {}", recno, entry.recno),
            ));
        }
        Ok(entry)
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        let file = self.file.get_mut().unwrap_or_else(|e| e.into_inner());
        let _ = FileExt::unlock(&*file);
    }
}
