// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One segment file of a log
//!
//! An extent is a header, the log metadata (extent 0 only) and then records
//! written back to back. Each file handle has its own mutex held only for a
//! single positioned read or write.

use bytes::{Bytes, BytesMut};
use fs2::FileExt;
use gdp_core::{Datum, GdpName, Metadata, Recno, Signature};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::layout::{ExtentHeader, RecordHeader, EXTENT_HEADER_LEN, RECORD_HEADER_LEN};

struct ExtentFile {
    file: File,
    /// Next append offset
    size: u64,
}

pub struct Extent {
    id: u32,
    path: PathBuf,
    header: ExtentHeader,
    inner: Mutex<ExtentFile>,
}

impl Extent {
    /// Create a new extent file; fails if it already exists
    pub fn create(
        path: &Path,
        name: GdpName,
        id: u32,
        recno_offset: Recno,
        metadata: Option<&Metadata>,
        sync: bool,
    ) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(name.to_string()),
                _ => StoreError::Io(e),
            })?;
        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(path.display().to_string()))?;

        let (md_count, md_len) = metadata
            .map(|m| (m.len() as u16, m.body_len()))
            .unwrap_or((0, 0));
        let header = ExtentHeader::new(name, id, recno_offset, md_count, md_len);

        let mut buf = BytesMut::with_capacity(header.header_size as usize);
        header.encode(&mut buf);
        if let Some(m) = metadata {
            m.write_body(&mut buf);
        }
        file.write_all(&buf)?;
        if sync {
            file.sync_all()?;
        }
        // downgrade to shared for as long as the log stays open
        file.lock_shared()?;

        Ok(Self {
            id,
            path: path.to_path_buf(),
            header,
            inner: Mutex::new(ExtentFile {
                file,
                size: buf.len() as u64,
            }),
        })
    }

    /// Open an existing extent and validate its header
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        file.try_lock_shared()
            .map_err(|_| StoreError::Locked(path.display().to_string()))?;

        let mut raw = [0u8; EXTENT_HEADER_LEN];
        file.read_exact(&mut raw).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                StoreError::corrupt(path.display().to_string(), "truncated extent header")
            }
            _ => StoreError::Io(e),
        })?;
        let header = ExtentHeader::decode(&raw)?;
        let size = file.seek(SeekFrom::End(0))?;
        if size < header.header_size as u64 {
            return Err(StoreError::corrupt(
                path.display().to_string(),
                "file shorter than its header",
            ));
        }

        Ok(Self {
            id: header.extent,
            path: path.to_path_buf(),
            header,
            inner: Mutex::new(ExtentFile { file, size }),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn header(&self) -> &ExtentHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current end of file
    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).size
    }

    /// Read the metadata block following the header
    pub fn read_metadata(&self) -> Result<Metadata, StoreError> {
        let md_len = self.header.header_size as usize - EXTENT_HEADER_LEN;
        let mut raw = vec![0u8; md_len];
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.file.seek(SeekFrom::Start(EXTENT_HEADER_LEN as u64))?;
            inner.file.read_exact(&mut raw)?;
        }
        Metadata::read_body(self.header.md_count as usize, &mut &raw[..])
            .map_err(|e| StoreError::corrupt(self.path.display().to_string(), e.message))
    }

    /// Append one record at the end of the file, returning its offset
    pub fn append(&self, datum: &Datum, sync: bool) -> Result<u64, StoreError> {
        let hdr = RecordHeader::for_datum(datum);
        let sig_len = datum.sig.as_ref().map_or(0, |s| s.bytes.len());
        let mut buf = BytesMut::with_capacity(RECORD_HEADER_LEN + datum.data.len() + sig_len);
        hdr.encode(&mut buf);
        buf.extend_from_slice(&datum.data);
        if let Some(sig) = &datum.sig {
            buf.extend_from_slice(&sig.bytes);
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let offset = inner.size;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&buf)?;
        inner.file.flush()?;
        if sync {
            inner.file.sync_data()?;
        }
        inner.size = offset + buf.len() as u64;
        Ok(offset)
    }

    /// Read the record whose header starts at `offset`
    pub fn read(&self, offset: u64) -> Result<Datum, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let header_end = offset.checked_add(RECORD_HEADER_LEN as u64);
        if offset < self.header.header_size as u64 || header_end.map_or(true, |end| end > inner.size) {
            return Err(StoreError::corrupt(
                self.path.display().to_string(),
                format!("record offset {} outside extent", offset),
            ));
        }
        inner.file.seek(SeekFrom::Start(offset))?;
        let mut raw = [0u8; RECORD_HEADER_LEN];
        inner.file.read_exact(&mut raw)?;
        let hdr = RecordHeader::decode(&raw)?;
        // Lengths come from disk; bound them by the file before allocating
        let record_end = hdr.record_len().and_then(|len| offset.checked_add(len));
        if record_end.map_or(true, |end| end > inner.size) {
            return Err(StoreError::corrupt(
                self.path.display().to_string(),
                format!("record {} runs past end of extent", hdr.recno),
            ));
        }

        let mut data = vec![0u8; hdr.data_length as usize];
        inner.file.read_exact(&mut data)?;
        let sig = match hdr.sig_len() {
            0 => None,
            n => {
                let mut bytes = vec![0u8; n];
                inner.file.read_exact(&mut bytes)?;
                Some(Signature {
                    md_alg: hdr.md_alg(),
                    bytes: Bytes::from(bytes),
                })
            }
        };

        Ok(Datum {
            recno: hdr.recno,
            ts: hdr.ts,
            data: Bytes::from(data),
            sig,
        })
    }
}

impl Drop for Extent {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        let _ = FileExt::unlock(&inner.file);
    }
}

#[cfg(test)]
#[path = "extent_tests.rs"]
mod tests;
