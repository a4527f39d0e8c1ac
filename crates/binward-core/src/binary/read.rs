//! Target file ingestion.
//!
//! Responsibilities:
//! - map the target read-only for the duration of one scan
//! - fingerprint the bytes so reports can state what was audited
//!
//! The mapping is owned by [`MappedFile`] and unmapped on drop, on every
//! exit path of a scan.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use sha2::{Digest, Sha256};

use crate::error::{AuditError, Result};

/// A read-only mapping of one target file plus its content fingerprint.
#[derive(Debug)]
pub struct MappedFile {
    mmap: Mmap,
    sha256: String,
}

impl MappedFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| AuditError::io(path, err))?;
        let len = file
            .metadata()
            .map_err(|err| AuditError::io(path, err))?
            .len();
        // mmap rejects zero-length maps; an empty file cannot carry any magic.
        if len == 0 {
            return Err(AuditError::UnsupportedFormat(path.to_path_buf()));
        }
        // Read-only map; the target is not expected to change during a scan.
        let mmap =
            unsafe { Mmap::map(&file) }.map_err(|err| AuditError::io(path, err))?;
        let sha256 = hex::encode(Sha256::digest(&mmap[..]));
        Ok(Self { mmap, sha256 })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Lower-case hex SHA-256 of the mapped bytes.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}
