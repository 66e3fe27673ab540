// Copyright (C) Microsoft Corporation. All rights reserved.

//! Persistent context datastore.
//!
//! Keeps the three blobs the secure element session layer needs to survive a
//! process restart or hibernate cycle:
//!
//! - the platform binding shared secret, which is compiled in and read-only
//! - the shielded-connection manage context
//! - the hibernate context
//!
//! The two contexts are opaque to this module. Each is stored as the exact
//! bytes last written, in its own file, overwritten on every write.

use std::fs::File;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;
use zeroize::Zeroizing;

use crate::config::DatastoreConfig;
use crate::error::DatastoreError;
use crate::error::DatastoreResult;

/// Largest context record read back, in bytes.
pub const BLOB_RECORD_CAPACITY: usize = 256;

/// Platform binding shared secret provisioned with the secure element.
pub const PLATFORM_BINDING_SHARED_SECRET: [u8; 64] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10,
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, 0x20,
    0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, 0x30,
    0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F, 0x40,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BlobId {
    PlatformBindingSecret = 0x11,
    ManageContext = 0x12,
    HibernateContext = 0x13,
}

impl TryFrom<u16> for BlobId {
    type Error = DatastoreError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x11 => Ok(BlobId::PlatformBindingSecret),
            0x12 => Ok(BlobId::ManageContext),
            0x13 => Ok(BlobId::HibernateContext),
            other => Err(DatastoreError::Unsupported(other)),
        }
    }
}

impl From<BlobId> for u16 {
    fn from(id: BlobId) -> u16 {
        id as u16
    }
}

/// What the backing store holds for a blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobPresence {
    /// Never written
    Absent,
    /// Written with zero bytes
    Empty,
    /// Written with this many bytes
    Stored(usize),
}

pub struct Datastore {
    config: DatastoreConfig,
    // Serializes every read and write
    lock: Mutex<()>,
}

impl Datastore {
    pub fn new(config: DatastoreConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    fn record_path(&self, id: BlobId) -> Option<&Path> {
        match id {
            BlobId::PlatformBindingSecret => None,
            BlobId::ManageContext => Some(&self.config.manage_context_path),
            BlobId::HibernateContext => Some(&self.config.hibernate_context_path),
        }
    }

    /// Store a blob.
    ///
    /// # Arguments
    /// * `blob_id` - Datastore id of the blob
    /// * `data` - Blob contents, replacing whatever was stored
    ///
    /// # Returns
    /// `Ok(())` once the record holds exactly `data`. Writing the platform
    /// binding secret is accepted and does nothing.
    pub fn write(&self, blob_id: u16, data: &[u8]) -> DatastoreResult<()> {
        let id = BlobId::try_from(blob_id)?;
        let _guard = self.lock.lock();

        let Some(path) = self.record_path(id) else {
            tracing::debug!(?id, "platform binding secret is read-only, write ignored");
            return Ok(());
        };

        if data.len() > BLOB_RECORD_CAPACITY {
            tracing::error!(?id, len = data.len(), "blob exceeds record capacity");
            Err(DatastoreError::BlobTooLarge {
                len: data.len(),
                capacity: BLOB_RECORD_CAPACITY,
            })?;
        }

        let io_error = |source: std::io::Error| {
            tracing::error!(?id, ?path, ?source, "failed to write datastore record");
            DatastoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(io_error)?;
                tracing::info!("Created datastore directory: {:?}", parent);
            }
        }

        let mut file = File::create(path).map_err(io_error)?;
        file.write_all(data).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;

        tracing::debug!(?id, len = data.len(), "datastore record written");
        Ok(())
    }

    /// Read a blob.
    ///
    /// # Arguments
    /// * `blob_id` - Datastore id of the blob
    /// * `max_len` - Room the caller has for the blob
    ///
    /// # Returns
    /// The stored bytes. A record that was never written, is empty, or could
    /// not be opened all come back as zero bytes; use [`Datastore::presence`]
    /// to tell them apart.
    pub fn read(&self, blob_id: u16, max_len: usize) -> DatastoreResult<Zeroizing<Vec<u8>>> {
        let id = BlobId::try_from(blob_id)?;
        let _guard = self.lock.lock();

        let Some(path) = self.record_path(id) else {
            if max_len < PLATFORM_BINDING_SHARED_SECRET.len() {
                Err(DatastoreError::BufferTooSmall {
                    needed: PLATFORM_BINDING_SHARED_SECRET.len(),
                    available: max_len,
                })?;
            }
            return Ok(Zeroizing::new(PLATFORM_BINDING_SHARED_SECRET.to_vec()));
        };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) => {
                tracing::warn!(?id, ?path, ?error, "datastore record not readable");
                return Ok(Zeroizing::new(Vec::new()));
            }
        };

        let mut data = Zeroizing::new(Vec::with_capacity(BLOB_RECORD_CAPACITY));
        file.take(BLOB_RECORD_CAPACITY as u64)
            .read_to_end(&mut data)
            .map_err(|source| {
                tracing::error!(?id, ?path, ?source, "failed to read datastore record");
                DatastoreError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        if data.len() > max_len {
            Err(DatastoreError::BufferTooSmall {
                needed: data.len(),
                available: max_len,
            })?;
        }

        tracing::debug!(?id, len = data.len(), "datastore record read");
        Ok(data)
    }

    /// Whether a blob was ever written, and how long it is.
    pub fn presence(&self, blob_id: u16) -> DatastoreResult<BlobPresence> {
        let id = BlobId::try_from(blob_id)?;
        let _guard = self.lock.lock();

        let Some(path) = self.record_path(id) else {
            return Ok(BlobPresence::Stored(PLATFORM_BINDING_SHARED_SECRET.len()));
        };

        match std::fs::metadata(path) {
            Ok(metadata) if metadata.len() == 0 => Ok(BlobPresence::Empty),
            Ok(metadata) => Ok(BlobPresence::Stored(metadata.len() as usize)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(BlobPresence::Absent),
            Err(source) => Err(DatastoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
