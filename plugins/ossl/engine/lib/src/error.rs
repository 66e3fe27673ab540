// Copyright (C) Microsoft Corporation. All rights reserved.

use std::io;
use std::path::PathBuf;

use thiserror;

pub type ParseResult<T> = Result<T, ParseError>;
pub type EngineResult<T> = Result<T, EngineError>;
pub type DatastoreResult<T> = Result<T, DatastoreError>;
pub type SessionResult<T> = Result<T, SessionError>;
pub type HostResult<T> = Result<T, HostError>;

/// Key descriptor parse errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Descriptor carried no slot id at all
    #[error("No key slot in descriptor (key_oid:<pubkeyfile>)")]
    MissingSlot,

    /// More than six colon separated fields
    #[error("Too many fields in descriptor: {0} (at most 6)")]
    TooManyFields(usize),

    /// Legacy single-token descriptor named a file that could not be read
    #[error("Could not read slot id from {path:?}")]
    SlotFileUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Slot id outside the RSA and EC slot ranges
    #[error("Invalid key slot {0:#x}")]
    InvalidSlot(u32),
}

/// Errors reported by the secure element session collaborator
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session has not been opened
    #[error("Secure element session is not open")]
    NotOpen,

    /// Secure element answered with a failure status
    #[error("Secure element returned status {0:#06x}")]
    Status(u16),

    /// Transport to the secure element failed
    #[error("Secure element transport error: {0}")]
    Transport(String),
}

/// Errors reported by the host framework while registering engine pieces
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Host refused the registration
    #[error("Host rejected registration of {0}")]
    Rejected(&'static str),
}

/// Engine lifecycle and dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Key operation attempted before a successful init
    #[error("Engine is not initialized")]
    NotInitialized,

    /// Requested bind id is not ours
    #[error("ID mismatch: {0}")]
    IdMismatch(String),

    /// Secure element session could not be opened
    #[error("Failed to open secure element session")]
    SessionOpenFailed(#[source] SessionError),

    /// Random or RSA provider registration failed
    #[error("Failed to initialize {subsystem} subsystem")]
    SubsystemInitFailed {
        subsystem: &'static str,
        #[source]
        source: HostError,
    },

    /// Host registration step failed
    #[error("Host registration failed")]
    Host(#[from] HostError),

    /// Descriptor could not be parsed
    #[error("Invalid key descriptor")]
    Parse(#[from] ParseError),

    /// Slot is known but has no handler yet
    #[error("Function not implemented for slot {0:#06x}")]
    NotImplemented(u16),

    /// Slot passed validation but no handler is wired to it
    #[error("Invalid OID {0:#06x}")]
    InvalidOid(u16),

    /// Secure element failed to hand out the slot key
    #[error("Failed to load key from slot {slot_id:#06x}")]
    KeyLoadFailed {
        slot_id: u16,
        #[source]
        source: SessionError,
    },

    /// Public key request was empty
    #[error("No public key file given")]
    EmptyKeyId,

    /// Public key file missing or unreadable
    #[error("Failed to open public key file {path:?}")]
    PublicKeyUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Public key file is not a valid container
    #[error("Failed to decode public key file {path:?}")]
    PublicKeyDecode {
        path: PathBuf,
        #[source]
        source: pem::PemError,
    },

    /// Container holds something other than a public key
    #[error("{path:?} holds {label:?}, not a PUBLIC KEY")]
    NotPublicKey { path: PathBuf, label: String },

    /// Public key does not fit the context cache
    #[error("Public key of {len} bytes exceeds cache capacity of {capacity} bytes")]
    PublicKeyTooLarge { len: usize, capacity: usize },

    /// DER bytes did not form a public key
    #[error("Invalid public key")]
    InvalidPublicKey(#[source] openssl::error::ErrorStack),

    /// Log file could not be created
    #[error("Log file error: {0}")]
    LogFile(String),
}

/// Context datastore errors
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    /// Blob id is none of the three known blobs
    #[error("Unsupported datastore id {0:#04x}")]
    Unsupported(u16),

    /// Caller buffer cannot hold the blob
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Blob exceeds the record capacity
    #[error("Blob of {len} bytes exceeds record capacity of {capacity} bytes")]
    BlobTooLarge { len: usize, capacity: usize },

    /// Backing file could not be written or read
    #[error("Datastore I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
