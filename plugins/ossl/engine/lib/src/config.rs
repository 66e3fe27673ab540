// Copyright (C) Microsoft Corporation. All rights reserved.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

/// Overrides the directory holding the persisted session contexts
pub const DATASTORE_DIR_ENV: &str = "TRUSTM_DATASTORE_DIR";
/// When set, log to stderr
pub const LOG_STDERR_ENV: &str = "TRUSTM_ENGINE_LOG_STDERR";
/// When set, log to this file
pub const LOG_FILE_ENV: &str = "TRUSTM_ENGINE_LOG_FILE";

const DEFAULT_DATASTORE_DIR: &str = "/var/tmp/trustm";
const MANAGE_CONTEXT_FILE: &str = "manage_context";
const HIBERNATE_CONTEXT_FILE: &str = "hibernate_context";

/// Where the two read-write blobs live on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatastoreConfig {
    pub manage_context_path: PathBuf,
    pub hibernate_context_path: PathBuf,
}

impl DatastoreConfig {
    /// Both records in `dir`, under their default file names.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            manage_context_path: dir.join(MANAGE_CONTEXT_FILE),
            hibernate_context_path: dir.join(HIBERNATE_CONTEXT_FILE),
        }
    }

    /// Resolves the datastore directory with the following priority:
    /// 1. `TRUSTM_DATASTORE_DIR` (if set and non-empty)
    /// 2. `/var/tmp/trustm`
    pub fn from_env() -> Self {
        Self::in_dir(resolve_datastore_dir(env::var_os(DATASTORE_DIR_ENV)))
    }
}

fn resolve_datastore_dir(override_dir: Option<OsString>) -> PathBuf {
    match override_dir.filter(|dir| !dir.is_empty()) {
        Some(dir) => {
            tracing::info!("Using {DATASTORE_DIR_ENV} override: {:?}", dir);
            PathBuf::from(dir)
        }
        None => {
            tracing::debug!("Using default datastore dir: {DEFAULT_DATASTORE_DIR}");
            PathBuf::from(DEFAULT_DATASTORE_DIR)
        }
    }
}

/// Logging sinks, each optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub stderr: bool,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            stderr: env::var_os(LOG_STDERR_ENV).is_some(),
            file: env::var_os(LOG_FILE_ENV).map(PathBuf::from),
        }
    }
}
