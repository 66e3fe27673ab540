// Copyright (C) Microsoft Corporation. All rights reserved.

use std::fs::File;
use std::io;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub mod config;
use config::LogConfig;

pub mod context;

pub mod datastore;

pub mod engine_internal;
use engine_internal::TrustmEngine;

pub mod error;
use error::EngineError;
use error::EngineResult;

pub mod host;
use host::HostFramework;

pub mod key_descriptor;

pub mod load_key;

pub mod pem_container;

pub mod session;

pub const ENGINE_ID: &str = "trustm_engine";
pub const ENGINE_NAME: &str = "Infineon OPTIGA TrustM Engine";

/// Configure engine logging.
///
/// Installs the global subscriber. If the host process already installed
/// one, that subscriber is kept.
pub fn init_log(config: &LogConfig) -> EngineResult<()> {
    let mut layers = Vec::new();

    if config.stderr {
        let layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_thread_names(true)
            .with_target(true)
            .with_writer(io::stderr)
            .boxed();
        layers.push(layer);
    }

    if let Some(path) = &config.file {
        let file = File::create(path).map_err(|e| EngineError::LogFile(format!("{e}")))?;
        let layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_thread_names(true)
            .with_target(true)
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .boxed();
        layers.push(layer);
    }

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(layers);

    if tracing::subscriber::set_global_default(registry).is_err() {
        tracing::debug!("trustm_engine: subscriber already installed");
        return Ok(());
    }

    tracing::info!("trustm_engine: logging started");
    Ok(())
}

/// Bind the engine to a host.
///
/// Starts logging as configured by `TRUSTM_ENGINE_LOG_STDERR` and
/// `TRUSTM_ENGINE_LOG_FILE` before anything else.
///
/// # Argument
/// * `host` - Host registration surface
/// * `id` - Engine id the host asked for, empty for any
/// * `engine` - Engine to register
///
/// # Return
/// Appropriate error on failure. The engine is left uninitialized if binding
/// fails after init.
pub fn bind(host: &mut dyn HostFramework, id: &str, engine: Arc<TrustmEngine>) -> EngineResult<()> {
    if let Err(e) = init_log(&LogConfig::from_env()) {
        eprintln!("Could not setup logging: {e}");
        Err(e)?;
    }

    if !id.is_empty() && id != ENGINE_ID {
        tracing::error!(id, "engine id mismatch");
        Err(EngineError::IdMismatch(id.to_string()))?;
    }

    host.set_id(ENGINE_ID)?;
    host.set_name(ENGINE_NAME)?;

    engine.init(host)?;

    if let Err(e) = host.set_methods(engine.clone()) {
        engine.shutdown();
        Err(e)?;
    }

    tracing::info!("{ENGINE_NAME} bound");
    Ok(())
}
