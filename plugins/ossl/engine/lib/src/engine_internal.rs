// Copyright (C) Microsoft Corporation. All rights reserved.

use std::path::Path;

use engine_common::Handle;
use engine_common::HandleTable;
use openssl::pkey::PKey;
use parking_lot::Mutex;

use crate::context::EngineContext;
use crate::error::EngineError;
use crate::error::EngineResult;
use crate::host::EngineMethods;
use crate::host::HostFramework;
use crate::host::PrivateKey;
use crate::host::PublicKey;
use crate::key_descriptor::parse_with_defaults;
use crate::load_key::dispatch_private_key;
use crate::load_key::read_public_key;
use crate::session::SecureElementSession;
use crate::session::SlotKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    ShuttingDown,
}

struct EngineState {
    lifecycle: Lifecycle,
    context: EngineContext,
    session: Box<dyn SecureElementSession>,
}

impl EngineState {
    fn require_initialized(&self) -> EngineResult<()> {
        if self.lifecycle != Lifecycle::Initialized {
            tracing::error!(lifecycle = ?self.lifecycle, "engine not initialized");
            Err(EngineError::NotInitialized)?;
        }
        Ok(())
    }

    /// Undo a partial init.
    fn abort_init(&mut self) {
        self.context.wipe();
        self.session.close();
        self.lifecycle = Lifecycle::Uninitialized;
    }
}

/// OPTIGA Trust M engine.
///
/// Every lifecycle and key load call runs under one lock, so the host may
/// share the engine freely between threads.
pub struct TrustmEngine {
    state: Mutex<EngineState>,
    keys: HandleTable<SlotKey>,
}

impl TrustmEngine {
    pub fn new(session: Box<dyn SecureElementSession>) -> Self {
        Self {
            state: Mutex::new(EngineState {
                lifecycle: Lifecycle::Uninitialized,
                context: EngineContext::default(),
                session,
            }),
            keys: HandleTable::default(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    /// Open the secure element session and register the random and RSA
    /// providers with the host. Does nothing if already initialized.
    pub fn init(&self, host: &mut dyn HostFramework) -> EngineResult<()> {
        let mut state = self.state.lock();

        if state.lifecycle == Lifecycle::Initialized {
            tracing::debug!("engine already initialized");
            return Ok(());
        }

        state.session.open().map_err(|source| {
            tracing::error!(?source, "Failed to open secure element session");
            EngineError::SessionOpenFailed(source)
        })?;

        state.context.reset_defaults();

        if let Err(source) = host.register_rand() {
            tracing::error!(?source, "Failed to initialize RAND subsystem");
            state.abort_init();
            return Err(EngineError::SubsystemInitFailed {
                subsystem: "RAND",
                source,
            });
        }

        let schemes = state.context.rsa_schemes();
        if let Err(source) = host.register_rsa(schemes) {
            tracing::error!(?source, "Failed to initialize RSA subsystem");
            state.abort_init();
            return Err(EngineError::SubsystemInitFailed {
                subsystem: "RSA",
                source,
            });
        }

        state.lifecycle = Lifecycle::Initialized;
        tracing::info!("engine initialized");
        Ok(())
    }

    /// Load the private key a descriptor names.
    ///
    /// # Arguments
    /// * `key_id` - Key descriptor, `slot:pubkeyfile:NEW:type:usage:LOCK`
    ///
    /// # Returns
    /// A handle to the slot key
    pub fn load_private_key(&self, key_id: &str) -> EngineResult<PrivateKey> {
        let mut state = self.state.lock();
        state.require_initialized()?;

        let descriptor = parse_with_defaults(key_id, state.context.generation_defaults())?;
        state.context.set_descriptor(descriptor.clone());

        let slot_key = dispatch_private_key(state.session.as_mut(), &descriptor)?;
        if !slot_key.public_key.is_empty() {
            state.context.cache_public_key(&slot_key.public_key)?;
        }

        let private_key = PrivateKey {
            slot_id: slot_key.slot_id,
            algorithm_family: slot_key.algorithm_family,
            handle: self.keys.insert(slot_key),
        };
        tracing::debug!(
            handle = private_key.handle,
            slot = %format!("{:#06x}", private_key.slot_id),
            "private key loaded"
        );
        Ok(private_key)
    }

    /// Drop a loaded private key.
    pub fn free_private_key(&self, handle: Handle) -> Option<SlotKey> {
        let slot_key = self.keys.remove(handle);
        match &slot_key {
            Some(key) => tracing::debug!(
                handle,
                slot = %format!("{:#06x}", key.slot_id),
                "private key freed"
            ),
            None => tracing::warn!(handle, "free of unknown key handle"),
        }
        slot_key
    }

    /// Load a public key from a PEM file.
    ///
    /// The context is only updated once the key has been fully decoded.
    pub fn load_public_key(&self, key_id: &str) -> EngineResult<PublicKey> {
        let mut state = self.state.lock();
        state.require_initialized()?;

        if key_id.is_empty() {
            Err(EngineError::EmptyKeyId)?;
        }

        let der = read_public_key(Path::new(key_id))?;
        let pkey = PKey::public_key_from_der(&der).map_err(|source| {
            tracing::error!(path = key_id, ?source, "Invalid public key");
            EngineError::InvalidPublicKey(source)
        })?;

        state.context.cache_public_key(&der)?;
        state.context.set_public_key_ref(key_id);

        tracing::debug!(path = key_id, len = der.len(), "public key loaded");
        Ok(PublicKey { pkey })
    }

    /// Wipe the context, drop every loaded key and close the session.
    /// Safe to call any number of times.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        let was_initialized = state.lifecycle == Lifecycle::Initialized;

        state.lifecycle = Lifecycle::ShuttingDown;
        state.context.wipe();
        let dropped = self.keys.clear();
        state.session.close();
        state.lifecycle = Lifecycle::Uninitialized;

        if was_initialized {
            tracing::info!(dropped_keys = dropped, "engine shut down");
        }
    }

    /// Run `f` against the current context.
    pub fn inspect_context<R>(&self, f: impl FnOnce(&EngineContext) -> R) -> R {
        f(&self.state.lock().context)
    }

    pub fn slot_key(&self, handle: Handle) -> Option<SlotKey> {
        self.keys.get(handle)
    }

    pub fn loaded_keys(&self) -> usize {
        self.keys.len()
    }
}

impl EngineMethods for TrustmEngine {
    fn load_private_key(&self, key_id: &str) -> Option<PrivateKey> {
        match TrustmEngine::load_private_key(self, key_id) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(key_id, error = %e, "Could not load private key");
                None
            }
        }
    }

    fn load_public_key(&self, key_id: &str) -> Option<PublicKey> {
        match TrustmEngine::load_public_key(self, key_id) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(key_id, error = %e, "Could not load public key");
                None
            }
        }
    }

    fn free_private_key(&self, handle: Handle) -> bool {
        TrustmEngine::free_private_key(self, handle).is_some()
    }

    fn finish(&self) -> EngineResult<()> {
        tracing::debug!("engine finish");
        Ok(())
    }

    fn destroy(&self) -> EngineResult<()> {
        self.shutdown();
        Ok(())
    }

    fn ctrl(&self, cmd: i32, _arg: i64) -> EngineResult<()> {
        tracing::info!(cmd, "Function Not implemented.");
        Ok(())
    }
}

impl Drop for TrustmEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
