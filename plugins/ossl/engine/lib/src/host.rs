// Copyright (C) Microsoft Corporation. All rights reserved.

//! Surface shared with the host crypto framework.
//!
//! The host drives the engine through [`EngineMethods`]. The engine registers
//! itself and its primitive providers through [`HostFramework`], which the
//! embedding adapter implements on top of the host's native registration
//! calls.

use std::sync::Arc;

use engine_common::Handle;
use openssl::pkey::PKey;
use openssl::pkey::Public;

use crate::context::RsaSchemes;
use crate::error::EngineResult;
use crate::error::HostResult;
use crate::key_descriptor::AlgorithmFamily;

/// Private key handed to the host. The key material stays in the secure
/// element, the host only ever holds the handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrivateKey {
    pub handle: Handle,
    pub slot_id: u16,
    pub algorithm_family: AlgorithmFamily,
}

/// Public key loaded from a PEM file.
#[derive(Clone, Debug)]
pub struct PublicKey {
    pub pkey: PKey<Public>,
}

/// Callbacks the host invokes on the engine.
///
/// Key loads return `None` on any failure; the cause is logged.
pub trait EngineMethods: Send + Sync {
    fn load_private_key(&self, key_id: &str) -> Option<PrivateKey>;

    fn load_public_key(&self, key_id: &str) -> Option<PublicKey>;

    /// Host released a private key. Returns false for an unknown handle.
    fn free_private_key(&self, handle: Handle) -> bool;

    /// Host released its functional reference.
    fn finish(&self) -> EngineResult<()>;

    /// Host is tearing the engine down.
    fn destroy(&self) -> EngineResult<()>;

    fn ctrl(&self, cmd: i32, arg: i64) -> EngineResult<()>;
}

/// Registration calls into the host.
pub trait HostFramework {
    fn set_id(&mut self, id: &str) -> HostResult<()>;

    fn set_name(&mut self, name: &str) -> HostResult<()>;

    /// Route the host's random number generation to the secure element.
    fn register_rand(&mut self) -> HostResult<()>;

    /// Route the host's RSA operations to the secure element using `schemes`.
    fn register_rsa(&mut self, schemes: RsaSchemes) -> HostResult<()>;

    fn set_methods(&mut self, methods: Arc<dyn EngineMethods>) -> HostResult<()>;
}
