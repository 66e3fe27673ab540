// Copyright (C) Microsoft Corporation. All rights reserved.

//! Boundary to the OPTIGA secure element.
//!
//! The engine never speaks the wire protocol itself. A session implementation
//! owns the transport, the shielded connection and the key operations, and
//! may persist its context through [`crate::datastore::Datastore`].

use crate::error::SessionResult;
use crate::key_descriptor::AlgorithmFamily;
use crate::key_descriptor::KeyDescriptor;

/// A key living in a secure element slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotKey {
    pub slot_id: u16,
    pub algorithm_family: AlgorithmFamily,
    /// DER SubjectPublicKeyInfo of the slot key, empty if unknown.
    pub public_key: Vec<u8>,
}

/// Operations the engine needs from a secure element session.
///
/// Implementations are only ever called with the engine lock held, so they
/// need not be reentrant.
pub trait SecureElementSession: Send {
    /// Open the session, restoring any persisted context.
    fn open(&mut self) -> SessionResult<()>;

    /// Close the session. Must tolerate being called when not open.
    fn close(&mut self);

    /// Load, or generate when `descriptor.generate_new` is set, the RSA key in
    /// `descriptor.slot_id`.
    fn load_rsa_key(&mut self, descriptor: &KeyDescriptor) -> SessionResult<SlotKey>;
}
