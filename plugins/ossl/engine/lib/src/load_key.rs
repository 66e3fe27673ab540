// Copyright (C) Microsoft Corporation. All rights reserved.

use std::path::Path;

use zeroize::Zeroizing;

use crate::error::EngineError;
use crate::error::EngineResult;
use crate::key_descriptor::KeyDescriptor;
use crate::key_descriptor::SlotClass;
use crate::pem_container;
use crate::session::SecureElementSession;
use crate::session::SlotKey;

/// Route a parsed descriptor to the handler for its slot.
///
/// # Arguments
/// * `session` - Open secure element session
/// * `descriptor` - Parsed key request
///
/// # Returns
/// The slot key, or why the slot could not be served
pub(crate) fn dispatch_private_key(
    session: &mut dyn SecureElementSession,
    descriptor: &KeyDescriptor,
) -> EngineResult<SlotKey> {
    let slot_id = descriptor.slot_id;

    match SlotClass::of(slot_id) {
        Some(SlotClass::Rsa) => {
            tracing::debug!(
                slot = %format!("{slot_id:#06x}"),
                generate_new = descriptor.generate_new,
                "loading RSA key"
            );
            session
                .load_rsa_key(descriptor)
                .map_err(|source| {
                    tracing::error!(slot = %format!("{slot_id:#06x}"), ?source, "RSA key load failed");
                    EngineError::KeyLoadFailed { slot_id, source }
                })
        }
        Some(SlotClass::EcDevice | SlotClass::Ec | SlotClass::SessionContext) => {
            tracing::error!(slot = %format!("{slot_id:#06x}"), "Function Not implemented.");
            Err(EngineError::NotImplemented(slot_id))
        }
        None => {
            tracing::error!(slot = %format!("{slot_id:#06x}"), "Invalid OID!!!");
            Err(EngineError::InvalidOid(slot_id))
        }
    }
}

/// Read a PEM `PUBLIC KEY` file and return its DER bytes.
pub(crate) fn read_public_key(path: &Path) -> EngineResult<Zeroizing<Vec<u8>>> {
    let container = pem_container::decode_file(path)?;

    if !container.is_public_key() {
        tracing::error!(?path, label = %container.label, "not a public key");
        Err(EngineError::NotPublicKey {
            path: path.to_path_buf(),
            label: container.label.clone(),
        })?;
    }

    Ok(container.der)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::key_descriptor::parse;
    use crate::session::mock::MockSession;

    #[test]
    fn test_dispatch_rsa() {
        let (mut session, state) = MockSession::new();
        session.open().unwrap();
        state.lock().public_key = vec![0x30, 0x01];

        let descriptor = parse("0xE0FD:*:NEW").unwrap();
        let key = dispatch_private_key(&mut session, &descriptor).unwrap();
        assert_eq!(key.slot_id, 0xE0FD);
        assert_eq!(key.public_key, vec![0x30, 0x01]);
        assert_eq!(state.lock().loaded, vec![descriptor]);
    }

    #[test]
    fn test_dispatch_rsa_failure() {
        let (mut session, _state) = MockSession::new();

        let descriptor = parse("0xE0FC").unwrap();
        let result = dispatch_private_key(&mut session, &descriptor);
        assert!(matches!(
            result,
            Err(EngineError::KeyLoadFailed {
                slot_id: 0xE0FC,
                source: SessionError::NotOpen
            })
        ));
    }

    #[test]
    fn test_dispatch_not_implemented() {
        let (mut session, state) = MockSession::new();
        session.open().unwrap();

        for slot_id in [0xE0F0, 0xE0F1, 0xE0F2, 0xE0F3, 0xE100, 0xE103] {
            let descriptor = KeyDescriptor {
                slot_id,
                ..Default::default()
            };
            let result = dispatch_private_key(&mut session, &descriptor);
            assert!(
                matches!(result, Err(EngineError::NotImplemented(id)) if id == slot_id),
                "slot {slot_id:#x}"
            );
        }
        assert!(state.lock().loaded.is_empty());
    }

    #[test]
    fn test_dispatch_invalid_oid() {
        let (mut session, _state) = MockSession::new();
        session.open().unwrap();

        for slot_id in [0x0000, 0xE0F4, 0xE0FE, 0xE104] {
            let descriptor = KeyDescriptor {
                slot_id,
                ..Default::default()
            };
            let result = dispatch_private_key(&mut session, &descriptor);
            assert!(matches!(result, Err(EngineError::InvalidOid(id)) if id == slot_id));
        }
    }

    #[test]
    fn test_read_public_key_wrong_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cert.pem");
        std::fs::write(
            &path,
            "-----BEGIN CERTIFICATE-----\nAQIDBA==\n-----END CERTIFICATE-----\n",
        )
        .unwrap();

        let result = read_public_key(&path);
        assert!(matches!(
            result,
            Err(EngineError::NotPublicKey { label, .. }) if label == "CERTIFICATE"
        ));
    }
}
