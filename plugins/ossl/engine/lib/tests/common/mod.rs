// Copyright (C) Microsoft Corporation. All rights reserved.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use openssl::bn::BigNum;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use parking_lot::Mutex;
use trustmengine::context::RsaSchemes;
use trustmengine::datastore::BlobId;
use trustmengine::datastore::Datastore;
use trustmengine::engine_internal::TrustmEngine;
use trustmengine::error::HostError;
use trustmengine::error::HostResult;
use trustmengine::error::SessionError;
use trustmengine::error::SessionResult;
use trustmengine::host::EngineMethods;
use trustmengine::host::HostFramework;
use trustmengine::key_descriptor::AlgorithmFamily;
use trustmengine::key_descriptor::KeyDescriptor;
use trustmengine::session::SecureElementSession;
use trustmengine::session::SlotKey;

/// OPTIGA status for an empty key slot.
pub const STATUS_EMPTY_SLOT: u16 = 0x8001;

/// Everything the scripted session saw.
#[derive(Default, Debug)]
pub struct SessionLog {
    pub open: bool,
    pub opens: usize,
    pub restored_contexts: Vec<Vec<u8>>,
    pub requests: Vec<KeyDescriptor>,
    pub locked_slots: Vec<u16>,
}

/// Secure element stand-in.
///
/// Generates real RSA keys per slot and persists its shielded connection
/// context through the datastore across close and open, the way a hardware
/// session does across a process restart.
pub struct ScriptedSession {
    datastore: Arc<Datastore>,
    slots: HashMap<u16, Vec<u8>>,
    log: Arc<Mutex<SessionLog>>,
}

impl ScriptedSession {
    pub fn new(datastore: Arc<Datastore>) -> (Self, Arc<Mutex<SessionLog>>) {
        let log = Arc::new(Mutex::new(SessionLog::default()));
        let session = Self {
            datastore,
            slots: HashMap::new(),
            log: log.clone(),
        };
        (session, log)
    }
}

impl SecureElementSession for ScriptedSession {
    fn open(&mut self) -> SessionResult<()> {
        let context = self
            .datastore
            .read(BlobId::ManageContext.into(), 256)
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let mut log = self.log.lock();
        log.restored_contexts.push(context.to_vec());
        log.open = true;
        log.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut log = self.log.lock();
        if !log.open {
            return;
        }
        log.open = false;

        let context = [log.opens as u8; 64];
        let _ = self.datastore.write(BlobId::ManageContext.into(), &context);
    }

    fn load_rsa_key(&mut self, descriptor: &KeyDescriptor) -> SessionResult<SlotKey> {
        let mut log = self.log.lock();
        if !log.open {
            return Err(SessionError::NotOpen);
        }
        log.requests.push(descriptor.clone());

        if descriptor.generate_new {
            if log.locked_slots.contains(&descriptor.slot_id) {
                return Err(SessionError::Status(0x8008));
            }
            let rsa = Rsa::generate(2048).map_err(|e| SessionError::Transport(e.to_string()))?;
            let der = rsa
                .public_key_to_der()
                .map_err(|e| SessionError::Transport(e.to_string()))?;
            self.slots.insert(descriptor.slot_id, der);
            if descriptor.lock_after_generate {
                log.locked_slots.push(descriptor.slot_id);
            }
        }

        let public_key = self
            .slots
            .get(&descriptor.slot_id)
            .cloned()
            .ok_or(SessionError::Status(STATUS_EMPTY_SLOT))?;

        Ok(SlotKey {
            slot_id: descriptor.slot_id,
            algorithm_family: AlgorithmFamily::Rsa,
            public_key,
        })
    }
}

/// Host that records what the engine registers.
#[derive(Default)]
pub struct RecordingHost {
    pub id: Option<String>,
    pub name: Option<String>,
    pub rand_registered: bool,
    pub rsa_schemes: Option<RsaSchemes>,
    pub methods: Option<Arc<dyn EngineMethods>>,
    pub reject_rand: bool,
}

impl HostFramework for RecordingHost {
    fn set_id(&mut self, id: &str) -> HostResult<()> {
        self.id = Some(id.to_string());
        Ok(())
    }

    fn set_name(&mut self, name: &str) -> HostResult<()> {
        self.name = Some(name.to_string());
        Ok(())
    }

    fn register_rand(&mut self) -> HostResult<()> {
        if self.reject_rand {
            return Err(HostError::Rejected("RAND"));
        }
        self.rand_registered = true;
        Ok(())
    }

    fn register_rsa(&mut self, schemes: RsaSchemes) -> HostResult<()> {
        self.rsa_schemes = Some(schemes);
        Ok(())
    }

    fn set_methods(&mut self, methods: Arc<dyn EngineMethods>) -> HostResult<()> {
        self.methods = Some(methods);
        Ok(())
    }
}

// Fields drop in order; the engine persists its session context on drop, so
// the directory must outlive it.
pub struct Fixture {
    pub engine: Arc<TrustmEngine>,
    pub datastore: Arc<Datastore>,
    pub log: Arc<Mutex<SessionLog>>,
    pub dir: tempfile::TempDir,
}

/// Engine over a scripted session with a datastore in a fresh directory.
pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("Could not create temp dir");
    let datastore = Arc::new(Datastore::new(
        trustmengine::config::DatastoreConfig::in_dir(dir.path()),
    ));
    let (session, log) = ScriptedSession::new(datastore.clone());
    let engine = Arc::new(TrustmEngine::new(Box::new(session)));
    Fixture {
        engine,
        datastore,
        log,
        dir,
    }
}

pub fn write_rsa_public_key_pem(path: &Path, bits: u32) -> Vec<u8> {
    let rsa = Rsa::generate(bits).expect("Could not generate RSA key");
    let pkey = PKey::from_rsa(rsa).expect("Could not wrap RSA key");
    std::fs::write(path, pkey.public_key_to_pem().expect("Could not encode PEM"))
        .expect("Could not write PEM");
    pkey.public_key_to_der().expect("Could not encode DER")
}

/// PEM public key whose DER form exceeds `modulus_bytes`.
///
/// The modulus need not be a product of primes for the key to decode.
pub fn write_oversized_public_key_pem(path: &Path, modulus_bytes: usize) {
    let n = BigNum::from_slice(&vec![0xFF; modulus_bytes]).expect("Could not build modulus");
    let e = BigNum::from_u32(65537).expect("Could not build exponent");
    let rsa = Rsa::from_public_components(n, e).expect("Could not build RSA key");
    let pkey = PKey::from_rsa(rsa).expect("Could not wrap RSA key");
    std::fs::write(path, pkey.public_key_to_pem().expect("Could not encode PEM"))
        .expect("Could not write PEM");
}
