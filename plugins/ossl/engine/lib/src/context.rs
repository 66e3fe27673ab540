// Copyright (C) Microsoft Corporation. All rights reserved.

use zeroize::Zeroize;

use crate::error::EngineError;
use crate::error::EngineResult;
use crate::key_descriptor::AlgorithmFamily;
use crate::key_descriptor::KeyDescriptor;

// OPTIGA key type, usage and scheme codes
pub const RSA_KEY_2048_BIT_EXPONENTIAL: u32 = 0x42;
pub const EC_CURVE_NIST_P_256: u32 = 0x03;
pub const KEY_USAGE_AUTHENTICATION: u32 = 0x01;
pub const RSAES_PKCS1_V15: u32 = 0x11;
pub const RSASSA_PKCS1_V15_SHA256: u32 = 0x01;

/// Capacity of the cached public key, enough for a DER RSA-4096 SPKI.
pub const PUBLIC_KEY_CAPACITY: usize = 1024;

/// Key type (or curve) and usage for a freshly generated key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyParams {
    pub key_type_or_curve: u32,
    pub key_usage: u32,
}

/// Generation parameters used when a `NEW` descriptor leaves them out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationDefaults {
    pub rsa: KeyParams,
    pub ec: KeyParams,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            rsa: KeyParams {
                key_type_or_curve: RSA_KEY_2048_BIT_EXPONENTIAL,
                key_usage: KEY_USAGE_AUTHENTICATION,
            },
            ec: KeyParams {
                key_type_or_curve: EC_CURVE_NIST_P_256,
                key_usage: KEY_USAGE_AUTHENTICATION,
            },
        }
    }
}

impl GenerationDefaults {
    pub fn for_family(&self, family: AlgorithmFamily) -> KeyParams {
        match family {
            AlgorithmFamily::Rsa => self.rsa,
            AlgorithmFamily::Ec => self.ec,
        }
    }

    fn zeroed() -> Self {
        Self {
            rsa: KeyParams::default(),
            ec: KeyParams::default(),
        }
    }
}

/// RSA padding schemes used for engine RSA operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RsaSchemes {
    pub encryption: u32,
    pub signature: u32,
}

/// Per-engine key request state.
///
/// Lives behind the engine lock. Everything in here is wiped on shutdown,
/// including the cached public key bytes.
pub struct EngineContext {
    descriptor: KeyDescriptor,
    generation: GenerationDefaults,
    rsa_schemes: RsaSchemes,
    public_key: Box<[u8; PUBLIC_KEY_CAPACITY]>,
    public_key_len: usize,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            descriptor: KeyDescriptor::default(),
            generation: GenerationDefaults::zeroed(),
            rsa_schemes: RsaSchemes::default(),
            public_key: Box::new([0u8; PUBLIC_KEY_CAPACITY]),
            public_key_len: 0,
        }
    }
}

impl EngineContext {
    /// Defaults installed by a successful engine init.
    pub(crate) fn reset_defaults(&mut self) {
        self.wipe();
        self.generation = GenerationDefaults::default();
        self.rsa_schemes = RsaSchemes {
            encryption: RSAES_PKCS1_V15,
            signature: RSASSA_PKCS1_V15_SHA256,
        };
    }

    /// Zero every field.
    pub(crate) fn wipe(&mut self) {
        self.descriptor.zeroize();
        self.generation = GenerationDefaults::zeroed();
        self.rsa_schemes = RsaSchemes::default();
        self.public_key.zeroize();
        self.public_key_len = 0;
    }

    pub fn descriptor(&self) -> &KeyDescriptor {
        &self.descriptor
    }

    pub(crate) fn set_descriptor(&mut self, descriptor: KeyDescriptor) {
        self.descriptor.zeroize();
        self.descriptor = descriptor;
    }

    pub(crate) fn set_public_key_ref(&mut self, reference: &str) {
        self.descriptor.public_key_ref.zeroize();
        self.descriptor.public_key_ref = reference.to_string();
    }

    pub fn generation_defaults(&self) -> &GenerationDefaults {
        &self.generation
    }

    pub fn rsa_schemes(&self) -> RsaSchemes {
        self.rsa_schemes
    }

    /// Replace the cached public key.
    ///
    /// Keys larger than the cache are refused rather than truncated and
    /// leave the previous contents untouched.
    pub(crate) fn cache_public_key(&mut self, der: &[u8]) -> EngineResult<()> {
        if der.len() > PUBLIC_KEY_CAPACITY {
            Err(EngineError::PublicKeyTooLarge {
                len: der.len(),
                capacity: PUBLIC_KEY_CAPACITY,
            })?;
        }

        self.public_key.zeroize();
        self.public_key[..der.len()].copy_from_slice(der);
        self.public_key_len = der.len();
        Ok(())
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key[..self.public_key_len]
    }

    /// True when no key material or request state remains.
    pub fn is_zeroed(&self) -> bool {
        self.descriptor == KeyDescriptor::default()
            && self.generation == GenerationDefaults::zeroed()
            && self.rsa_schemes == RsaSchemes::default()
            && self.public_key_len == 0
            && self.public_key.iter().all(|b| *b == 0)
    }
}
