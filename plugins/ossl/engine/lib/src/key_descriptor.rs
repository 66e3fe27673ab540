// Copyright (C) Microsoft Corporation. All rights reserved.

//! Key descriptor grammar.
//!
//! A descriptor names the OPTIGA slot a host wants a key from and, for the
//! generation-capable slots, how a fresh key should be made:
//!
//! ```text
//! slot_id[:pubkeyfile[:NEW[:key_type_or_curve[:key_usage[:LOCK]]]]]
//! ```
//!
//! Fields are split on `:` and empty fields are dropped, so `0xE0FC::NEW`
//! carries two fields, not three.

use std::fs::File;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::Path;
use std::path::PathBuf;

use zeroize::Zeroize;

use crate::context::GenerationDefaults;
use crate::context::KeyParams;
use crate::error::ParseError;
use crate::error::ParseResult;

/// Device EC key slot; reserved, no handler.
pub const EC_DEVICE_SLOT: u16 = 0xE0F0;

/// EC slots that accept `NEW`.
pub const EC_GENERATE_SLOTS: RangeInclusive<u16> = 0xE0F1..=0xE0F3;

/// RSA slots that accept `NEW`.
pub const RSA_GENERATE_SLOTS: RangeInclusive<u16> = 0xE0FC..=0xE0FD;

/// Shielded-connection session contexts. Known to the dispatcher but never
/// accepted in a descriptor.
pub const SESSION_CONTEXT_SLOTS: RangeInclusive<u16> = 0xE100..=0xE103;

pub const MAX_DESCRIPTOR_FIELDS: usize = 6;

/// Longest public key reference kept from a descriptor, in bytes.
pub const PUBLIC_KEY_REF_MAX: usize = 255;

const NEW_TOKEN: &str = "NEW";
const LOCK_TOKEN: &str = "LOCK";
const NO_PUBLIC_KEY_TOKEN: &str = "*";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlgorithmFamily {
    #[default]
    Rsa,
    Ec,
}

/// Where a slot id falls in the OPTIGA object map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotClass {
    EcDevice,
    Ec,
    Rsa,
    SessionContext,
}

impl SlotClass {
    pub fn of(slot_id: u16) -> Option<Self> {
        match slot_id {
            EC_DEVICE_SLOT => Some(SlotClass::EcDevice),
            id if EC_GENERATE_SLOTS.contains(&id) => Some(SlotClass::Ec),
            id if RSA_GENERATE_SLOTS.contains(&id) => Some(SlotClass::Rsa),
            id if SESSION_CONTEXT_SLOTS.contains(&id) => Some(SlotClass::SessionContext),
            _ => None,
        }
    }

    /// Whether a descriptor may name this slot.
    pub fn in_descriptor_range(self) -> bool {
        !matches!(self, SlotClass::SessionContext)
    }

    pub fn family(self) -> AlgorithmFamily {
        match self {
            SlotClass::Rsa => AlgorithmFamily::Rsa,
            _ => AlgorithmFamily::Ec,
        }
    }

    /// Family of key `NEW` generates in this slot, if any.
    pub fn generation_family(slot_id: u16) -> Option<AlgorithmFamily> {
        if RSA_GENERATE_SLOTS.contains(&slot_id) {
            Some(AlgorithmFamily::Rsa)
        } else if EC_GENERATE_SLOTS.contains(&slot_id) {
            Some(AlgorithmFamily::Ec)
        } else {
            None
        }
    }
}

/// How the slot id of a descriptor was obtained.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SlotForm {
    /// `0x` prefixed hex literal.
    #[default]
    Hex,
    /// Single-token descriptor naming a file whose first two bytes hold the
    /// slot id. Kept for hosts that can only pass one opaque string.
    LegacyFile(String),
    /// Non-hex first field in a multi-field descriptor; slot id is 0.
    Fallback,
}

/// Optional generation field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationField {
    KeyTypeOrCurve,
    KeyUsage,
}

/// An optional generation field that was not valid hex and was left at its
/// default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoredField {
    pub field: GenerationField,
    pub value: String,
}

/// A parsed key request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub slot_id: u16,
    pub slot_form: SlotForm,
    /// Public key file reference, empty when absent or `*`.
    pub public_key_ref: String,
    pub generate_new: bool,
    pub algorithm_family: AlgorithmFamily,
    /// Only meaningful when `generate_new`.
    pub key_type_or_curve: u32,
    /// Only meaningful when `generate_new`.
    pub key_usage: u32,
    pub lock_after_generate: bool,
    pub ignored: Vec<IgnoredField>,
}

impl Zeroize for KeyDescriptor {
    fn zeroize(&mut self) {
        self.public_key_ref.zeroize();
        if let SlotForm::LegacyFile(path) = &mut self.slot_form {
            path.zeroize();
        }
        for ignored in self.ignored.iter_mut() {
            ignored.value.zeroize();
        }
        *self = KeyDescriptor::default();
    }
}

/// First field of a descriptor, before it is turned into a slot id.
#[derive(Debug, PartialEq, Eq)]
enum SlotToken<'a> {
    Hex(&'a str),
    LegacyFile(&'a str),
    Fallback,
}

impl<'a> SlotToken<'a> {
    fn classify(token: &'a str, field_count: usize) -> Self {
        if let Some(digits) = strip_hex_prefix(token) {
            SlotToken::Hex(digits)
        } else if field_count == 1 {
            SlotToken::LegacyFile(token)
        } else {
            SlotToken::Fallback
        }
    }
}

/// Outcome of reading an optional hex field.
#[derive(Debug, PartialEq, Eq)]
enum HexField {
    Parsed(u32),
    /// Not hex; the field keeps its default.
    Ignored,
}

impl HexField {
    fn read(token: &str) -> Self {
        match strip_hex_prefix(token).and_then(leading_hex) {
            Some(value) => HexField::Parsed(value),
            None => HexField::Ignored,
        }
    }
}

fn strip_hex_prefix(token: &str) -> Option<&str> {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
}

/// Value of the leading hex digits, `None` if there are none or they
/// overflow. Trailing garbage after the digits is dropped.
fn leading_hex(digits: &str) -> Option<u32> {
    let end = digits
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(digits.len());
    u32::from_str_radix(&digits[..end], 16).ok()
}

/// Reads the slot id stored in the first two bytes of `path`.
fn read_slot_file(path: &str) -> ParseResult<u16> {
    let slot_file_error = |source| ParseError::SlotFileUnavailable {
        path: PathBuf::from(path),
        source,
    };

    let file = File::open(Path::new(path)).map_err(slot_file_error)?;

    // A short file leaves the remaining bytes zero.
    let mut bytes = [0u8; 2];
    let mut read = Vec::with_capacity(2);
    file.take(2)
        .read_to_end(&mut read)
        .map_err(slot_file_error)?;
    bytes[..read.len()].copy_from_slice(&read);

    let slot_id = u16::from_ne_bytes(bytes);
    tracing::debug!(path, slot_id = %format!("{slot_id:#06x}"), "slot id read from file");
    Ok(slot_id)
}

fn truncate_ref(reference: &str) -> String {
    if reference.len() <= PUBLIC_KEY_REF_MAX {
        return reference.to_string();
    }

    let mut end = PUBLIC_KEY_REF_MAX;
    while !reference.is_char_boundary(end) {
        end -= 1;
    }
    tracing::warn!(
        len = reference.len(),
        max = PUBLIC_KEY_REF_MAX,
        "public key reference truncated"
    );
    reference[..end].to_string()
}

/// Parse a descriptor using the engine's built-in generation defaults.
pub fn parse(descriptor: &str) -> ParseResult<KeyDescriptor> {
    parse_with_defaults(descriptor, &GenerationDefaults::default())
}

/// Parse a descriptor.
///
/// # Arguments
/// * `descriptor` - Colon separated key descriptor
/// * `defaults` - Key type/curve and usage used when `NEW` is requested
///   but the matching field is absent or not hex
///
/// # Returns
/// The validated `KeyDescriptor`, or the first problem found
pub fn parse_with_defaults(
    descriptor: &str,
    defaults: &GenerationDefaults,
) -> ParseResult<KeyDescriptor> {
    let fields: Vec<&str> = descriptor.split(':').filter(|f| !f.is_empty()).collect();

    let Some(&first) = fields.first() else {
        tracing::error!("No input key parameters present. (key_oid:<pubkeyfile>)");
        return Err(ParseError::MissingSlot);
    };

    if fields.len() > MAX_DESCRIPTOR_FIELDS {
        tracing::error!(fields = fields.len(), "Too many parameters in key descriptor");
        Err(ParseError::TooManyFields(fields.len()))?;
    }

    let (raw_slot, slot_form) = match SlotToken::classify(first, fields.len()) {
        SlotToken::Hex(digits) => (leading_hex(digits).unwrap_or(u32::MAX), SlotForm::Hex),
        SlotToken::LegacyFile(path) => (
            u32::from(read_slot_file(path)?),
            SlotForm::LegacyFile(path.to_string()),
        ),
        SlotToken::Fallback => (0, SlotForm::Fallback),
    };

    let slot_class = u16::try_from(raw_slot)
        .ok()
        .and_then(|id| SlotClass::of(id).map(|class| (id, class)))
        .filter(|(_, class)| class.in_descriptor_range());
    let Some((slot_id, slot_class)) = slot_class else {
        tracing::error!(slot = %format!("{raw_slot:#x}"), "Invalid key OID");
        return Err(ParseError::InvalidSlot(raw_slot));
    };

    let public_key_ref = match fields.get(1) {
        Some(&reference) if reference != NO_PUBLIC_KEY_TOKEN => truncate_ref(reference),
        _ => String::new(),
    };

    let mut parsed = KeyDescriptor {
        slot_id,
        slot_form,
        public_key_ref,
        algorithm_family: slot_class.family(),
        ..Default::default()
    };

    if fields.get(2) == Some(&NEW_TOKEN) {
        match SlotClass::generation_family(slot_id) {
            Some(family) => apply_generation(&mut parsed, family, &fields, defaults),
            None => tracing::debug!(slot_id, "NEW ignored, slot cannot generate keys"),
        }
    }

    Ok(parsed)
}

fn apply_generation(
    parsed: &mut KeyDescriptor,
    family: AlgorithmFamily,
    fields: &[&str],
    defaults: &GenerationDefaults,
) {
    let KeyParams {
        key_type_or_curve,
        key_usage,
    } = defaults.for_family(family);

    parsed.generate_new = true;
    parsed.algorithm_family = family;
    parsed.key_type_or_curve = key_type_or_curve;
    parsed.key_usage = key_usage;

    let optional = [
        (3, GenerationField::KeyTypeOrCurve),
        (4, GenerationField::KeyUsage),
    ];
    for (index, field) in optional {
        let Some(&token) = fields.get(index) else {
            continue;
        };
        match HexField::read(token) {
            HexField::Parsed(value) => match field {
                GenerationField::KeyTypeOrCurve => parsed.key_type_or_curve = value,
                GenerationField::KeyUsage => parsed.key_usage = value,
            },
            HexField::Ignored => {
                tracing::warn!(?field, token, "not a hex value, keeping default");
                parsed.ignored.push(IgnoredField {
                    field,
                    value: token.to_string(),
                });
            }
        }
    }

    parsed.lock_after_generate = fields.get(5) == Some(&LOCK_TOKEN);
}
