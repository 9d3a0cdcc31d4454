//! Identifier and reference generation.
//!
//! Entity ids are random v4 UUIDs. Human-facing references (RIBPAY contract
//! numbers, used as SEPA mandate references) are `PREFIX_<key>`, where the
//! key is a compact Crockford base32 rendering of an external id:
//!
//! - a UUID is split into four 32-bit groups, each written as 7 base32
//!   digits, for a 28-character key;
//! - any other id is written as the base32 of its UTF-8 bytes.
//!
//! The encoding is deterministic and reversible with `decode_reference`.
//! A non-UUID id of exactly 17 bytes also yields 28 characters and may
//! decode as a UUID; external ids of the payment provider are UUIDs.

use uuid::Uuid;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const GROUP_LEN: usize = 7;
const UUID_KEY_LEN: usize = GROUP_LEN * 4;

pub const RIBPAY_REFERENCE_PREFIX: &str = "OXLN";

/// Fresh entity id.
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Contract number of a VADS contract.
pub fn vads_contract_number(merchant_id: &str) -> String {
    format!("VADS_{merchant_id}")
}

/// Build `PREFIX_<key>` for an external id.
pub fn generate_reference(prefix: &str, external_id: &str) -> String {
    let key = match Uuid::parse_str(external_id) {
        Ok(uuid) => uuid_key(uuid),
        Err(_) => encode_bytes(external_id.as_bytes()),
    };
    format!("{prefix}_{key}")
}

/// Recover the external id from a reference built by `generate_reference`.
/// UUIDs come back in hyphenated lower-case form.
pub fn decode_reference(reference: &str) -> Option<String> {
    let (_, key) = reference.rsplit_once('_')?;
    if key.len() == UUID_KEY_LEN {
        if let Some(uuid) = decode_uuid_key(key) {
            return Some(uuid.to_string());
        }
    }
    let bytes = decode_bytes(key)?;
    String::from_utf8(bytes).ok()
}

fn uuid_key(uuid: Uuid) -> String {
    uuid.as_bytes()
        .chunks_exact(4)
        .map(|chunk| {
            let group = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            encode_group(group)
        })
        .collect()
}

fn encode_group(mut group: u32) -> String {
    let mut digits = [b'0'; GROUP_LEN];
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(group % 32) as usize];
        group /= 32;
    }
    digits.iter().map(|&b| char::from(b)).collect()
}

fn decode_uuid_key(key: &str) -> Option<Uuid> {
    let mut bytes = [0u8; 16];
    for (i, group) in key.as_bytes().chunks_exact(GROUP_LEN).enumerate() {
        let value = group.iter().try_fold(0u64, |acc, &c| {
            Some(acc * 32 + u64::from(symbol_value(c)?))
        })?;
        let value = u32::try_from(value).ok()?;
        bytes[i * 4..i * 4 + 4].copy_from_slice(&value.to_be_bytes());
    }
    Some(Uuid::from_bytes(bytes))
}

fn encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8 / 5 + 1);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(ALPHABET[((buffer >> bits) & 31) as usize]));
        }
    }
    if bits > 0 {
        out.push(char::from(ALPHABET[((buffer << (5 - bits)) & 31) as usize]));
    }
    out
}

fn decode_bytes(key: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(key.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &c in key.as_bytes() {
        buffer = (buffer << 5) | u32::from(symbol_value(c)?);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xFF) as u8);
        }
    }
    Some(out)
}

fn symbol_value(c: u8) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    ALPHABET
        .iter()
        .position(|&a| a == upper)
        .and_then(|p| u8::try_from(p).ok())
}
