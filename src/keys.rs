//! Candidate cipher key derivation
//!
//! Documents under the encrypted schema do not name their key; they constrain
//! it through two properties. `EKID` is a small integer mixed into the base
//! key, and `PackageLockList` contributes the MD5 digest of its canonical
//! form. Derivation produces an ordered candidate list; the vertex pipeline
//! tries each until the checksum verifies.

use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Cipher key length in bytes
pub const KEY_LEN: usize = 16;

/// The reference key shipped with the original encoder
pub const BASE_KEY: [u8; KEY_LEN] = *b"0123456789abcdef";

/// `EKID` value assumed when the property is absent
pub const DEFAULT_EKID: u32 = 1;

// Historical keys observed in archives from older encoders: the base key
// with its first two bytes transposed, and the EKID tag alone in byte 0.
const TRANSPOSED_BASE_KEY: [u8; KEY_LEN] = [
    0x31, 0x30, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x61, 0x62, 0x63, 0x64, 0x65,
    0x66,
];
const EKID_SLOT_KEY: [u8; KEY_LEN] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// Canonical form of a `PackageLockList` value
///
/// Split on `;`, drop empty items, deduplicate, sort lexicographically and
/// re-join with a `;` terminator after every item (trailing `;` included).
/// Returns `None` when nothing remains.
pub fn canonical_lock_list(raw: &str) -> Option<String> {
    let mut items: Vec<&str> = raw.split(';').filter(|item| !item.is_empty()).collect();
    items.sort_unstable();
    items.dedup();
    if items.is_empty() {
        return None;
    }

    let mut canonical = String::with_capacity(raw.len() + 1);
    for item in items {
        canonical.push_str(item);
        canonical.push(';');
    }
    Some(canonical)
}

/// Uppercase-hex MD5 digest of the canonical `PackageLockList` form
pub fn lock_list_digest(raw: &str) -> Option<String> {
    let canonical = canonical_lock_list(raw)?;
    let digest = Md5::digest(canonical.as_bytes());

    let mut hex = String::with_capacity(32);
    for byte in digest {
        let _ = write!(hex, "{:02X}", byte);
    }
    Some(hex)
}

/// Derive the ordered candidate key list from document properties
///
/// A caller-provided key goes first, then the principled derivations in
/// priority order, then the historical keys. The list is deterministic in
/// its inputs.
pub fn derive_candidates(
    properties: &HashMap<String, String>,
    custom_key: Option<[u8; KEY_LEN]>,
) -> Vec<[u8; KEY_LEN]> {
    let ekid = properties
        .get("EKID")
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(DEFAULT_EKID);
    let digest = properties
        .get("PackageLockList")
        .and_then(|value| lock_list_digest(value));

    let mut candidates = Vec::with_capacity(8);

    if let Some(key) = custom_key {
        candidates.push(key);
    }

    candidates.push(BASE_KEY);

    // EKID folded into every byte
    let mut key = BASE_KEY;
    for (i, byte) in key.iter_mut().enumerate() {
        *byte ^= (ekid ^ (i as u32 % 256)) as u8;
    }
    candidates.push(key);

    // EKID tag in byte 0
    let mut key = BASE_KEY;
    key[0] = ekid as u8;
    candidates.push(key);

    if let Some(hex) = digest {
        let hex = hex.as_bytes();

        let mut key = BASE_KEY;
        for (i, byte) in key.iter_mut().enumerate() {
            *byte ^= hex[i % hex.len()];
        }
        candidates.push(key);

        // digest and EKID combined
        let mut key = BASE_KEY;
        for (i, byte) in key.iter_mut().enumerate() {
            let ekid_byte = (ekid ^ (i as u32 % 256)) as u8;
            *byte ^= hex[i % hex.len()] ^ ekid_byte;
        }
        candidates.push(key);
    }

    candidates.push(TRANSPOSED_BASE_KEY);
    candidates.push(EKID_SLOT_KEY);

    candidates
}
