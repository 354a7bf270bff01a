//! Encrypted vertex payload handling
//!
//! Under schema "CE" the vertex buffer is Blowfish-ECB encrypted with a
//! 16-byte key. Ciphertext whose length is not a multiple of the 8-byte
//! block is zero-padded for decryption and the plaintext truncated back.
//! The key is recovered by trying the derived candidate list against the
//! document's `check_value`: the Adler-32 of the truncated plaintext,
//! byte-swapped, must equal it. A buffer that never verifies is still
//! returned, flagged unverified, so callers can inspect partial data.
//!
//! Two block byte orders exist. The canonical layout decrypts blocks as-is;
//! a legacy encoder reversed each 32-bit half of every block both before
//! encryption and after, selected here by `DecoderConfig::swap64`.

use crate::error::{Error, Result};
use crate::keys;
use crate::model::{DecoderConfig, Vertex};
use adler32::RollingAdler32;
use blowfish::cipher::generic_array::GenericArray;
use blowfish::cipher::{BlockDecrypt, KeyInit};
use blowfish::Blowfish;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Cipher block length in bytes
pub const BLOCK_LEN: usize = 8;

/// Bytes per vertex record (three little-endian f32)
pub const VERTEX_STRIDE: usize = 12;

/// Outcome of the vertex pipeline
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    /// Decoded vertex positions, exactly the declared count on success
    pub vertices: Vec<Vertex>,
    /// Whether the checksum protocol confirmed the plaintext
    pub verified: bool,
    /// Position in the candidate list of the key that verified
    pub selected_key: Option<usize>,
    /// The document's `check_value`, when present
    pub expected_checksum: Option<u32>,
    /// Byte-swapped Adler-32 of the returned plaintext, when a check ran
    pub computed_checksum: Option<u32>,
}

/// Reverse each 32-bit half of every complete 8-byte block in place
///
/// `[b0 b1 b2 b3 b4 b5 b6 b7]` becomes `[b3 b2 b1 b0 b7 b6 b5 b4]`. Applying
/// it twice restores the input. Trailing bytes short of a block are left
/// untouched.
pub fn swap64_blocks(data: &mut [u8]) {
    for block in data.chunks_exact_mut(BLOCK_LEN) {
        block[..4].reverse();
        block[4..].reverse();
    }
}

/// Decrypt a buffer with Blowfish in ECB mode
///
/// The input is zero-padded to a whole number of blocks for decryption and
/// the plaintext truncated back to the input length.
pub fn decrypt_blowfish_ecb(
    data: &[u8],
    key: &[u8; keys::KEY_LEN],
    swap64: bool,
) -> Result<Vec<u8>> {
    let cipher: Blowfish = Blowfish::new_from_slice(key).map_err(|e| Error::Cipher(e.to_string()))?;

    let original_len = data.len();
    let mut buf = data.to_vec();
    let remainder = buf.len() % BLOCK_LEN;
    if remainder != 0 {
        buf.resize(buf.len() + BLOCK_LEN - remainder, 0);
    }

    if swap64 {
        swap64_blocks(&mut buf);
    }
    for block in buf.chunks_exact_mut(BLOCK_LEN) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    if swap64 {
        swap64_blocks(&mut buf);
    }

    buf.truncate(original_len);
    Ok(buf)
}

/// Byte-swapped Adler-32 of a plaintext buffer, the form stored in `check_value`
pub fn stored_checksum(plaintext: &[u8]) -> u32 {
    RollingAdler32::from_buffer(plaintext).hash().swap_bytes()
}

/// Run the full vertex pipeline over a decoded payload
///
/// `raw` is the base64-decoded payload. For encrypted documents the derived
/// key candidates are tried in order until one verifies; with no match the
/// first candidate's plaintext is returned unverified. The buffer is
/// truncated to `count * 12` bytes before verification and float decoding.
///
/// Fails with [`Error::ShortBuffer`] when the plaintext cannot hold the
/// declared count, and with [`Error::ChecksumMismatch`] when
/// `config.strict_checksum` is set and no candidate verifies.
pub fn decode_vertex_buffer(
    raw: Vec<u8>,
    count: u32,
    encrypted: bool,
    check_value: Option<u32>,
    properties: &HashMap<String, String>,
    config: &DecoderConfig,
) -> Result<VertexBuffer> {
    let expected_len = count as usize * VERTEX_STRIDE;

    let mut verified = false;
    let mut selected_key = None;
    let mut plaintext = if encrypted {
        let candidates = keys::derive_candidates(properties, config.custom_key);
        let mut chosen = None;

        if let Some(check) = check_value {
            for (index, key) in candidates.iter().enumerate() {
                let mut plain = decrypt_blowfish_ecb(&raw, key, config.swap64)?;
                plain.truncate(expected_len.min(plain.len()));
                if stored_checksum(&plain) == check {
                    debug!(key_index = index, "vertex checksum verified");
                    verified = true;
                    selected_key = Some(index);
                    chosen = Some(plain);
                    break;
                }
            }
        }

        match chosen {
            Some(plain) => plain,
            // No verifying key (or nothing to verify against): fall back to
            // the first candidate and flag the result.
            None => decrypt_blowfish_ecb(&raw, &candidates[0], config.swap64)?,
        }
    } else {
        raw
    };

    plaintext.truncate(expected_len.min(plaintext.len()));

    if plaintext.len() < expected_len {
        return Err(Error::ShortBuffer {
            expected: expected_len,
            actual: plaintext.len(),
        });
    }

    let computed = check_value.map(|_| stored_checksum(&plaintext));
    if !encrypted {
        // Passthrough buffers have nothing contested unless a check value
        // is present and disagrees.
        verified = match (check_value, computed) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        };
    }

    if let (Some(expected), Some(actual)) = (check_value, computed) {
        if expected != actual {
            warn!(
                expected,
                computed = actual,
                "vertex checksum mismatch, decryption key may be wrong"
            );
            if config.strict_checksum {
                return Err(Error::ChecksumMismatch {
                    expected,
                    computed: actual,
                });
            }
        }
    }

    let mut vertices = Vec::with_capacity(count as usize);
    for record in plaintext.chunks_exact(VERTEX_STRIDE) {
        let x = f32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let y = f32::from_le_bytes([record[4], record[5], record[6], record[7]]);
        let z = f32::from_le_bytes([record[8], record[9], record[10], record[11]]);
        vertices.push(Vertex::new(x, y, z));
    }

    Ok(VertexBuffer {
        vertices,
        verified,
        selected_key,
        expected_checksum: check_value,
        computed_checksum: computed,
    })
}
