//! Base64 transport decoding for binary payloads
//!
//! Payload text inside `<Vertices>` and `<Facets>` elements is line-wrapped
//! and indented by most writers, so blanks, tabs and line breaks are stripped
//! before the engine runs. Trailing `=` padding is accepted whether present
//! or not; any other non-alphabet character is a decode error.

use crate::error::{Error, Result};
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine};

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode whitespace-tolerant base64 payload text into raw bytes
pub fn decode_payload(text: &str) -> Result<Vec<u8>> {
    let mut compact = Vec::with_capacity(text.len());
    for &byte in text.as_bytes() {
        match byte {
            b' ' | b'\t' | b'\r' | b'\n' => {}
            _ => compact.push(byte),
        }
    }

    PAYLOAD_ENGINE
        .decode(&compact)
        .map_err(|e| Error::Base64(e.to_string()))
}
