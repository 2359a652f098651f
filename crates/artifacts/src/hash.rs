//! SHA-256 checksums of whole files.
//!
//! Stored next to the parts as 64 lowercase hex characters, which keeps raw
//! key dumps readable.

use std::fmt;

use sha2::{Digest, Sha256};

const HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum(String);

impl Checksum {
    pub fn from_data(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    /// Decode the value kept under a file's `checksum` key.
    pub fn from_stored(raw: &[u8]) -> Result<Self, String> {
        if raw.len() != HEX_LEN {
            return Err(format!("checksum is {} bytes, expected {}", raw.len(), HEX_LEN));
        }
        if !raw.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err("checksum is not lowercase hex".to_string());
        }
        // Every byte is ASCII after the check above.
        Ok(Self(raw.iter().map(|&b| char::from(b)).collect()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
