//! Content fingerprints: the key and filename of every stored image.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_128;

/// Extension of the one canonical storage format.
pub const CANONICAL_EXTENSION: &str = "png";

/// Width of a rendered fingerprint in hex characters.
pub const FINGERPRINT_HEX_LEN: usize = 32;

/// 128-bit XXH3 digest of a byte sequence.
///
/// The hash is seedless, so the same bytes map to the same fingerprint across
/// process restarts. Rendered as 32 lowercase hex digits, which doubles as the
/// storage filename stem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(u128);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a 32-digit lowercase hex fingerprint")]
pub struct InvalidFingerprint(pub String);

impl Fingerprint {
    /// Fingerprint an arbitrary byte sequence (including the empty one).
    pub fn of(bytes: &[u8]) -> Self {
        Self(xxh3_128(bytes))
    }

    /// Storage filename: `{hex}.png`.
    pub fn filename(&self) -> String {
        format!("{}.{}", self, CANONICAL_EXTENSION)
    }

    /// Parse a canonical filename (`{hex}.png`) back into its fingerprint.
    pub fn from_filename(name: &str) -> Result<Self, InvalidFingerprint> {
        let stem = name
            .strip_suffix(CANONICAL_EXTENSION)
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(|| InvalidFingerprint(name.to_string()))?;
        stem.parse()
            .map_err(|_| InvalidFingerprint(name.to_string()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    /// Accepts exactly the rendered form; uppercase digits, signs and other
    /// widths are rejected so every accepted string names a real filename.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != FINGERPRINT_HEX_LEN
            || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(InvalidFingerprint(s.to_string()));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| InvalidFingerprint(s.to_string()))
    }
}
