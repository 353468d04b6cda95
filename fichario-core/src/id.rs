//! Record Identifiers
//!
//! Collision-resistant, human-checkable record identifiers: 26 random
//! Crockford Base32 symbols followed by one check symbol computed over the
//! body modulo 37. The check alphabet adds five checksum-only symbols so
//! every residue has a symbol; because 37 is prime and coprime to 32, any
//! single-symbol substitution in the body changes the residue and is
//! detected.
//!
//! `TigerStyle`: generation never blocks and never fails; validation is a
//! pure function over the candidate string.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::constants::{
    RECORD_ID_ALPHABET, RECORD_ID_BODY_LENGTH, RECORD_ID_CHECKSUM_MODULUS,
    RECORD_ID_CHECK_ALPHABET, RECORD_ID_LENGTH,
};

/// Errors produced when parsing a candidate identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The candidate is not exactly 27 symbols long.
    #[error("identifier must be {RECORD_ID_LENGTH} symbols, got {length}")]
    InvalidLength {
        /// Length of the rejected candidate.
        length: usize,
    },

    /// A symbol outside the accepted alphabet appeared.
    #[error("invalid symbol {symbol:?} at position {position}")]
    InvalidSymbol {
        /// The offending character.
        symbol: char,
        /// Zero-based position within the candidate.
        position: usize,
    },

    /// The trailing check symbol does not match the body.
    #[error("checksum mismatch: expected {expected:?}, found {found:?}")]
    ChecksumMismatch {
        /// Check symbol recomputed from the body.
        expected: char,
        /// Check symbol present in the candidate.
        found: char,
    },
}

/// A validated record identifier.
///
/// Construction always goes through [`RecordId::generate`] or
/// [`FromStr`], so a `RecordId` value is valid by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh identifier from the thread-local RNG.
    ///
    /// Never blocks; the body is uniformly random over the 32-symbol
    /// alphabet and the check symbol is derived from it.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generate a fresh identifier from a caller-supplied RNG.
    ///
    /// Deterministic tests pass a seeded RNG here.
    #[must_use]
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = Vec::with_capacity(RECORD_ID_LENGTH);
        for _ in 0..RECORD_ID_BODY_LENGTH {
            let index = rng.gen_range(0..RECORD_ID_ALPHABET.len());
            bytes.push(RECORD_ID_ALPHABET[index]);
        }
        bytes.push(check_symbol(&bytes));

        let id = Self(String::from_utf8(bytes).expect("alphabet is ASCII"));

        // Postcondition
        debug_assert!(Self::validate(id.as_str()), "generated id must validate");
        id
    }

    /// Check whether a candidate string is a well-formed identifier.
    ///
    /// Returns `false` on length mismatch, on any symbol outside the
    /// alphabet, and on a check-symbol mismatch.
    #[must_use]
    pub fn validate(candidate: &str) -> bool {
        Self::parse(candidate).is_ok()
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parse(candidate: &str) -> Result<(), IdError> {
        let bytes = candidate.as_bytes();
        if bytes.len() != RECORD_ID_LENGTH || candidate.chars().count() != RECORD_ID_LENGTH {
            return Err(IdError::InvalidLength {
                length: candidate.chars().count(),
            });
        }

        for (position, &byte) in bytes[..RECORD_ID_BODY_LENGTH].iter().enumerate() {
            if body_value(byte).is_none() {
                return Err(IdError::InvalidSymbol {
                    symbol: byte as char,
                    position,
                });
            }
        }

        let found = bytes[RECORD_ID_LENGTH - 1];
        if check_value(found).is_none() {
            return Err(IdError::InvalidSymbol {
                symbol: found as char,
                position: RECORD_ID_LENGTH - 1,
            });
        }

        let expected = check_symbol(&bytes[..RECORD_ID_BODY_LENGTH]);
        if expected != found {
            return Err(IdError::ChecksumMismatch {
                expected: expected as char,
                found: found as char,
            });
        }

        Ok(())
    }
}

impl FromStr for RecordId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the check symbol for a 26-symbol body.
#[allow(clippy::cast_possible_truncation)]
fn check_symbol(body: &[u8]) -> u8 {
    // Precondition
    assert_eq!(
        body.len(),
        RECORD_ID_BODY_LENGTH,
        "check symbol is computed over the full body"
    );

    let mut acc: u64 = 0;
    for &byte in body {
        let value = body_value(byte).expect("body symbols are pre-validated");
        acc = (acc * RECORD_ID_ALPHABET.len() as u64 + value) % RECORD_ID_CHECKSUM_MODULUS;
    }

    // acc < 37, so the cast is lossless.
    RECORD_ID_CHECK_ALPHABET[acc as usize]
}

/// Value of a body symbol, or `None` if outside the 32-symbol alphabet.
fn body_value(byte: u8) -> Option<u64> {
    RECORD_ID_ALPHABET
        .iter()
        .position(|&b| b == byte)
        .map(|p| p as u64)
}

/// Value of a check symbol, or `None` if outside the 37-symbol alphabet.
fn check_value(byte: u8) -> Option<u64> {
    RECORD_ID_CHECK_ALPHABET
        .iter()
        .position(|&b| b == byte)
        .map(|p| p as u64)
}
