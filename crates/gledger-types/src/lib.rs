//! Value layer for the GTID ledger.
//!
//! Everything in this crate is pure data: parsing, formatting, and interval
//! arithmetic over `(source id, sequence number)` pairs. No I/O, no locks —
//! the persistence crates build on top of these types.

pub mod interval;
pub mod set;

pub use interval::Interval;
pub use set::{GtidSet, Intervals, MalformedInterval};

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

/// Separator between the SID text and the GNO range in the canonical text
/// form, e.g. `3e11fa47c3114f90914be7ecbcf866bb:1-5`.
pub const SID_GNO_SEPARATOR: char = ':';

/// Separator between the first and last GNO of a range.
pub const GNO_RANGE_SEPARATOR: char = '-';

// ---------------------------------------------------------------------------
// Sid
// ---------------------------------------------------------------------------

/// A 16-byte source identifier.
///
/// The canonical text form is 32 lowercase hex digits. Equality is byte
/// equality; ordering is lexicographic over the raw bytes and is only used
/// as a secondary key when iterating sets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Sid([u8; 16]);

impl Sid {
    /// Length of the canonical text form.
    pub const TEXT_LENGTH: usize = 32;

    /// Build a SID from its raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The raw 16 bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parse the 32-hex-digit text form. Case-insensitive on input; the
    /// canonical output of [`Sid::to_text`] is always lowercase.
    pub fn from_text(text: &str) -> Result<Self, MalformedSid> {
        let bytes = text.as_bytes();
        if bytes.len() != Self::TEXT_LENGTH {
            return Err(MalformedSid {
                text: text.to_owned(),
            });
        }
        let mut out = [0u8; 16];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let hi = hex_nibble(pair[0]);
            let lo = hex_nibble(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out[i] = (hi << 4) | lo,
                _ => {
                    return Err(MalformedSid {
                        text: text.to_owned(),
                    });
                }
            }
        }
        Ok(Self(out))
    }

    /// Canonical lowercase hex text.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(Self::TEXT_LENGTH);
        for byte in &self.0 {
            out.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0'));
            out.push(char::from_digit(u32::from(byte & 0x0f), 16).unwrap_or('0'));
        }
        out
    }
}

const fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Sid {
    type Err = MalformedSid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

/// Error returned when a SID text form cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedSid {
    text: String,
}

impl MalformedSid {
    /// The rejected input.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for MalformedSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed source id text: '{}'", self.text)
    }
}

impl std::error::Error for MalformedSid {}

// ---------------------------------------------------------------------------
// Gno
// ---------------------------------------------------------------------------

/// A per-source sequence number.
///
/// GNOs are strictly positive 64-bit integers, monotonically increasing
/// within a source but not required to be gap-free.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct Gno(NonZeroU64);

impl Gno {
    /// The smallest valid GNO.
    pub const MIN: Self = Self(NonZeroU64::MIN);

    /// Create a GNO from a raw value. Returns `None` for zero.
    #[must_use]
    pub const fn new(n: u64) -> Option<Self> {
        match NonZeroU64::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// The successor GNO, or `None` on overflow.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for Gno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Gtid
// ---------------------------------------------------------------------------

/// A global transaction identifier: one `(SID, GNO)` pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Gtid {
    pub sid: Sid,
    pub gno: Gno,
}

impl Gtid {
    /// Pair a SID with a GNO.
    #[must_use]
    pub const fn new(sid: Sid, gno: Gno) -> Self {
        Self { sid, gno }
    }
}

impl fmt::Display for Gtid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.sid, SID_GNO_SEPARATOR, self.gno)
    }
}
