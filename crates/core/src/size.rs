//! Byte-size literals such as `"512KB"` or `"10GB"`.
//!
//! Units are 1024-based: `B`, `KB`, `MB`, `GB`, `TB` (case-insensitive).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const UNITS: [(&str, u64); 5] = [
    ("TB", 1024 * 1024 * 1024 * 1024),
    ("GB", 1024 * 1024 * 1024),
    ("MB", 1024 * 1024),
    ("KB", 1024),
    ("B", 1),
];

/// A number of bytes, parsed from or rendered as a unit-suffixed literal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn b(n: u64) -> Self {
        Self(n)
    }

    pub const fn kib(n: u64) -> Self {
        Self(n * 1024)
    }

    pub const fn mib(n: u64) -> Self {
        Self(n * 1024 * 1024)
    }

    pub const fn gib(n: u64) -> Self {
        Self(n * 1024 * 1024 * 1024)
    }

    /// Number of bytes.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Parse a literal like `"10MB"`. Whitespace between number and unit is allowed.
    pub fn parse(input: &str) -> crate::Result<Self> {
        let s = input.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| crate::Error::InvalidSize(format!("missing unit in '{input}'")))?;
        let (digits, unit) = s.split_at(split);
        if digits.is_empty() {
            return Err(crate::Error::InvalidSize(format!(
                "missing number in '{input}'"
            )));
        }

        let unit = unit.trim().to_ascii_uppercase();
        let multiplier = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, m)| *m)
            .ok_or_else(|| crate::Error::InvalidSize(format!("unknown unit '{unit}'")))?;

        let value: u64 = digits
            .parse()
            .map_err(|e| crate::Error::InvalidSize(format!("'{input}': {e}")))?;
        value
            .checked_mul(multiplier)
            .map(Self)
            .ok_or_else(|| crate::Error::InvalidSize(format!("'{input}' overflows u64")))
    }
}

impl From<u64> for ByteSize {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl FromStr for ByteSize {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ByteSize {
    /// Renders with the largest unit that divides the value exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, multiplier) in UNITS {
            if self.0 != 0 && self.0 % multiplier == 0 {
                return write!(f, "{}{name}", self.0 / multiplier);
            }
        }
        write!(f, "{}B", self.0)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Literal(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(n) => Ok(Self(n)),
            Raw::Literal(s) => Self::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}
