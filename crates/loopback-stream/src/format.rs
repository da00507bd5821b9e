use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::StreamError;

/// Binary sample encodings a stream can carry.
///
/// The channel moves opaque bytes; the format only fixes the item width used
/// to convert between byte counts and element counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemFormat {
    /// Complex signed 8-bit pairs.
    #[serde(rename = "CS8")]
    Cs8,
    /// Complex signed 12-bit pairs, packed into 3 bytes.
    #[serde(rename = "CS12")]
    Cs12,
    /// Complex signed 16-bit pairs.
    #[serde(rename = "CS16")]
    Cs16,
    /// Complex 32-bit float pairs.
    #[serde(rename = "CF32")]
    Cf32,
}

impl ItemFormat {
    pub const ALL: [ItemFormat; 4] = [
        ItemFormat::Cs8,
        ItemFormat::Cs12,
        ItemFormat::Cs16,
        ItemFormat::Cf32,
    ];

    /// Format reported as native to the loopback device.
    pub const NATIVE: ItemFormat = ItemFormat::Cs12;

    /// Bytes per element.
    pub fn item_size(self) -> usize {
        match self {
            ItemFormat::Cs8 => 2,
            ItemFormat::Cs12 => 3,
            ItemFormat::Cs16 => 4,
            ItemFormat::Cf32 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemFormat::Cs8 => "CS8",
            ItemFormat::Cs12 => "CS12",
            ItemFormat::Cs16 => "CS16",
            ItemFormat::Cf32 => "CF32",
        }
    }
}

impl fmt::Display for ItemFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ItemFormat {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                StreamError::InvalidConfiguration(format!(
                    "unsupported format '{s}' (supported: CS8, CS12, CS16, CF32)"
                ))
            })
    }
}
