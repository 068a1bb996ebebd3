//! Compression codec registry.
//!
//! Immutable constant tables. Lookups are pure functions, there is no
//! mutable registry state anywhere.

use serde::{Deserialize, Serialize};

/// A topic compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Raw,
    Gzip,
    Zstd,
}

/// Every codec the control plane accepts. Also the default codec set for
/// a consumer that does not declare one.
pub const ALLOWED_CODECS: [Codec; 3] = [Codec::Raw, Codec::Gzip, Codec::Zstd];

/// Baseline codec set applied when a topic omits `supported_codecs`.
/// Deliberately narrower than [`ALLOWED_CODECS`].
pub const DEFAULT_TOPIC_CODECS: [Codec; 2] = [Codec::Raw, Codec::Gzip];

impl Codec {
    /// Wire name of the codec.
    pub fn name(self) -> &'static str {
        match self {
            Codec::Raw => "raw",
            Codec::Gzip => "gzip",
            Codec::Zstd => "zstd",
        }
    }

    /// Look up a codec by name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Codec> {
        match name.to_ascii_lowercase().as_str() {
            "raw" => Some(Codec::Raw),
            "gzip" => Some(Codec::Gzip),
            "zstd" => Some(Codec::Zstd),
            _ => None,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for codec in ALLOWED_CODECS {
            assert_eq!(Codec::from_name(codec.name()), Some(codec));
        }
        assert_eq!(Codec::from_name("GZIP"), Some(Codec::Gzip));
        assert_eq!(Codec::from_name("lz4"), None);
    }

    #[test]
    fn test_topic_default_is_narrower_than_allowed() {
        assert!(DEFAULT_TOPIC_CODECS.len() < ALLOWED_CODECS.len());
        assert!(DEFAULT_TOPIC_CODECS.iter().all(|c| ALLOWED_CODECS.contains(c)));
    }
}
