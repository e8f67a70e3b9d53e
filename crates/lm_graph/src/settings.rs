use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Codec

/// The storage codec used for writing. Reading detects the codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Binary,
    Text,
}

// -----------------------------------------------------------------------------
// Prewarm

/// Type paths and member names known to every reader and writer.
///
/// Prewarmed entries are referenced by fixed ids and are never written
/// into stream headers. Both sides must use the same lists in the same
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prewarm {
    pub types: Vec<String>,
    pub names: Vec<String>,
}

// -----------------------------------------------------------------------------
// Settings

/// Engine configuration.
///
/// Every field has a default, so partial documents deserialize.
///
/// # Examples
///
/// ```
/// use lm_graph::{Codec, Settings};
///
/// let settings: Settings = serde_json::from_str(r#"{ "codec": "text", "fixup_passes": 8 }"#).unwrap();
/// assert_eq!(settings.codec, Codec::Text);
/// assert_eq!(settings.fixup_passes, 8);
/// assert!(settings.skip_default_properties);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub codec: Codec,
    /// Write a type tag for every entry, not only where the runtime type
    /// differs from the declared one.
    pub verbose: bool,
    /// Upper bound on deferred fixup passes per scope.
    pub fixup_passes: usize,
    /// Omit properties equal to their value on a default instance.
    pub skip_default_properties: bool,
    pub prewarm: Prewarm,
}

impl Settings {
    pub const DEFAULT_FIXUP_PASSES: usize = 4;
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            codec: Codec::Binary,
            verbose: false,
            fixup_passes: Self::DEFAULT_FIXUP_PASSES,
            skip_default_properties: true,
            prewarm: Prewarm::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Codec, Settings};

    #[test]
    fn partial_ron() {
        let settings: Settings = ron::from_str(
            r#"(
                verbose: true,
                prewarm: (types: ["demo.Node"]),
            )"#,
        )
        .unwrap();
        assert!(settings.verbose);
        assert_eq!(settings.codec, Codec::Binary);
        assert_eq!(settings.fixup_passes, Settings::DEFAULT_FIXUP_PASSES);
        assert_eq!(settings.prewarm.types, ["demo.Node"]);
        assert!(settings.prewarm.names.is_empty());
    }

    #[test]
    fn json_round_trip() {
        let settings = Settings {
            codec: Codec::Text,
            ..Settings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains(r#""codec":"text""#));
        assert_eq!(serde_json::from_str::<Settings>(&json).unwrap(), settings);
    }
}
