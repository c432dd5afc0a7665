use serde::{Deserialize, Serialize};
use std::fmt;

/// A target that cache entries are preprocessed for. Each platform has its own preprocessor
/// and its own keyspace in the cache store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Pc,
    Linux,
    MacOs,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Pc, Platform::Linux, Platform::MacOs];

    /// Short lowercase name, used for cache directories and source overrides
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Pc => "pc",
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
        }
    }

    pub fn from_name(name: &str) -> Option<Platform> {
        Platform::ALL
            .iter()
            .copied()
            .find(|platform| platform.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Platform {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}
