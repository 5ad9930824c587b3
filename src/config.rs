//! Configuration of the version manager.

use serde::{Deserialize, Serialize};

/// Hard cap on live versions below the root.
pub(crate) const MAX_LIVE_VERSIONS: usize = 900;

/// Tunables of the [VersionManager](crate::version::VersionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionManagerConfig {
    /// Upper bound on live versions below the root. Creations beyond the
    /// bound fail with `OverLimit`.
    pub max_versions: usize,
}

impl Default for VersionManagerConfig {
    fn default() -> Self {
        VersionManagerConfig {
            max_versions: MAX_LIVE_VERSIONS,
        }
    }
}

#[cfg(feature = "figment_config")]
mod provider {
    use super::VersionManagerConfig;
    use figment::{
        providers::Serialized,
        value::{Dict, Map},
        Error, Figment, Metadata, Profile, Provider,
    };

    impl Provider for VersionManagerConfig {
        fn metadata(&self) -> Metadata {
            Metadata::named("version manager config")
        }

        fn data(&self) -> Result<Map<Profile, Dict>, Error> {
            Serialized::defaults(self).data()
        }
    }

    impl VersionManagerConfig {
        /// Extract a configuration from the given figment.
        pub fn from_figment(figment: &Figment) -> Result<Self, Error> {
            figment.extract()
        }
    }
}
