//! Build identity compiled into the binary.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Identity of a deployed build.
///
/// `build_id` is the authoritative discriminator between two builds; `version`
/// and `build_timestamp` are secondary signals. Values are taken verbatim from
/// the build pipeline and never validated or mutated after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: String,
    pub build_id: String,
    /// Epoch milliseconds at which the build was produced
    #[ts(type = "number")]
    pub build_timestamp: i64,
}

impl BuildInfo {
    pub fn new(
        version: impl Into<String>,
        build_id: impl Into<String>,
        build_timestamp: i64,
    ) -> Self {
        Self {
            version: version.into(),
            build_id: build_id.into(),
            build_timestamp,
        }
    }

    /// Identity of the running binary, as stamped by the build script
    pub fn current() -> Self {
        let version = option_env!("APP_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
        let build_timestamp = env!("APP_BUILD_TIMESTAMP").parse::<i64>().unwrap_or(0);
        Self::new(version, env!("APP_BUILD_ID"), build_timestamp)
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (build {}, {})",
            self.version, self.build_id, self.build_timestamp
        )
    }
}
