//! The version descriptor published with every deployment, and the staleness
//! decision made against it.

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use ts_rs::TS;
use utils::build_info::BuildInfo;

/// Identity and update policy of the currently deployed build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct VersionDescriptor {
    pub version: String,
    pub build_id: String,
    #[ts(type = "number")]
    pub build_timestamp: i64,
    /// Apply without asking the user
    #[serde(default)]
    pub force_update: bool,
    /// Shown when the update needs confirmation
    #[serde(default)]
    pub update_message: String,
    /// Reserved. Published but not consulted by the staleness decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
}

impl VersionDescriptor {
    /// Descriptor for a build, with silent updates enabled
    pub fn for_build(build: &BuildInfo) -> Self {
        Self {
            version: build.version.clone(),
            build_id: build.build_id.clone(),
            build_timestamp: build.build_timestamp,
            force_update: true,
            update_message: String::new(),
            minimum_version: None,
            update_url: None,
        }
    }

    pub fn build_info(&self) -> BuildInfo {
        BuildInfo::new(&self.version, &self.build_id, self.build_timestamp)
    }
}

/// Why a running build is considered stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ForceReason {
    BuildId,
    Version,
    Timestamp,
}

/// First matching signal wins: build id, then version, then a server build
/// strictly newer than the client by more than `tolerance_ms`.
pub fn force_update_reason(
    client: &BuildInfo,
    server: &VersionDescriptor,
    tolerance_ms: i64,
) -> Option<ForceReason> {
    if client.build_id != server.build_id {
        return Some(ForceReason::BuildId);
    }
    if client.version != server.version {
        return Some(ForceReason::Version);
    }
    if server.build_timestamp.saturating_sub(client.build_timestamp) > tolerance_ms {
        return Some(ForceReason::Timestamp);
    }
    None
}

pub fn should_force_update(
    client: &BuildInfo,
    server: &VersionDescriptor,
    tolerance_ms: i64,
) -> bool {
    force_update_reason(client, server, tolerance_ms).is_some()
}
