//! Publishes the descriptor of the build this server ships.

use std::path::PathBuf;

use services::services::{descriptor_source::parse_descriptor, version_descriptor::VersionDescriptor};
use thiserror::Error;
use utils::{
    build_info::BuildInfo,
    env::{env_bool, env_string},
};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid descriptor in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Descriptor written by the deploy pipeline; takes precedence over the
    /// compiled build identity when set
    pub version_file: Option<PathBuf>,
    pub force_update: bool,
    pub update_message: String,
    pub minimum_version: Option<String>,
    pub update_url: Option<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            version_file: None,
            force_update: true,
            update_message: "A new version is available.".to_string(),
            minimum_version: None,
            update_url: None,
        }
    }
}

impl PublisherConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            version_file: env_string("VERSION_FILE").map(PathBuf::from),
            force_update: env_bool("FORCE_UPDATE", defaults.force_update),
            update_message: env_string("UPDATE_MESSAGE").unwrap_or(defaults.update_message),
            minimum_version: env_string("MINIMUM_VERSION"),
            update_url: env_string("UPDATE_URL"),
        }
    }
}

pub struct DescriptorPublisher {
    build: BuildInfo,
    config: PublisherConfig,
}

impl DescriptorPublisher {
    pub fn new(build: BuildInfo, config: PublisherConfig) -> Self {
        Self { build, config }
    }

    pub fn build(&self) -> &BuildInfo {
        &self.build
    }

    /// The descriptor to serve right now. A configured version file is read
    /// on every call so a redeploy is visible without a restart.
    pub async fn current(&self) -> Result<VersionDescriptor, PublishError> {
        match &self.config.version_file {
            Some(path) => {
                let body = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| PublishError::Io {
                        path: path.clone(),
                        source,
                    })?;
                parse_descriptor(&body).map_err(|e| PublishError::Invalid {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            }
            None => Ok(VersionDescriptor {
                force_update: self.config.force_update,
                update_message: self.config.update_message.clone(),
                minimum_version: self.config.minimum_version.clone(),
                update_url: self.config.update_url.clone(),
                ..VersionDescriptor::for_build(&self.build)
            }),
        }
    }
}
