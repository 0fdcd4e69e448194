//! Applies an update: wipes client-side caches and storage, then reloads.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;
use utils::update_url::UrlParams;

use super::{
    clock::Clock, navigator::Navigator, prompt::UpdatePrompt, storage::StorageGateway,
    update_reconciler::SessionState, version_descriptor::VersionDescriptor,
};

const DEFAULT_UPDATE_MESSAGE: &str = "A new version is available. Reload now?";

/// Invoked by the reconciler once a stale build is detected
#[async_trait]
pub trait UpdateTrigger: Send + Sync {
    async fn trigger(&self, descriptor: VersionDescriptor);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    AlreadyInProgress,
    Declined,
    Executed(CleanupReport),
}

/// What a forced update managed to clear before reloading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub caches_deleted: usize,
    pub cache_failures: usize,
    pub persistent_cleared: bool,
    pub session_cleared: bool,
    pub reload_url: Url,
}

pub struct UpdateExecutor {
    storage: Arc<dyn StorageGateway>,
    navigator: Arc<dyn Navigator>,
    prompt: Arc<dyn UpdatePrompt>,
    clock: Arc<dyn Clock>,
    params: UrlParams,
    state: SessionState,
}

impl UpdateExecutor {
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        navigator: Arc<dyn Navigator>,
        prompt: Arc<dyn UpdatePrompt>,
        clock: Arc<dyn Clock>,
        params: UrlParams,
        state: SessionState,
    ) -> Self {
        Self {
            storage,
            navigator,
            prompt,
            clock,
            params,
            state,
        }
    }

    /// Apply `descriptor`, silently when it says so, otherwise after confirmation.
    ///
    /// A declined update only releases the in-progress latch; the next
    /// scheduled check evaluates again from scratch.
    pub async fn force_update(&self, descriptor: &VersionDescriptor) -> UpdateDecision {
        let acquired = self.state.update(|s| {
            if s.update_in_progress {
                false
            } else {
                s.update_in_progress = true;
                true
            }
        });
        if !acquired {
            debug!(
                build_id = %descriptor.build_id,
                "Update already in progress, ignoring trigger"
            );
            return UpdateDecision::AlreadyInProgress;
        }

        if !descriptor.force_update {
            let message = if descriptor.update_message.trim().is_empty() {
                DEFAULT_UPDATE_MESSAGE
            } else {
                descriptor.update_message.as_str()
            };
            if !self.prompt.confirm(message).await {
                self.state.update(|s| s.update_in_progress = false);
                info!(
                    build_id = %descriptor.build_id,
                    version = %descriptor.version,
                    "Update declined"
                );
                return UpdateDecision::Declined;
            }
        }

        info!(
            build_id = %descriptor.build_id,
            version = %descriptor.version,
            silent = descriptor.force_update,
            "Applying update"
        );
        UpdateDecision::Executed(self.perform_force_update().await)
    }

    /// Clear every client-side store and reload with the post-update marker.
    ///
    /// Each step is attempted regardless of earlier failures and the reload
    /// always happens: a stale cache refills on the next load, a missed reload
    /// leaves the session on the old build.
    pub async fn perform_force_update(&self) -> CleanupReport {
        let mut caches_deleted = 0;
        let mut cache_failures = 0;

        match self.storage.list_caches().await {
            Ok(names) => {
                for name in names {
                    match self.storage.delete_cache(&name).await {
                        Ok(_) => caches_deleted += 1,
                        Err(e) => {
                            cache_failures += 1;
                            warn!(cache = %name, error = %e, "Failed to delete cache");
                        }
                    }
                }
            }
            Err(e) => {
                cache_failures += 1;
                warn!(error = %e, "Failed to enumerate caches");
            }
        }

        let persistent_cleared = match self.storage.clear_persistent().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear persistent storage");
                false
            }
        };

        let session_cleared = match self.storage.clear_session().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear session storage");
                false
            }
        };

        let reload_url = self
            .params
            .reload_target(&self.navigator.location(), self.clock.now_ms());

        info!(
            caches_deleted,
            cache_failures,
            persistent_cleared,
            session_cleared,
            reload_url = %reload_url,
            "Client state cleared, reloading"
        );
        self.navigator.navigate_replace(reload_url.clone());

        CleanupReport {
            caches_deleted,
            cache_failures,
            persistent_cleared,
            session_cleared,
            reload_url,
        }
    }
}

#[async_trait]
impl UpdateTrigger for UpdateExecutor {
    async fn trigger(&self, descriptor: VersionDescriptor) {
        let decision = self.force_update(&descriptor).await;
        debug!(?decision, "Update trigger handled");
    }
}
