//! Reconciler timing and URL settings.

use std::time::Duration;

use thiserror::Error;
use url::Url;
use utils::{
    env::{env_duration_ms, env_string, env_u32},
    update_url::UrlParams,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid descriptor url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("{name} of {value:?} exceeds the maximum of {max:?}")]
    DurationTooLong {
        name: &'static str,
        value: Duration,
        max: Duration,
    },
}

/// Whole milliseconds in `duration`, saturating at `i64::MAX`
pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Settings for [`super::update_reconciler::UpdateReconciler`]
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Where the deployed build publishes its version descriptor
    pub descriptor_url: Url,
    /// Minimum spacing between two checks
    pub min_check_interval: Duration,
    /// Checks that may trigger an update in one session
    pub max_update_attempts: u32,
    pub poll_interval: Duration,
    /// One-shot check after startup
    pub initial_check_delay: Duration,
    /// Suppression window after a reload performed by the executor
    pub post_update_cooldown: Duration,
    /// How much newer the server build timestamp must be before it counts
    pub timestamp_tolerance: Duration,
    pub url_params: UrlParams,
}

impl ReconcilerConfig {
    pub const DEFAULT_DESCRIPTOR_PATH: &'static str = "/version.json";
    /// Upper bound for every configured duration
    pub const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    pub fn new(descriptor_url: Url) -> Self {
        Self {
            descriptor_url,
            min_check_interval: Duration::from_secs(30),
            max_update_attempts: 3,
            poll_interval: Duration::from_secs(5 * 60),
            initial_check_delay: Duration::from_secs(10),
            post_update_cooldown: Duration::from_secs(30),
            timestamp_tolerance: Duration::from_secs(60),
            url_params: UrlParams::default(),
        }
    }

    /// Descriptor published next to the application at `app_url`
    pub fn for_app(app_url: &Url) -> Result<Self, ConfigError> {
        let descriptor_url =
            app_url
                .join(Self::DEFAULT_DESCRIPTOR_PATH)
                .map_err(|source| ConfigError::InvalidUrl {
                    url: app_url.to_string(),
                    source,
                })?;
        Ok(Self::new(descriptor_url))
    }

    /// Apply `UPDATE_*` overrides from the environment on top of the defaults
    pub fn from_env(descriptor_url: Url) -> Result<Self, ConfigError> {
        let defaults = Self::new(descriptor_url);
        let descriptor_url = match env_string("UPDATE_DESCRIPTOR_URL") {
            Some(raw) => Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
                url: raw.clone(),
                source,
            })?,
            None => defaults.descriptor_url,
        };

        let mut url_params = defaults.url_params;
        if let Some(marker) = env_string("UPDATE_MARKER_PARAM") {
            url_params.marker = marker;
        }
        if let Some(cache_bust) = env_string("UPDATE_CACHE_BUST_PARAM") {
            url_params.cache_bust = cache_bust;
        }

        let config = Self {
            descriptor_url,
            min_check_interval: env_duration_ms(
                "UPDATE_MIN_CHECK_INTERVAL_MS",
                defaults.min_check_interval,
            ),
            max_update_attempts: env_u32("UPDATE_MAX_ATTEMPTS", defaults.max_update_attempts),
            poll_interval: env_duration_ms("UPDATE_POLL_INTERVAL_MS", defaults.poll_interval),
            initial_check_delay: env_duration_ms(
                "UPDATE_INITIAL_DELAY_MS",
                defaults.initial_check_delay,
            ),
            post_update_cooldown: env_duration_ms(
                "UPDATE_COOLDOWN_MS",
                defaults.post_update_cooldown,
            ),
            timestamp_tolerance: env_duration_ms(
                "UPDATE_TIMESTAMP_TOLERANCE_MS",
                defaults.timestamp_tolerance,
            ),
            url_params,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // tokio::time::interval panics on a zero period
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("poll_interval"));
        }
        let durations = [
            ("min_check_interval", self.min_check_interval),
            ("poll_interval", self.poll_interval),
            ("initial_check_delay", self.initial_check_delay),
            ("post_update_cooldown", self.post_update_cooldown),
            ("timestamp_tolerance", self.timestamp_tolerance),
        ];
        for (name, value) in durations {
            if value > Self::MAX_DURATION {
                return Err(ConfigError::DurationTooLong {
                    name,
                    value,
                    max: Self::MAX_DURATION,
                });
            }
        }
        Ok(())
    }

    pub fn tolerance_ms(&self) -> i64 {
        millis(self.timestamp_tolerance)
    }
}
