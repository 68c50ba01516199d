use crate::core::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct Args {
    pub(crate) database_host: String,
    pub(crate) database_port: u16,
    pub(crate) database_name: String,
    pub(crate) database_user: String,
    pub(crate) database_password: String,
    pub(crate) database_max_connections: u32,
    pub(crate) log_level: String,
    pub(crate) port: u16,
    pub(crate) handler_timeout_seconds: u64,
    pub(crate) lease_window_seconds: i64,
    pub(crate) release_grace_seconds: i64,
    pub(crate) deletion_threshold_seconds: i64,
    pub(crate) reconcile_interval_seconds: u64,
    pub(crate) lock_ttl_seconds: u64,
}

impl Args {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .set_default("database_port", 5432)?
            .set_default("database_max_connections", 5)?
            .set_default("log_level", "info")?
            .set_default("port", 8080)?
            .set_default("handler_timeout_seconds", 10)?
            .set_default("lease_window_seconds", 60)?
            .set_default("release_grace_seconds", 0)?
            .set_default("deletion_threshold_seconds", 5 * 60)?
            .set_default("reconcile_interval_seconds", 10)?
            .set_default("lock_ttl_seconds", 60)?
            .add_source(config::Environment::with_prefix("TOKEN_POOL"))
            .build()?;

        Ok(config.try_deserialize::<Args>()?)
    }

    pub(crate) fn database_url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.database_user,
            self.database_password,
            self.database_host,
            self.database_port,
            self.database_name
        )
    }

    pub(crate) fn lease_settings(&self) -> Result<LeaseSettings, ConfigError> {
        LeaseSettings::new(
            self.lease_window_seconds,
            self.release_grace_seconds,
            self.deletion_threshold_seconds,
            Duration::from_secs(self.lock_ttl_seconds),
        )
    }

    pub(crate) fn reconcile_interval(&self) -> Result<Duration, ConfigError> {
        if self.reconcile_interval_seconds == 0 {
            return Err(ConfigError::InvalidLeaseSettings(
                "reconcile interval must be positive".to_string(),
            ));
        }

        Ok(Duration::from_secs(self.reconcile_interval_seconds))
    }
}

/// Timing rules shared by every lease operation and the reconciliation pass.
///
/// All values are in seconds except the lock TTL. Deadlines are compared
/// against epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LeaseSettings {
    /// how long an assignment or renewal stays valid
    pub(crate) lease_window: i64,
    /// how far past its deadline an assigned token may drift before it is released
    pub(crate) release_grace: i64,
    /// inactivity before a token is purged; for an assigned token this counts
    /// from its last assignment or renewal, for a pooled one from its deadline
    pub(crate) deletion_threshold: i64,
    pub(crate) lock_ttl: Duration,
}

impl LeaseSettings {
    pub(crate) fn new(
        lease_window: i64,
        release_grace: i64,
        deletion_threshold: i64,
        lock_ttl: Duration,
    ) -> Result<Self, ConfigError> {
        if lease_window <= 0 {
            return Err(ConfigError::InvalidLeaseSettings(
                "lease window must be positive".to_string(),
            ));
        }

        if release_grace < 0 {
            return Err(ConfigError::InvalidLeaseSettings(
                "release grace cannot be negative".to_string(),
            ));
        }

        if deletion_threshold <= lease_window {
            return Err(ConfigError::InvalidLeaseSettings(format!(
                "deletion threshold ({deletion_threshold}s) must exceed the lease window ({lease_window}s)"
            )));
        }

        if deletion_threshold <= release_grace {
            return Err(ConfigError::InvalidLeaseSettings(format!(
                "deletion threshold ({deletion_threshold}s) must exceed the release grace ({release_grace}s)"
            )));
        }

        if lock_ttl.is_zero() {
            return Err(ConfigError::InvalidLeaseSettings(
                "lock ttl must be positive".to_string(),
            ));
        }

        Ok(Self {
            lease_window,
            release_grace,
            deletion_threshold,
            lock_ttl,
        })
    }
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            lease_window: 60,
            release_grace: 0,
            deletion_threshold: 5 * 60,
            lock_ttl: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lease_settings_are_valid() {
        let defaults = LeaseSettings::default();

        let validated = LeaseSettings::new(
            defaults.lease_window,
            defaults.release_grace,
            defaults.deletion_threshold,
            defaults.lock_ttl,
        )
        .unwrap();

        assert_eq!(validated, defaults);
    }

    #[test]
    fn test_deletion_threshold_must_exceed_lease_window() {
        let result = LeaseSettings::new(60, 0, 60, Duration::from_secs(60));
        assert!(matches!(result, Err(ConfigError::InvalidLeaseSettings(_))));

        let result = LeaseSettings::new(60, 0, 30, Duration::from_secs(60));
        assert!(matches!(result, Err(ConfigError::InvalidLeaseSettings(_))));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(LeaseSettings::new(0, 0, 300, Duration::from_secs(60)).is_err());
        assert!(LeaseSettings::new(60, -1, 300, Duration::from_secs(60)).is_err());
        assert!(LeaseSettings::new(60, 0, 300, Duration::ZERO).is_err());
    }
}
