//! Configuration for a Boxoffice deployment.
//!
//! Loaded once at startup from `BOXOFFICE_*` environment variables (see
//! [`BoxofficeConfig::from_env`]) and immutable afterwards.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::{constants, BoxofficeError, PermissionTable, Result, TemplateTable};

/// QR signing material.
#[derive(Debug)]
pub struct SigningConfig {
    /// HMAC key. Never logged.
    pub qr_secret: SecretString,
    /// Prefix of generated ticket numbers.
    pub ticket_prefix: String,
}

impl SigningConfig {
    #[must_use]
    pub fn new(qr_secret: impl Into<String>) -> Self {
        Self {
            qr_secret: SecretString::from(qr_secret.into()),
            ticket_prefix: constants::DEFAULT_TICKET_PREFIX.to_string(),
        }
    }
}

/// Duplicate-request guard tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Requests with the same fingerprint inside this window are rejected.
    pub window_ms: u64,
    /// Maximum fingerprints remembered before the oldest is evicted.
    pub capacity: usize,
}

impl GuardConfig {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window_ms: constants::DEFAULT_DUPLICATE_WINDOW_MS,
            capacity: constants::DEFAULT_DUPLICATE_CACHE_SIZE,
        }
    }
}

/// Retry schedule for background notification jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): doubles each time,
    /// capped at `max_backoff_ms`.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Single attempt, no waiting. Handy in tests.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_NOTIFY_MAX_ATTEMPTS,
            initial_backoff_ms: constants::DEFAULT_NOTIFY_INITIAL_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_NOTIFY_MAX_BACKOFF_MS,
        }
    }
}

/// Where payment proofs are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(constants::DEFAULT_UPLOAD_DIR),
        }
    }
}

/// Tracing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info,boxoffice_ledger=debug`.
    pub filter: String,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: constants::DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

/// Complete deployment configuration.
#[derive(Debug)]
pub struct BoxofficeConfig {
    pub signing: SigningConfig,
    pub guard: GuardConfig,
    pub notifications: RetryPolicy,
    pub uploads: UploadConfig,
    pub log: LogConfig,
    pub templates: TemplateTable,
    pub permissions: PermissionTable,
}

impl BoxofficeConfig {
    /// Defaults everywhere except the secret, which has none.
    #[must_use]
    pub fn with_secret(qr_secret: impl Into<String>) -> Self {
        Self {
            signing: SigningConfig::new(qr_secret),
            guard: GuardConfig::default(),
            notifications: RetryPolicy::default(),
            uploads: UploadConfig::default(),
            log: LogConfig::default(),
            templates: TemplateTable::default(),
            permissions: PermissionTable::default(),
        }
    }

    /// Load from the process environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `BOXOFFICE_QR_SECRET` | *required* |
    /// | `BOXOFFICE_TICKET_PREFIX` | `MIP` |
    /// | `BOXOFFICE_DUPLICATE_WINDOW_MS` | `10000` |
    /// | `BOXOFFICE_DUPLICATE_CACHE_SIZE` | `10000` |
    /// | `BOXOFFICE_NOTIFY_MAX_ATTEMPTS` | `3` |
    /// | `BOXOFFICE_NOTIFY_INITIAL_BACKOFF_MS` | `500` |
    /// | `BOXOFFICE_NOTIFY_MAX_BACKOFF_MS` | `10000` |
    /// | `BOXOFFICE_UPLOAD_DIR` | `uploads` |
    /// | `BOXOFFICE_LOG` | `info` |
    /// | `BOXOFFICE_LOG_JSON` | `false` |
    /// | `BOXOFFICE_TEMPLATES` | built-in table (JSON object) |
    /// | `BOXOFFICE_PERMISSIONS` | built-in matrix (JSON object) |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("BOXOFFICE_QR_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                BoxofficeError::Configuration("BOXOFFICE_QR_SECRET is not set".to_string())
            })?;

        let mut config = Self::with_secret(secret);

        if let Some(prefix) = lookup("BOXOFFICE_TICKET_PREFIX") {
            if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(BoxofficeError::Configuration(format!(
                    "BOXOFFICE_TICKET_PREFIX must be non-empty ASCII alphanumeric, got {prefix:?}"
                )));
            }
            config.signing.ticket_prefix = prefix;
        }

        if let Some(v) = parsed(&lookup, "BOXOFFICE_DUPLICATE_WINDOW_MS")? {
            config.guard.window_ms = v;
        }
        if let Some(v) = parsed(&lookup, "BOXOFFICE_DUPLICATE_CACHE_SIZE")? {
            config.guard.capacity = v;
        }
        if config.guard.capacity == 0 {
            return Err(BoxofficeError::Configuration(
                "BOXOFFICE_DUPLICATE_CACHE_SIZE must be > 0".to_string(),
            ));
        }

        if let Some(v) = parsed(&lookup, "BOXOFFICE_NOTIFY_MAX_ATTEMPTS")? {
            config.notifications.max_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "BOXOFFICE_NOTIFY_INITIAL_BACKOFF_MS")? {
            config.notifications.initial_backoff_ms = v;
        }
        if let Some(v) = parsed(&lookup, "BOXOFFICE_NOTIFY_MAX_BACKOFF_MS")? {
            config.notifications.max_backoff_ms = v;
        }
        if config.notifications.max_attempts == 0 {
            return Err(BoxofficeError::Configuration(
                "BOXOFFICE_NOTIFY_MAX_ATTEMPTS must be >= 1".to_string(),
            ));
        }

        if let Some(dir) = lookup("BOXOFFICE_UPLOAD_DIR") {
            config.uploads.dir = PathBuf::from(dir);
        }
        if let Some(filter) = lookup("BOXOFFICE_LOG") {
            config.log.filter = filter;
        }
        if let Some(v) = parsed(&lookup, "BOXOFFICE_LOG_JSON")? {
            config.log.json = v;
        }

        if let Some(json) = lookup("BOXOFFICE_TEMPLATES") {
            config.templates = serde_json::from_str(&json).map_err(|e| {
                BoxofficeError::Configuration(format!("BOXOFFICE_TEMPLATES: {e}"))
            })?;
        }
        if let Some(json) = lookup("BOXOFFICE_PERMISSIONS") {
            config.permissions = serde_json::from_str(&json).map_err(|e| {
                BoxofficeError::Configuration(format!("BOXOFFICE_PERMISSIONS: {e}"))
            })?;
        }

        Ok(config)
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| BoxofficeError::Configuration(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::{Permission, Role};

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn secret_is_required() {
        let err = BoxofficeConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, BoxofficeError::Configuration(_)));

        let err =
            BoxofficeConfig::from_lookup(lookup_from(&[("BOXOFFICE_QR_SECRET", "  ")])).unwrap_err();
        assert!(matches!(err, BoxofficeError::Configuration(_)));
    }

    #[test]
    fn defaults_apply() {
        let cfg = BoxofficeConfig::from_lookup(lookup_from(&[("BOXOFFICE_QR_SECRET", "s3cret")]))
            .unwrap();
        assert_eq!(cfg.signing.qr_secret.expose_secret(), "s3cret");
        assert_eq!(cfg.signing.ticket_prefix, "MIP");
        assert_eq!(cfg.guard, GuardConfig::default());
        assert_eq!(cfg.notifications, RetryPolicy::default());
        assert!(!cfg.log.json);
        assert!(cfg.permissions.has_permission(Role::Cashier, Permission::PaymentsAdd));
    }

    #[test]
    fn overrides_apply() {
        let cfg = BoxofficeConfig::from_lookup(lookup_from(&[
            ("BOXOFFICE_QR_SECRET", "k"),
            ("BOXOFFICE_TICKET_PREFIX", "FEST"),
            ("BOXOFFICE_DUPLICATE_WINDOW_MS", "2500"),
            ("BOXOFFICE_NOTIFY_MAX_ATTEMPTS", "5"),
            ("BOXOFFICE_LOG_JSON", "true"),
            ("BOXOFFICE_PERMISSIONS", r#"{"grants":{"scanner":["scan.validate"]}}"#),
        ]))
        .unwrap();
        assert_eq!(cfg.signing.ticket_prefix, "FEST");
        assert_eq!(cfg.guard.window(), Duration::from_millis(2500));
        assert_eq!(cfg.notifications.max_attempts, 5);
        assert!(cfg.log.json);
        assert!(cfg.permissions.has_permission(Role::Scanner, Permission::ScanValidate));
        assert!(!cfg.permissions.has_permission(Role::Scanner, Permission::TicketsView));
        assert!(!cfg.permissions.has_permission(Role::Admin, Permission::TicketsView));
    }

    #[test]
    fn bad_numbers_are_configuration_errors() {
        let err = BoxofficeConfig::from_lookup(lookup_from(&[
            ("BOXOFFICE_QR_SECRET", "k"),
            ("BOXOFFICE_DUPLICATE_WINDOW_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BOXOFFICE_DUPLICATE_WINDOW_MS"));
    }

    #[test]
    fn bad_prefix_rejected() {
        let err = BoxofficeConfig::from_lookup(lookup_from(&[
            ("BOXOFFICE_QR_SECRET", "k"),
            ("BOXOFFICE_TICKET_PREFIX", "MIP-"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BoxofficeError::Configuration(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(1_000));
    }

    #[test]
    fn secret_is_redacted_in_debug() {
        let cfg = BoxofficeConfig::with_secret("hunter2");
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"), "secret leaked: {dbg}");
    }
}
