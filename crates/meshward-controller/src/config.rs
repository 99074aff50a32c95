use crate::error::{ControllerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Durations are written as whole seconds in the config file
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Settings of the service-discovery integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CloudMapConfig {
    /// How often the instance reconciler runs
    #[serde(with = "secs")]
    pub sync_interval: Duration,
    /// Lifetime of cached namespace, service and instance lookups
    #[serde(with = "secs")]
    pub cache_ttl: Duration,
    /// TTL of the A record created for DNS_PRIVATE namespaces
    pub dns_ttl: i64,
    /// Create services with custom health checks and report pod readiness
    /// as instance health
    pub enable_custom_health_check: bool,
}

impl Default for CloudMapConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(60),
            dns_ttl: 300,
            enable_custom_health_check: false,
        }
    }
}

/// Deadlines of remote control-plane calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(with = "secs")]
    pub read_timeout: Duration,
    #[serde(with = "secs")]
    pub write_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration for the mesh controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Account the controller acts as; remote resources created under it are owned
    pub account_id: String,
    /// Region used when rendering remote ARNs
    pub region: String,
    /// Interval between full resync passes
    #[serde(with = "secs")]
    pub resync_interval: Duration,
    /// Upper bound on reconciles running at once
    pub max_concurrent_reconciles: usize,
    pub cloudmap: CloudMapConfig,
    pub remote: RemoteConfig,
    /// Throttle overrides, `service:operationRegex=rate:burst[,...]`
    pub throttle: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            region: "us-west-2".to_string(),
            resync_interval: Duration::from_secs(30),
            max_concurrent_reconciles: 4,
            cloudmap: CloudMapConfig::default(),
            remote: RemoteConfig::default(),
            throttle: None,
        }
    }
}

impl ControllerConfig {
    /// Parse a config from YAML; missing fields take their defaults
    pub fn from_yaml(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).map_err(|e| {
            ControllerError::invalid_config(
                format!("Failed to parse controller config: {}", e),
                "Check the YAML syntax and field names (camelCase)",
            )
        })
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ControllerError::invalid_config(
                format!("Failed to read {}: {}", path.display(), e),
                "Pass an existing, readable file to --config",
            )
        })?;
        Self::from_yaml(&data)
    }

    /// Check the values a running controller depends on
    pub fn validate(&self) -> Result<()> {
        if self.account_id.is_empty() {
            return Err(ControllerError::invalid_config(
                "accountId is not set",
                "Set accountId in the config file or pass --account-id",
            ));
        }
        if self.max_concurrent_reconciles == 0 {
            return Err(ControllerError::invalid_config(
                "maxConcurrentReconciles must be at least 1",
                "Use the default of 4 unless the remote API limits are raised",
            ));
        }
        if self.resync_interval.is_zero() || self.cloudmap.sync_interval.is_zero() {
            return Err(ControllerError::invalid_config(
                "sync intervals must be non-zero",
                "Use whole seconds, for example resyncInterval: 30",
            ));
        }
        if self.cloudmap.dns_ttl <= 0 {
            return Err(ControllerError::invalid_config(
                format!("cloudmap.dnsTtl must be positive, got {}", self.cloudmap.dns_ttl),
                "Use the default of 300 seconds",
            ));
        }
        Ok(())
    }
}

/// Normalize an account ID that went through a float conversion
///
/// `1.23456789012e+11` becomes `123456789012`. Anything else that is not a
/// 12-digit ID is logged and returned unchanged.
pub fn normalize_account_id(account_id: &str) -> String {
    if account_id.len() == 12 && account_id.chars().all(|c| c.is_ascii_digit()) {
        return account_id.to_string();
    }

    if let Some(mantissa) = account_id.strip_suffix("e+11") {
        let mut chars = mantissa.chars();
        let lead = chars.next();
        let dot = chars.next();
        let rest = chars.as_str();
        if let (Some(lead), Some('.')) = (lead, dot) {
            if lead.is_ascii_digit() && rest.len() == 11 && rest.chars().all(|c| c.is_ascii_digit())
            {
                return format!("{}{}", lead, rest);
            }
        }
    }

    warn!("Account ID {} is not a 12-digit ID, using it as given", account_id);
    account_id.to_string()
}
