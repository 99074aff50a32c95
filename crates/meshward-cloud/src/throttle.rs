//! Per-operation token-bucket throttling for remote API calls
//!
//! Rules are keyed by a service name and an operation-name regex. A call
//! waits on every rule that matches it; callers block rather than fail while
//! over budget, up to their own deadline.

use crate::error::{CloudError, Result};
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Service name used for the mesh API
pub const SERVICE_APPMESH: &str = "appmesh";

/// Service name used for the service-discovery API
pub const SERVICE_SERVICEDISCOVERY: &str = "servicediscovery";

/// A token bucket refilled continuously at `rate` tokens per second
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available, otherwise report how long until one is
    pub fn try_acquire(&self) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        if self.rate <= 0.0 {
            return Err(Duration::MAX);
        }
        Err(Duration::try_from_secs_f64((1.0 - state.tokens) / self.rate).unwrap_or(Duration::MAX))
    }

    /// Wait for a token, giving up if none is available before `deadline`
    pub async fn acquire(&self, operation: &str, deadline: Instant) -> Result<()> {
        loop {
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    let past_deadline = Instant::now()
                        .checked_add(wait)
                        .map_or(true, |ready| ready > deadline);
                    if past_deadline {
                        return Err(CloudError::throttled(operation));
                    }
                    debug!("Throttling {} for {:?}", operation, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// One throttle rule
#[derive(Debug, Clone)]
pub struct ThrottleRule {
    pub service: String,
    pub operation_pattern: Regex,
    pub rate: f64,
    pub burst: u32,
}

impl ThrottleRule {
    pub fn new(service: &str, pattern: &str, rate: f64, burst: u32) -> Result<Self> {
        let operation_pattern = Regex::new(pattern).map_err(|e| {
            CloudError::invalid_throttle_config(format!(
                "invalid operation pattern {}: {}",
                pattern, e
            ))
        })?;
        Ok(Self {
            service: service.to_string(),
            operation_pattern,
            rate,
            burst,
        })
    }

    fn same_target(&self, other: &ThrottleRule) -> bool {
        self.service == other.service
            && self.operation_pattern.as_str() == other.operation_pattern.as_str()
    }
}

/// Built-in rules, matching the managed services' published limits
pub fn default_rules() -> Vec<ThrottleRule> {
    let defaults: [(&str, &str, f64, u32); 7] = [
        (SERVICE_APPMESH, "^Describe|List", 40.0, 5),
        (SERVICE_APPMESH, "^Create|Update|Delete", 8.0, 5),
        (SERVICE_SERVICEDISCOVERY, "^ListNamespaces", 1.0, 8),
        (SERVICE_SERVICEDISCOVERY, "^ListServices", 1.0, 8),
        (SERVICE_SERVICEDISCOVERY, "^CreateService", 8.0, 80),
        (SERVICE_SERVICEDISCOVERY, "^ListInstances", 40.0, 400),
        (SERVICE_SERVICEDISCOVERY, "^RegisterInstance|DeregisterInstance", 4.0, 80),
    ];
    defaults
        .iter()
        .filter_map(|(service, pattern, rate, burst)| {
            ThrottleRule::new(service, pattern, *rate, *burst).ok()
        })
        .collect()
}

/// Parse `service:operationRegex=rate:burst[,...]`
pub fn parse_rules(config: &str) -> Result<Vec<ThrottleRule>> {
    let mut rules = Vec::new();
    for entry in config.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (service, rest) = entry.split_once(':').ok_or_else(|| {
            CloudError::invalid_throttle_config(format!("missing service in {}", entry))
        })?;
        let (pattern, limits) = rest.rsplit_once('=').ok_or_else(|| {
            CloudError::invalid_throttle_config(format!("missing '=' in {}", entry))
        })?;
        let (rate, burst) = limits.split_once(':').ok_or_else(|| {
            CloudError::invalid_throttle_config(format!("expected rate:burst in {}", entry))
        })?;
        let rate: f64 = rate.trim().parse().map_err(|_| {
            CloudError::invalid_throttle_config(format!("invalid rate {} in {}", rate, entry))
        })?;
        let burst: u32 = burst.trim().parse().map_err(|_| {
            CloudError::invalid_throttle_config(format!("invalid burst {} in {}", burst, entry))
        })?;
        if service.is_empty() || pattern.is_empty() {
            return Err(CloudError::invalid_throttle_config(format!(
                "empty service or operation pattern in {}",
                entry
            )));
        }
        rules.push(ThrottleRule::new(service.trim(), pattern, rate, burst)?);
    }
    Ok(rules)
}

/// Apply overrides on top of `base`: an existing `(service, pattern)` pair is
/// replaced, new pairs are appended
pub fn merge_rules(mut base: Vec<ThrottleRule>, overrides: Vec<ThrottleRule>) -> Vec<ThrottleRule> {
    for rule in overrides {
        match base.iter_mut().find(|r| r.same_target(&rule)) {
            Some(existing) => *existing = rule,
            None => base.push(rule),
        }
    }
    base
}

/// Throttler shared by every remote client
#[derive(Debug, Clone)]
pub struct Throttler {
    rules: Arc<Vec<(ThrottleRule, TokenBucket)>>,
}

impl Throttler {
    pub fn new(rules: Vec<ThrottleRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let bucket = TokenBucket::new(rule.rate, rule.burst);
                (rule, bucket)
            })
            .collect();
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Defaults with an optional override string applied
    pub fn from_config(overrides: Option<&str>) -> Result<Self> {
        let overrides = match overrides {
            Some(config) => parse_rules(config)?,
            None => Vec::new(),
        };
        Ok(Self::new(merge_rules(default_rules(), overrides)))
    }

    /// A throttler that never waits
    pub fn unlimited() -> Self {
        Self::new(Vec::new())
    }

    /// Wait on every rule matching `service`/`operation`
    pub async fn acquire(&self, service: &str, operation: &str, deadline: Instant) -> Result<()> {
        for (rule, bucket) in self.rules.iter() {
            if rule.service == service && rule.operation_pattern.is_match(operation) {
                bucket.acquire(operation, deadline).await?;
            }
        }
        Ok(())
    }
}

/// Deadlines applied to remote calls, by operation class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    pub read: Duration,
    pub write: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(5),
            write: Duration::from_secs(10),
        }
    }
}

/// Run `call` behind the throttler with a bounded deadline
///
/// Waiting for a token counts against the same deadline as the call itself.
pub async fn throttled_call<T, F>(
    throttler: &Throttler,
    service: &str,
    operation: &str,
    timeout: Duration,
    call: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let guarded = async {
        throttler.acquire(service, operation, deadline).await?;
        call.await
    };
    match tokio::time::timeout_at(deadline, guarded).await {
        Ok(result) => result,
        Err(_) => Err(CloudError::timeout(
            operation,
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}
