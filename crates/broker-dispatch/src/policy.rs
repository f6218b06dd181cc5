use std::time::Duration;

use broker_core::{GENERATION_TIMEOUT_SECS, MAX_ATTEMPTS, WATCHDOG_TIMEOUT_SECS};

/// Tunables for the dispatch loop. Grouped into one validated value so the
/// loop stays constructible from a plain struct in tests rather than
/// reading global configuration.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
    pub watchdog_timeout: Duration,
    pub generation_timeout: Duration,
    pub tick_interval: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        DispatchPolicy {
            max_attempts: MAX_ATTEMPTS,
            watchdog_timeout: Duration::from_secs(WATCHDOG_TIMEOUT_SECS as u64),
            generation_timeout: Duration::from_secs(GENERATION_TIMEOUT_SECS),
            tick_interval: Duration::from_millis(500),
        }
    }
}

impl DispatchPolicy {
    /// Watchdog timeout must exceed the generation timeout, otherwise a job
    /// still legitimately running would be reaped as dead.
    pub fn validate(&self) -> Result<(), String> {
        if self.watchdog_timeout <= self.generation_timeout {
            return Err(format!(
                "watchdog_timeout ({:?}) must exceed generation_timeout ({:?})",
                self.watchdog_timeout, self.generation_timeout
            ));
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        DispatchPolicy::default().validate().unwrap();
    }

    #[test]
    fn watchdog_not_exceeding_generation_timeout_is_invalid() {
        let policy = DispatchPolicy {
            watchdog_timeout: Duration::from_secs(60),
            generation_timeout: Duration::from_secs(180),
            ..DispatchPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
