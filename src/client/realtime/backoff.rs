//! 重连退避策略

use std::time::Duration;

use crate::config::RealtimeConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

impl From<&RealtimeConfig> for ReconnectPolicy {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            max_attempts: config.max_reconnect_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// 第 `failure` 次失败后的等待时间 `base * 2^(failure-1)`，超过上限返回 `None`
    pub fn delay_for(&self, failure: u32) -> Option<Duration> {
        if failure == 0 || failure > self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(failure - 1)?;
        self.base_delay.checked_mul(factor)
    }
}
