//! Connection retry policy
//!
//! Only the connection itself is retried. Individual data operations never
//! are: a call issued while the store is down fails fast and the caller
//! decides whether to try again.

use std::time::Duration;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Bounded exponential backoff for connection attempts
///
/// ```ignore
/// let retry = RetryConfig::new().with_max_retries(5).with_base_delay_ms(50);
/// assert_eq!(retry.calculate_delay(2), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum connection attempts before giving up
    pub max_retries: usize,
    /// Delay before the second attempt, doubled for each one after
    pub base_delay_ms: u64,
    /// Upper bound on any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 3000,
        }
    }
}

impl RetryConfig {
    /// Defaults: 10 attempts, 100ms base, 3000ms cap
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of attempts
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between attempts
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        // Cap the shift to prevent overflow
        let shift = attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
