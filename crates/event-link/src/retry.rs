use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub initial_delay: Duration,
	pub max_delay: Duration,
	pub backoff_multiplier: u32,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			initial_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(30),
			backoff_multiplier: 2,
		}
	}
}

impl RetryConfig {
	/// Delay owed after `failures` consecutive failed or lost connections:
	/// `min(initial * multiplier^failures, max)`.
	#[must_use]
	pub fn delay_for(&self, failures: u32) -> Duration {
		self
			.backoff_multiplier
			.checked_pow(failures)
			.and_then(|factor| self.initial_delay.checked_mul(factor))
			.map_or(self.max_delay, |delay| delay.min(self.max_delay))
	}
}

/// Tracks consecutive failures and hands out the matching backoff delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	config: RetryConfig,
	consecutive_failures: u32,
}

impl RetryPolicy {
	#[must_use]
	pub const fn new(config: RetryConfig) -> Self {
		Self {
			config,
			consecutive_failures: 0,
		}
	}

	/// Delay the next failure will be charged.
	#[must_use]
	pub fn next_delay(&self) -> Duration {
		self.config.delay_for(self.consecutive_failures)
	}

	/// Record a failure and return the delay to wait before retrying.
	pub fn record_failure(&mut self) -> Duration {
		let delay = self.next_delay();
		self.consecutive_failures = self.consecutive_failures.saturating_add(1);
		delay
	}

	pub fn reset(&mut self) {
		self.consecutive_failures = 0;
	}

	#[must_use]
	pub const fn attempts(&self) -> u32 {
		self.consecutive_failures
	}
}
