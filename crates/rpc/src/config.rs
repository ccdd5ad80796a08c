//! Tunables for the shared RPC environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for an [`RpcEnv`](crate::RpcEnv) and the clients built on it.
///
/// Every field is optional in TOML:
///
/// ```toml
/// timer_shards = 61
/// event_queue_capacity = 10000
/// call_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcConfig {
	/// Number of independent timer managers pending calls are spread across.
	#[serde(default = "default_timer_shards")]
	pub timer_shards: usize,
	/// Soft capacity of event queues created by the environment.
	#[serde(default = "default_event_queue_capacity")]
	pub event_queue_capacity: usize,
	/// Timeout used by [`Client::call_default`](crate::Client::call_default).
	#[serde(default = "default_call_timeout_ms")]
	pub call_timeout_ms: u64,
}

fn default_timer_shards() -> usize {
	61
}

fn default_event_queue_capacity() -> usize {
	callwire_worker::event_queue::DEFAULT_CAPACITY
}

fn default_call_timeout_ms() -> u64 {
	5_000
}

impl Default for RpcConfig {
	fn default() -> Self {
		Self {
			timer_shards: default_timer_shards(),
			event_queue_capacity: default_event_queue_capacity(),
			call_timeout_ms: default_call_timeout_ms(),
		}
	}
}

impl RpcConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks value ranges.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.timer_shards == 0 {
			return Err(ConfigError::Invalid {
				field: "timer_shards",
				reason: "must be at least 1",
			});
		}
		if self.event_queue_capacity == 0 {
			return Err(ConfigError::Invalid {
				field: "event_queue_capacity",
				reason: "must be at least 1",
			});
		}
		if self.call_timeout_ms == 0 {
			return Err(ConfigError::Invalid {
				field: "call_timeout_ms",
				reason: "must be at least 1",
			});
		}
		Ok(())
	}

	/// [`call_timeout_ms`](Self::call_timeout_ms) as a [`Duration`].
	pub fn call_timeout(&self) -> Duration {
		Duration::from_millis(self.call_timeout_ms)
	}
}
