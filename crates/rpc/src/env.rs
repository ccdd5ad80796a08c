//! Process-wide call bookkeeping: the sequence counter and timer shards.
//!
//! Every [`Client`](crate::Client) draws sequence numbers from one
//! [`RpcEnv`] and parks its pending calls in that environment's timer shards,
//! keyed by `seq`. Whichever of the response path or the shard's timer
//! removes the entry first owns the call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use callwire_worker::{EventQueue, TimerManager, global_handle, runtime_handle};
use tokio::runtime::Handle;

use crate::client::PendingCall;
use crate::config::RpcConfig;
use crate::error::ConfigError;

/// Monotonic sequence numbers starting at 1.
#[derive(Debug, Default)]
pub struct SeqCounter(AtomicU64);

impl SeqCounter {
	/// Creates a counter whose first value is 1.
	pub const fn new() -> Self {
		Self(AtomicU64::new(0))
	}

	/// Returns the next sequence number.
	pub fn next(&self) -> u64 {
		self.0.fetch_add(1, Ordering::Relaxed) + 1
	}
}

/// Shared sequence counter and sharded timeout timers.
pub struct RpcEnv {
	seq: SeqCounter,
	shards: Box<[TimerManager<PendingCall>]>,
	config: RpcConfig,
}

impl std::fmt::Debug for RpcEnv {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RpcEnv")
			.field("shards", &self.shards.len())
			.field("pending", &self.pending_timers())
			.field("config", &self.config)
			.finish()
	}
}

impl RpcEnv {
	/// The process-wide environment, created with default settings on first
	/// use. Its timer drivers run on the process-wide runtime.
	pub fn global() -> Arc<Self> {
		static GLOBAL: OnceLock<Arc<RpcEnv>> = OnceLock::new();
		Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::build(RpcConfig::default(), &global_handle()))))
	}

	/// Creates an isolated environment whose timer drivers run on the current
	/// runtime (or the process-wide one outside a runtime).
	pub fn with_config(config: RpcConfig) -> Result<Self, ConfigError> {
		Self::with_handle(config, &runtime_handle())
	}

	/// Creates an isolated environment whose timer drivers run on `handle`.
	pub fn with_handle(config: RpcConfig, handle: &Handle) -> Result<Self, ConfigError> {
		config.validate()?;
		Ok(Self::build(config, handle))
	}

	fn build(config: RpcConfig, handle: &Handle) -> Self {
		let shards = (0..config.timer_shards).map(|_| TimerManager::with_handle(handle)).collect();
		tracing::debug!(shards = config.timer_shards, "rpc.env.init");
		Self {
			seq: SeqCounter::new(),
			shards,
			config,
		}
	}

	/// Allocates the next call sequence number.
	pub fn next_seq(&self) -> u64 {
		self.seq.next()
	}

	/// Settings this environment was built with.
	pub fn config(&self) -> &RpcConfig {
		&self.config
	}

	/// Number of timer shards.
	pub fn shard_count(&self) -> usize {
		self.shards.len()
	}

	/// Index of the shard that owns `seq`.
	pub fn shard_index(&self, seq: u64) -> usize {
		(seq % self.shards.len() as u64) as usize
	}

	pub(crate) fn shard(&self, seq: u64) -> &TimerManager<PendingCall> {
		&self.shards[self.shard_index(seq)]
	}

	/// Timeout timers still armed across all shards.
	pub fn pending_timers(&self) -> usize {
		self.shards.iter().map(TimerManager::len).sum()
	}

	/// Creates an event queue sized by [`RpcConfig::event_queue_capacity`].
	pub fn new_event_queue(&self) -> EventQueue {
		EventQueue::with_capacity(self.config.event_queue_capacity)
	}
}
