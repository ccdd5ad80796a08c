//! Single-consumer queue of closures executed strictly in post order.
//!
//! Network callbacks post work here instead of running it inline. One
//! [`EventQueue::run`] loop executes the posted closures one at a time, so state
//! touched only from that loop needs no further locking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::block_queue::{BlockQueue, QueueError};
use crate::panic::protect;

/// Default soft capacity used by [`EventQueue::new`].
pub const DEFAULT_CAPACITY: usize = 10_000;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a closure queue. Clones post into the same queue.
#[derive(Clone)]
pub struct EventQueue {
	queue: BlockQueue<Task>,
	running: Arc<AtomicBool>,
}

impl std::fmt::Debug for EventQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventQueue")
			.field("queue", &self.queue)
			.field("running", &self.running.load(Ordering::Relaxed))
			.finish()
	}
}

impl Default for EventQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl EventQueue {
	/// Creates a queue with [`DEFAULT_CAPACITY`].
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_CAPACITY)
	}

	/// Creates a queue whose blocking [`post`](Self::post) waits beyond
	/// `capacity` pending closures. [`post_no_wait`](Self::post_no_wait)
	/// ignores the limit.
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			queue: BlockQueue::new(capacity),
			running: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Enqueues `f` without ever blocking the caller.
	///
	/// Fails only once the queue is closed, in which case `f` is dropped
	/// unexecuted.
	pub fn post_no_wait(&self, f: impl FnOnce() + Send + 'static) -> Result<(), QueueError> {
		let result = self.queue.add_no_wait(Box::new(f), true);
		if result.is_err() {
			tracing::debug!("event_queue.post.dropped");
		}
		result
	}

	/// Enqueues `f`, waiting while the queue is over capacity.
	pub async fn post(&self, f: impl FnOnce() + Send + 'static) -> Result<(), QueueError> {
		self.queue.add(Box::new(f)).await
	}

	/// Consumer loop. Executes closures in post order until the queue is
	/// closed and drained.
	///
	/// A panicking closure is logged and the loop moves on to the next one.
	///
	/// # Panics
	///
	/// Panics if another `run` loop is already active on this queue.
	pub async fn run(&self) {
		assert!(!self.running.swap(true, Ordering::AcqRel), "EventQueue::run is already active");
		// Cleared on drop so a cancelled loop can be restarted.
		let _running = RunGuard(&self.running);
		tracing::trace!("event_queue.run.start");

		let mut buffer = Vec::new();
		loop {
			let (closed, mut tasks) = self.queue.swap(buffer).await;
			for task in tasks.drain(..) {
				protect("event_queue.task", task);
			}
			buffer = tasks;
			if closed {
				break;
			}
		}

		tracing::trace!("event_queue.run.exit");
	}

	/// Stops accepting posts. The running loop drains what is left, then exits.
	pub fn close(&self) {
		self.queue.close();
	}

	/// Returns `true` once [`close`](Self::close) has been called.
	pub fn is_closed(&self) -> bool {
		self.queue.is_closed()
	}

	/// Number of closures waiting to run.
	pub fn len(&self) -> usize {
		self.queue.len()
	}

	/// Returns `true` if nothing is waiting to run.
	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}
