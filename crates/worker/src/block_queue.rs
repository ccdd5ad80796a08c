//! Bounded FIFO with blocking and batch access.
//!
//! Producers wait while the queue holds `full_size` items; consumers wait
//! while it is empty. Closing wakes everyone and makes further adds fail.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

/// Error returned by queue producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
	/// Queue is at capacity and a non-blocking add was used.
	#[error("queue is full")]
	Full,
	/// Queue has been closed.
	#[error("queue is closed")]
	Closed,
}

struct QueueState<T> {
	items: Vec<T>,
	full_size: usize,
	closed: bool,
}

struct QueueInner<T> {
	state: Mutex<QueueState<T>>,
	not_empty: Notify,
	not_full: Notify,
}

/// Bounded FIFO that hands its whole backlog to the consumer in one batch.
///
/// Producers block in [`add`](Self::add) while the queue holds `full_size`
/// items. Consumers take everything buffered at once through
/// [`get`](Self::get) or [`swap`](Self::swap). Closing is permanent: adds fail
/// with [`QueueError::Closed`] and the remaining backlog can be drained once
/// more, reported together with `closed = true`.
///
/// Handles are cheap to clone and share the same queue.
pub struct BlockQueue<T> {
	inner: Arc<QueueInner<T>>,
}

impl<T> Clone for BlockQueue<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> std::fmt::Debug for BlockQueue<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("BlockQueue")
			.field("len", &state.items.len())
			.field("full_size", &state.full_size)
			.field("closed", &state.closed)
			.finish()
	}
}

impl<T> BlockQueue<T> {
	/// Creates a queue holding at most `full_size` items before producers block.
	///
	/// # Panics
	///
	/// Panics if `full_size` is zero.
	pub fn new(full_size: usize) -> Self {
		assert!(full_size > 0, "queue full size must be > 0");
		Self {
			inner: Arc::new(QueueInner {
				state: Mutex::new(QueueState {
					items: Vec::with_capacity(full_size.min(1024)),
					full_size,
					closed: false,
				}),
				not_empty: Notify::new(),
				not_full: Notify::new(),
			}),
		}
	}

	/// Appends `item`, waiting while the queue is full.
	///
	/// Returns [`QueueError::Closed`] if the queue is closed before or while
	/// waiting.
	pub async fn add(&self, item: T) -> Result<(), QueueError> {
		loop {
			// Register before checking capacity so a wakeup between unlock and
			// await is not lost.
			let notified = self.inner.not_full.notified();
			{
				let mut state = self.inner.state.lock();
				if state.closed {
					return Err(QueueError::Closed);
				}
				if state.items.len() < state.full_size {
					state.items.push(item);
					drop(state);
					self.inner.not_empty.notify_one();
					return Ok(());
				}
			}
			notified.await;
		}
	}

	/// Appends `item` without waiting.
	///
	/// At capacity this fails with [`QueueError::Full`] unless `force` is set,
	/// in which case the item is appended past the limit.
	pub fn add_no_wait(&self, item: T, force: bool) -> Result<(), QueueError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(QueueError::Closed);
		}
		if !force && state.items.len() >= state.full_size {
			return Err(QueueError::Full);
		}
		state.items.push(item);
		drop(state);
		self.inner.not_empty.notify_one();
		Ok(())
	}

	/// Waits for at least one item (or close) and takes the whole backlog.
	///
	/// The flag is `true` once the queue is closed; the items returned with the
	/// first `true` are the final backlog.
	pub async fn get(&self) -> (bool, Vec<T>) {
		self.swap(Vec::new()).await
	}

	/// Takes whatever is buffered without waiting.
	pub fn get_no_wait(&self) -> (bool, Vec<T>) {
		let mut state = self.inner.state.lock();
		let items = std::mem::take(&mut state.items);
		let closed = state.closed;
		drop(state);
		if !items.is_empty() {
			self.inner.not_full.notify_waiters();
		}
		(closed, items)
	}

	/// Like [`get`](Self::get), but the queue keeps `buffer` (cleared) as its
	/// new backing storage.
	///
	/// Consumers that alternate two buffers avoid reallocating every round.
	pub async fn swap(&self, mut buffer: Vec<T>) -> (bool, Vec<T>) {
		buffer.clear();
		loop {
			let notified = self.inner.not_empty.notified();
			{
				let mut state = self.inner.state.lock();
				if !state.items.is_empty() {
					let items = std::mem::replace(&mut state.items, buffer);
					let closed = state.closed;
					drop(state);
					self.inner.not_full.notify_waiters();
					return (closed, items);
				}
				if state.closed {
					return (true, buffer);
				}
			}
			notified.await;
		}
	}

	/// Changes the capacity. Producers blocked on the old limit re-check.
	///
	/// # Panics
	///
	/// Panics if `full_size` is zero.
	pub fn set_full_size(&self, full_size: usize) {
		assert!(full_size > 0, "queue full size must be > 0");
		let mut state = self.inner.state.lock();
		let raised = full_size > state.full_size;
		state.full_size = full_size;
		drop(state);
		if raised {
			self.inner.not_full.notify_waiters();
		}
	}

	/// Discards the backlog without closing the queue.
	///
	/// Blocked producers wake and retry; blocked consumers wake, find nothing
	/// and keep waiting.
	pub fn clear(&self) {
		let dropped = {
			let mut state = self.inner.state.lock();
			std::mem::take(&mut state.items)
		};
		tracing::trace!(dropped = dropped.len(), "block_queue.clear");
		drop(dropped);
		self.inner.not_full.notify_waiters();
		self.inner.not_empty.notify_waiters();
	}

	/// Closes the queue and wakes every waiter. Idempotent.
	pub fn close(&self) {
		let mut state = self.inner.state.lock();
		if state.closed {
			return;
		}
		state.closed = true;
		drop(state);
		self.inner.not_empty.notify_waiters();
		self.inner.not_full.notify_waiters();
	}

	/// Returns `true` if the backlog has reached capacity.
	pub fn is_full(&self) -> bool {
		let state = self.inner.state.lock();
		state.items.len() >= state.full_size
	}

	/// Returns `true` once [`close`](Self::close) has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}

	/// Number of buffered items.
	pub fn len(&self) -> usize {
		self.inner.state.lock().items.len()
	}

	/// Returns `true` if nothing is buffered.
	pub fn is_empty(&self) -> bool {
		self.inner.state.lock().items.is_empty()
	}

	/// Current capacity.
	pub fn full_size(&self) -> usize {
		self.inner.state.lock().full_size
	}
}
