//! Deadline-ordered timers driven by one task per manager.
//!
//! A [`TimerManager`] keeps its pending timers in a [`MinHeap`] ordered by
//! deadline. A single driver task sleeps until the earliest deadline, fires
//! everything due, and goes back to sleep; inserting an earlier timer wakes it
//! so the sleep is shortened instead of overshooting.
//!
//! Timers can be cancelled through the [`TimerHandle`] returned on creation or,
//! for one-shot timers registered with [`TimerManager::once_with_index`],
//! through a caller-chosen `u64` key.
//!
//! Firing and cancelling are arbitrated under the manager lock. The driver
//! detaches a due one-shot timer (heap entry, payload and key) before running
//! its callback, so a concurrent [`TimerManager::cancel_by_index`] either takes
//! the context first or finds nothing. There is no "found but already firing"
//! outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use callwire_primitives::{HeapElement, MinHeap};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::panic::protect;
use crate::spawn::{global_handle, runtime_handle, spawn_on};

/// Shortest interval a repeating timer is re-armed with.
pub const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

const NO_SLOT: usize = usize::MAX;

#[derive(Debug)]
struct TimerNode {
	id: u64,
	/// Nanoseconds since the owning manager's epoch.
	deadline: AtomicU64,
	slot: AtomicUsize,
}

impl HeapElement for TimerNode {
	fn less(&self, other: &Self) -> bool {
		let lhs = (self.deadline.load(Ordering::Relaxed), self.id);
		let rhs = (other.deadline.load(Ordering::Relaxed), other.id);
		lhs < rhs
	}

	fn heap_index(&self) -> Option<usize> {
		match self.slot.load(Ordering::Relaxed) {
			NO_SLOT => None,
			slot => Some(slot),
		}
	}

	fn set_heap_index(&self, index: Option<usize>) {
		self.slot.store(index.unwrap_or(NO_SLOT), Ordering::Relaxed);
	}
}

/// Opaque reference to a scheduled timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
	node: Arc<TimerNode>,
}

impl TimerHandle {
	/// Identifier unique within the owning manager.
	pub fn id(&self) -> u64 {
		self.node.id
	}
}

impl PartialEq for TimerHandle {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.node, &other.node)
	}
}

impl Eq for TimerHandle {}

type OnceCallback<C> = Box<dyn FnOnce(&TimerHandle, C) + Send + 'static>;
type RepeatTick = Arc<Mutex<Box<dyn FnMut(&TimerHandle) + Send + 'static>>>;

enum TimerKind<C> {
	Once { ctx: C, callback: OnceCallback<C> },
	Repeat { interval: Duration, tick: RepeatTick },
}

struct TimerEntry<C> {
	node: Arc<TimerNode>,
	key: Option<u64>,
	kind: TimerKind<C>,
}

enum Fired<C> {
	Once { handle: TimerHandle, ctx: C, callback: OnceCallback<C> },
	Repeat { handle: TimerHandle, tick: RepeatTick },
}

impl<C> Fired<C> {
	fn run(self) {
		match self {
			Self::Once { handle, ctx, callback } => {
				protect("timer.once", || callback(&handle, ctx));
			}
			Self::Repeat { handle, tick } => {
				protect("timer.repeat", || {
					let mut tick = tick.lock();
					(*tick)(&handle);
				});
			}
		}
	}
}

struct TimerState<C> {
	heap: MinHeap<Arc<TimerNode>>,
	entries: HashMap<u64, TimerEntry<C>>,
	index: HashMap<u64, u64>,
	next_id: u64,
	closed: bool,
}

impl<C> TimerState<C> {
	/// Detaches a pending timer from the heap, the payload map and the key map.
	fn detach(&mut self, id: u64) -> Option<TimerEntry<C>> {
		let entry = self.entries.remove(&id)?;
		self.heap.remove(&entry.node);
		if let Some(key) = entry.key
			&& self.index.get(&key) == Some(&id)
		{
			self.index.remove(&key);
		}
		Some(entry)
	}

	fn owns(&self, handle: &TimerHandle) -> bool {
		self.entries
			.get(&handle.node.id)
			.is_some_and(|entry| Arc::ptr_eq(&entry.node, &handle.node))
	}
}

struct TimerShared<C> {
	epoch: Instant,
	state: Mutex<TimerState<C>>,
	wake: Arc<Notify>,
}

impl<C> TimerShared<C> {
	fn nanos_at(&self, at: Instant) -> u64 {
		u64::try_from(at.saturating_duration_since(self.epoch).as_nanos()).unwrap_or(u64::MAX)
	}

	fn nanos_after(&self, at: Instant, delay: Duration) -> u64 {
		self.nanos_at(at).saturating_add(u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX))
	}

	/// `None` for deadlines too far out to represent; the driver then waits
	/// for a wake-up instead.
	fn instant_at(&self, nanos: u64) -> Option<Instant> {
		self.epoch.checked_add(Duration::from_nanos(nanos))
	}

	/// Marks the manager closed and detaches every pending timer.
	fn shutdown(&self) -> HashMap<u64, TimerEntry<C>> {
		let mut state = self.state.lock();
		state.closed = true;
		state.heap.clear();
		state.index.clear();
		std::mem::take(&mut state.entries)
	}

	/// Pops everything due at `now`. Returns the fired callbacks and the next
	/// deadline, if any timers remain.
	fn collect_due(&self, now: Instant) -> (Vec<Fired<C>>, Option<Instant>) {
		let now_nanos = self.nanos_at(now);
		let mut fired = Vec::new();
		let mut state = self.state.lock();

		while let Some(min) = state.heap.min() {
			if min.deadline.load(Ordering::Relaxed) > now_nanos {
				break;
			}
			let node = Arc::clone(min);
			let handle = TimerHandle { node: Arc::clone(&node) };

			let repeat = state.entries.get(&node.id).map(|entry| match &entry.kind {
				TimerKind::Repeat { interval, tick } => Some((*interval, Arc::clone(tick))),
				TimerKind::Once { .. } => None,
			});

			match repeat {
				Some(Some((interval, tick))) => {
					node.deadline.store(self.nanos_after(now, interval), Ordering::Relaxed);
					state.heap.fix(&node);
					fired.push(Fired::Repeat { handle, tick });
				}
				Some(None) => {
					let Some(entry) = state.detach(node.id) else { continue };
					if let TimerKind::Once { ctx, callback } = entry.kind {
						fired.push(Fired::Once { handle, ctx, callback });
					}
				}
				None => {
					// Heap and payload map disagree; drop the orphan.
					tracing::warn!(timer = node.id, "timer.orphan");
					state.heap.pop_min();
				}
			}
		}

		let next = state.heap.min().and_then(|n| self.instant_at(n.deadline.load(Ordering::Relaxed)));
		(fired, next)
	}
}

/// One-shot and repeating timers with keyed cancellation.
///
/// `C` is the context type handed to one-shot callbacks and returned by
/// [`cancel_by_index`](Self::cancel_by_index). Callbacks run on the driver
/// task, outside the manager lock, and must not block. A callback may call back
/// into its own manager.
///
/// Dropping the manager stops its driver; pending timers are discarded without
/// firing.
pub struct TimerManager<C = ()> {
	shared: Arc<TimerShared<C>>,
}

impl<C> std::fmt::Debug for TimerManager<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.shared.state.lock();
		f.debug_struct("TimerManager")
			.field("pending", &state.entries.len())
			.field("indexed", &state.index.len())
			.field("closed", &state.closed)
			.finish()
	}
}

impl<C: Send + 'static> Default for TimerManager<C> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C: Send + 'static> TimerManager<C> {
	/// Creates a manager whose driver runs on the current runtime, or on the
	/// process-wide runtime when called outside one.
	pub fn new() -> Self {
		Self::with_handle(&runtime_handle())
	}

	/// Creates a manager whose driver runs on `handle`.
	pub fn with_handle(handle: &Handle) -> Self {
		let wake = Arc::new(Notify::new());
		let shared = Arc::new(TimerShared {
			epoch: Instant::now(),
			state: Mutex::new(TimerState {
				heap: MinHeap::new(),
				entries: HashMap::new(),
				index: HashMap::new(),
				next_id: 0,
				closed: false,
			}),
			wake: Arc::clone(&wake),
		});
		spawn_on(handle, "timer.driver", drive(Arc::downgrade(&shared), wake));
		Self { shared }
	}

	/// Fires `callback(handle, ctx)` once, `delay` from now.
	pub fn once(&self, delay: Duration, callback: impl FnOnce(&TimerHandle, C) + Send + 'static, ctx: C) -> TimerHandle {
		self.schedule(
			delay,
			None,
			TimerKind::Once {
				ctx,
				callback: Box::new(callback),
			},
		)
	}

	/// Like [`once`](Self::once), and also registers the timer under `key` for
	/// [`cancel_by_index`](Self::cancel_by_index).
	///
	/// If `key` already names a pending timer, the key moves to the new timer;
	/// the old one stays scheduled but can only be cancelled by handle.
	pub fn once_with_index(
		&self,
		delay: Duration,
		callback: impl FnOnce(&TimerHandle, C) + Send + 'static,
		ctx: C,
		key: u64,
	) -> TimerHandle {
		self.schedule(
			delay,
			Some(key),
			TimerKind::Once {
				ctx,
				callback: Box::new(callback),
			},
		)
	}

	/// Fires `callback(handle, &ctx)` every `interval` until cancelled.
	///
	/// The next deadline is computed from the firing time, so a late tick does
	/// not cause a burst of catch-up ticks. Intervals below
	/// [`MIN_REPEAT_INTERVAL`] are raised to it.
	pub fn repeat(&self, interval: Duration, ctx: C, mut callback: impl FnMut(&TimerHandle, &C) + Send + 'static) -> TimerHandle {
		let interval = interval.max(MIN_REPEAT_INTERVAL);
		let tick: Box<dyn FnMut(&TimerHandle) + Send> = Box::new(move |handle: &TimerHandle| callback(handle, &ctx));
		self.schedule(
			interval,
			None,
			TimerKind::Repeat {
				interval,
				tick: Arc::new(Mutex::new(tick)),
			},
		)
	}

	fn schedule(&self, delay: Duration, key: Option<u64>, kind: TimerKind<C>) -> TimerHandle {
		let deadline = self.shared.nanos_after(Instant::now(), delay);
		let mut state = self.shared.state.lock();
		let id = state.next_id;
		state.next_id += 1;

		let node = Arc::new(TimerNode {
			id,
			deadline: AtomicU64::new(deadline),
			slot: AtomicUsize::new(NO_SLOT),
		});
		let handle = TimerHandle { node: Arc::clone(&node) };

		if state.closed {
			// Dropped without firing, same as timers pending at close.
			tracing::debug!(timer = id, "timer.schedule.closed");
			drop(state);
			drop(kind);
			return handle;
		}

		if let Some(key) = key
			&& let Some(previous) = state.index.insert(key, id)
		{
			tracing::warn!(key, previous, timer = id, "timer.index.replaced");
			if let Some(entry) = state.entries.get_mut(&previous) {
				entry.key = None;
			}
		}

		state.heap.insert(Arc::clone(&node));
		state.entries.insert(id, TimerEntry { node: Arc::clone(&node), key, kind });
		let earliest = state.heap.min().is_some_and(|min| Arc::ptr_eq(min, &node));
		drop(state);

		if earliest {
			self.shared.wake.notify_one();
		}
		handle
	}

	/// Cancels a pending timer. Returns `false` if it already fired (one-shot),
	/// was already cancelled, or belongs to another manager.
	pub fn cancel(&self, handle: &TimerHandle) -> bool {
		let removed = {
			let mut state = self.shared.state.lock();
			if !state.owns(handle) {
				return false;
			}
			state.detach(handle.node.id)
		};
		removed.is_some()
	}

	/// Cancels the one-shot timer registered under `key` and hands back its
	/// context.
	///
	/// Returns `None` if the key was never registered, or its timer has already
	/// fired or been cancelled.
	pub fn cancel_by_index(&self, key: u64) -> Option<C> {
		let entry = {
			let mut state = self.shared.state.lock();
			let id = *state.index.get(&key)?;
			state.detach(id)?
		};
		match entry.kind {
			TimerKind::Once { ctx, .. } => Some(ctx),
			TimerKind::Repeat { .. } => None,
		}
	}

	/// Re-arms a pending timer to fire `delay` from now.
	pub fn reset(&self, handle: &TimerHandle, delay: Duration) -> bool {
		let deadline = self.shared.nanos_after(Instant::now(), delay);
		let mut state = self.shared.state.lock();
		if !state.owns(handle) {
			return false;
		}
		handle.node.deadline.store(deadline, Ordering::Relaxed);
		state.heap.fix(&handle.node);
		drop(state);
		self.shared.wake.notify_one();
		true
	}

	/// Number of pending timers.
	pub fn len(&self) -> usize {
		self.shared.state.lock().entries.len()
	}

	/// Returns `true` if no timers are pending.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Stops the driver and discards pending timers without firing them.
	pub fn close(&self) {
		// Contexts may run arbitrary drop logic; release them unlocked.
		let discarded = self.shared.shutdown();
		tracing::debug!(discarded = discarded.len(), "timer.close");
		drop(discarded);
		self.shared.wake.notify_one();
	}
}

impl<C> Drop for TimerManager<C> {
	fn drop(&mut self) {
		drop(self.shared.shutdown());
		self.shared.wake.notify_one();
	}
}

async fn drive<C: Send + 'static>(shared: Weak<TimerShared<C>>, wake: Arc<Notify>) {
	loop {
		let notified = wake.notified();
		let next = {
			let Some(strong) = shared.upgrade() else { break };
			if strong.state.lock().closed {
				break;
			}
			let (fired, next) = strong.collect_due(Instant::now());
			for f in fired {
				f.run();
			}
			next
		};

		match next {
			Some(deadline) => {
				tokio::select! {
					_ = tokio::time::sleep_until(deadline.into()) => {}
					_ = notified => {}
				}
			}
			None => notified.await,
		}
	}
	tracing::trace!("timer.driver.exit");
}

/// Process-default manager for general scheduling, built on first use.
///
/// Its driver runs on the process-wide runtime.
pub fn global() -> &'static TimerManager {
	static GLOBAL: OnceLock<TimerManager> = OnceLock::new();
	GLOBAL.get_or_init(|| TimerManager::with_handle(&global_handle()))
}

#[cfg(test)]
mod tests;
