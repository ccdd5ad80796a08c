use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use super::{TimerHandle, TimerManager, global};

const WAIT: Duration = Duration::from_secs(2);

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
	tokio::time::timeout(WAIT, rx.recv()).await.expect("timer did not fire").expect("sender dropped")
}

#[tokio::test]
async fn once_fires_with_context() {
	let timers: TimerManager<&'static str> = TimerManager::new();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let started = Instant::now();

	let handle = timers.once(
		Duration::from_millis(20),
		move |h: &TimerHandle, ctx| {
			tx.send((h.id(), ctx)).unwrap();
		},
		"ctx",
	);

	assert_eq!(recv(&mut rx).await, (handle.id(), "ctx"));
	assert!(started.elapsed() >= Duration::from_millis(20));
	assert!(timers.is_empty());
	// Already fired.
	assert!(!timers.cancel(&handle));
}

#[tokio::test]
async fn cancel_before_fire() {
	let timers: TimerManager = TimerManager::new();
	let fired = Arc::new(AtomicUsize::new(0));
	let handle = {
		let fired = Arc::clone(&fired);
		timers.once(
			Duration::from_millis(30),
			move |_, ()| {
				fired.fetch_add(1, Ordering::SeqCst);
			},
			(),
		)
	};

	assert!(timers.cancel(&handle));
	assert!(!timers.cancel(&handle));
	tokio::time::sleep(Duration::from_millis(80)).await;
	assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_by_index_returns_context_once() {
	let timers: TimerManager<String> = TimerManager::new();
	let fired = Arc::new(AtomicUsize::new(0));
	{
		let fired = Arc::clone(&fired);
		timers.once_with_index(
			Duration::from_millis(50),
			move |_, _| {
				fired.fetch_add(1, Ordering::SeqCst);
			},
			"call-7".to_string(),
			7,
		);
	}

	assert_eq!(timers.cancel_by_index(7), Some("call-7".to_string()));
	assert_eq!(timers.cancel_by_index(7), None);
	assert_eq!(timers.cancel_by_index(8), None);

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_by_index_after_fire_finds_nothing() {
	let timers: TimerManager<u32> = TimerManager::new();
	let (tx, mut rx) = mpsc::unbounded_channel();
	timers.once_with_index(Duration::from_millis(10), move |_, ctx| tx.send(ctx).unwrap(), 42, 1);

	assert_eq!(recv(&mut rx).await, 42);
	assert_eq!(timers.cancel_by_index(1), None);
}

#[tokio::test]
async fn cancel_by_handle_releases_key() {
	let timers: TimerManager<u32> = TimerManager::new();
	let handle = timers.once_with_index(Duration::from_secs(60), |_, _| {}, 1, 99);
	assert!(timers.cancel(&handle));
	assert_eq!(timers.cancel_by_index(99), None);
}

#[tokio::test]
async fn reused_key_moves_to_newest_timer() {
	let timers: TimerManager<u32> = TimerManager::new();
	let first = timers.once_with_index(Duration::from_secs(60), |_, _| {}, 1, 5);
	timers.once_with_index(Duration::from_secs(60), |_, _| {}, 2, 5);

	assert_eq!(timers.cancel_by_index(5), Some(2));
	assert_eq!(timers.len(), 1);
	assert!(timers.cancel(&first));
}

#[tokio::test]
async fn fires_in_deadline_order() {
	let timers: TimerManager<u32> = TimerManager::new();
	let (tx, mut rx) = mpsc::unbounded_channel();
	for (delay, tag) in [(60, 3), (20, 1), (40, 2)] {
		let tx = tx.clone();
		timers.once(Duration::from_millis(delay), move |_, ctx| tx.send(ctx).unwrap(), tag);
	}

	let mut order = Vec::new();
	for _ in 0..3 {
		order.push(recv(&mut rx).await);
	}
	assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test]
async fn earlier_insert_shortens_sleep() {
	let timers: TimerManager<&'static str> = TimerManager::new();
	let (tx, mut rx) = mpsc::unbounded_channel();
	{
		let tx = tx.clone();
		timers.once(Duration::from_secs(30), move |_, ctx| tx.send(ctx).unwrap(), "late");
	}
	// Let the driver go to sleep on the 30s deadline.
	tokio::time::sleep(Duration::from_millis(20)).await;

	let started = Instant::now();
	timers.once(Duration::from_millis(10), move |_, ctx| tx.send(ctx).unwrap(), "early");
	assert_eq!(recv(&mut rx).await, "early");
	assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn repeat_until_cancelled_from_callback() {
	let timers = Arc::new(TimerManager::<()>::new());
	let (tx, mut rx) = mpsc::unbounded_channel();
	let ticks = Arc::new(AtomicUsize::new(0));

	{
		let weak = Arc::downgrade(&timers);
		let ticks = Arc::clone(&ticks);
		timers.repeat(Duration::from_millis(10), (), move |handle, _| {
			let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
			if n == 3 {
				let timers = weak.upgrade().expect("manager alive");
				assert!(timers.cancel(handle));
				tx.send(()).unwrap();
			}
		});
	}

	recv(&mut rx).await;
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(ticks.load(Ordering::SeqCst), 3);
	assert!(timers.is_empty());
}

#[tokio::test]
async fn reset_pushes_deadline_out() {
	let timers: TimerManager<()> = TimerManager::new();
	let (tx, mut rx) = mpsc::unbounded_channel();
	let handle = timers.once(Duration::from_millis(20), move |_, ()| tx.send(Instant::now()).unwrap(), ());

	let started = Instant::now();
	assert!(timers.reset(&handle, Duration::from_millis(120)));
	let fired_at = recv(&mut rx).await;
	assert!(fired_at.duration_since(started) >= Duration::from_millis(120));
	assert!(!timers.reset(&handle, Duration::from_millis(10)));
}

#[tokio::test]
async fn panicking_callback_keeps_driver_alive() {
	let timers: TimerManager<u32> = TimerManager::new();
	let (tx, mut rx) = mpsc::unbounded_channel();
	timers.once(Duration::from_millis(5), |_, _| panic!("timer callback blew up"), 0);
	timers.once(Duration::from_millis(30), move |_, ctx| tx.send(ctx).unwrap(), 1);

	assert_eq!(recv(&mut rx).await, 1);
}

#[tokio::test]
async fn foreign_handle_is_rejected() {
	let a: TimerManager<()> = TimerManager::new();
	let b: TimerManager<()> = TimerManager::new();
	let handle = a.once(Duration::from_secs(60), |_, ()| {}, ());
	// Same id space, different manager.
	b.once(Duration::from_secs(60), |_, ()| {}, ());
	assert!(!b.cancel(&handle));
	assert_eq!(b.len(), 1);
	assert!(a.cancel(&handle));
}

#[tokio::test]
async fn close_discards_pending() {
	let timers: TimerManager<()> = TimerManager::new();
	let fired = Arc::new(AtomicUsize::new(0));
	{
		let fired = Arc::clone(&fired);
		timers.once(
			Duration::from_millis(10),
			move |_, ()| {
				fired.fetch_add(1, Ordering::SeqCst);
			},
			(),
		);
	}
	timers.close();
	assert!(timers.is_empty());

	let late = timers.once(Duration::from_millis(1), |_, ()| {}, ());
	assert!(!timers.cancel(&late));

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn global_manager_runs_outside_a_runtime() {
	let (tx, rx) = std::sync::mpsc::channel();
	global().once(Duration::from_millis(5), move |_, ()| tx.send(()).unwrap(), ());
	rx.recv_timeout(WAIT).expect("global timer did not fire");
}
