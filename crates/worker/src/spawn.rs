use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

/// Handle to the process-wide runtime, built on first use.
///
/// Long-lived drivers shared by the whole process (the RPC timer shards) run
/// here so they outlive whichever runtime happened to construct them.
pub fn global_handle() -> Handle {
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("callwire-global")
			.build()
			.expect("failed to build callwire global tokio runtime")
	});
	runtime.handle().clone()
}

/// Handle to the current runtime, falling back to [`global_handle`].
pub fn runtime_handle() -> Handle {
	if let Ok(handle) = Handle::try_current() {
		return handle;
	}
	global_handle()
}

/// Spawns a named task on `handle`.
pub(crate) fn spawn_on<F>(handle: &Handle, name: &'static str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task = name, "worker.spawn");
	handle.spawn(fut)
}
