//! Panic containment for user-supplied callbacks.
//!
//! Timer callbacks, RPC response callbacks and event-queue tasks all run user
//! code on shared drivers. A panic there must be logged and swallowed so one bad
//! callback cannot take the driver down with it.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use thiserror::Error;

/// A panic caught by [`protect_call`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("callback panicked: {message}")]
pub struct PanicError {
	message: String,
}

impl PanicError {
	/// Text extracted from the panic payload.
	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Extracts a human-readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		return (*s).to_string();
	}
	if let Some(s) = payload.downcast_ref::<String>() {
		return s.clone();
	}
	"<non-string panic payload>".to_string()
}

/// Runs `f`, converting a panic into [`PanicError`].
pub fn protect_call<R>(f: impl FnOnce() -> R) -> Result<R, PanicError> {
	catch_unwind(AssertUnwindSafe(f)).map_err(|payload| PanicError {
		message: panic_message(payload.as_ref()),
	})
}

/// Runs `f` and logs a panic under `label`. Returns `false` if it panicked.
pub fn protect(label: &'static str, f: impl FnOnce()) -> bool {
	match protect_call(f) {
		Ok(()) => true,
		Err(err) => {
			tracing::error!(panic = %err.message(), "{label} panicked");
			false
		}
	}
}
