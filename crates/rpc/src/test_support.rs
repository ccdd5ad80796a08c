use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::protocol::Channel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Payload {
	Hello { hello: String },
	World { world: String },
}

/// Captures everything sent through it.
#[derive(Default)]
pub(crate) struct Recorder {
	pub requests: Mutex<Vec<Bytes>>,
	pub responses: Mutex<Vec<Bytes>>,
	pub broken: AtomicBool,
}

impl Recorder {
	pub fn broken() -> Self {
		let recorder = Self::default();
		recorder.broken.store(true, Ordering::SeqCst);
		recorder
	}

	fn push(&self, sink: &Mutex<Vec<Bytes>>, msg: Bytes) -> Result<(), TransportError> {
		if self.broken.load(Ordering::SeqCst) {
			return Err(TransportError::closed());
		}
		sink.lock().push(msg);
		Ok(())
	}
}

impl Channel for Recorder {
	fn send_request(&self, msg: Bytes) -> Result<(), TransportError> {
		self.push(&self.requests, msg)
	}

	fn send_response(&self, msg: Bytes) -> Result<(), TransportError> {
		self.push(&self.responses, msg)
	}

	fn name(&self) -> &str {
		"recorder"
	}
}
