//! Calling side: issues requests and correlates responses by `seq`.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use callwire_worker::{EventQueue, TimerHandle, protect};
use tokio::sync::oneshot;

use crate::env::RpcEnv;
use crate::error::{CodecError, MessageKind, Result, RpcError};
use crate::message::{RpcMessage, RpcRequest};
use crate::protocol::{Channel, Decoder, Encoder};

type Outcome = std::result::Result<Box<dyn Any + Send>, RpcError>;

/// A call waiting for its response or timeout.
///
/// Lives in an [`RpcEnv`] timer shard until the response path or the timer
/// takes it out. Payload types are erased so clients of different payload
/// types can share one environment.
pub(crate) struct PendingCall {
	seq: u64,
	deliver: Box<dyn FnOnce(Outcome) + Send>,
}

impl PendingCall {
	fn resolve(self, outcome: Outcome) {
		(self.deliver)(outcome)
	}
}

/// Counts a call as pending from creation until its callback is released.
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
	fn new(counter: &Arc<AtomicUsize>) -> Self {
		counter.fetch_add(1, Ordering::AcqRel);
		Self(Arc::clone(counter))
	}
}

impl Drop for PendingGuard {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::AcqRel);
	}
}

/// Issues calls and posts over caller-supplied channels.
///
/// Responses must be fed back through [`on_rpc_message`](Self::on_rpc_message).
/// Each call's callback runs exactly once: with the response, or with
/// [`RpcError::Timeout`]. With an event queue attached the callback runs on
/// that queue's loop, otherwise inline on whichever thread resolved the call.
pub struct Client<P> {
	encoder: Arc<dyn Encoder<P>>,
	decoder: Arc<dyn Decoder<P>>,
	queue: Option<EventQueue>,
	env: Arc<RpcEnv>,
	pending: Arc<AtomicUsize>,
}

impl<P> std::fmt::Debug for Client<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Client")
			.field("queue", &self.queue.is_some())
			.field("pending", &self.pending.load(Ordering::Acquire))
			.finish_non_exhaustive()
	}
}

impl<P: Send + 'static> Client<P> {
	/// Creates a client on the process-wide [`RpcEnv`].
	pub fn new(encoder: impl Encoder<P>, decoder: impl Decoder<P>) -> Self {
		Self {
			encoder: Arc::new(encoder),
			decoder: Arc::new(decoder),
			queue: None,
			env: RpcEnv::global(),
			pending: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Runs callbacks on `queue` instead of inline.
	#[must_use]
	pub fn with_event_queue(mut self, queue: EventQueue) -> Self {
		self.queue = Some(queue);
		self
	}

	/// Uses `env` for sequence numbers and timeouts instead of the global one.
	#[must_use]
	pub fn with_env(mut self, env: Arc<RpcEnv>) -> Self {
		self.env = env;
		self
	}

	/// Environment this client draws from.
	pub fn env(&self) -> &Arc<RpcEnv> {
		&self.env
	}

	/// Calls that have been issued but whose callback has not been released.
	///
	/// A call is counted from just before its request is sent. If the send
	/// fails the call is withdrawn and the count drops back, so a concurrent
	/// reader may briefly observe it.
	pub fn pending_count(&self) -> usize {
		self.pending.load(Ordering::Acquire)
	}

	/// Sends a request that expects no response.
	pub fn post(&self, channel: &dyn Channel, method: &str, arg: P) -> Result<()> {
		let seq = self.env.next_seq();
		let raw = self.encode_request(seq, method, arg, false)?;
		tracing::trace!(seq, method, channel = channel.name(), "rpc.client.post");
		send(channel, raw)
	}

	/// Sends a call and arranges for `callback` to receive its outcome.
	///
	/// If sending fails the error is returned and the call is withdrawn;
	/// `callback` is then never invoked unless the timeout had already fired.
	pub fn async_call(
		&self,
		channel: &dyn Channel,
		method: &str,
		arg: P,
		timeout: Duration,
		callback: impl FnOnce(Result<P>) + Send + 'static,
	) -> Result<()> {
		let seq = self.env.next_seq();
		let raw = self.encode_request(seq, method, arg, true)?;

		let pending = self.pending_call(seq, callback);
		let shard = self.env.shard(seq);
		shard.once_with_index(timeout, on_timeout, pending, seq);
		tracing::trace!(seq, method, channel = channel.name(), ?timeout, "rpc.client.call");

		if let Err(err) = send(channel, raw) {
			if shard.cancel_by_index(seq).is_some() {
				tracing::debug!(seq, "rpc.client.call.withdrawn");
			}
			return Err(err);
		}
		Ok(())
	}

	/// Sends a call and waits for its outcome.
	pub async fn call(&self, channel: &dyn Channel, method: &str, arg: P, timeout: Duration) -> Result<P> {
		let (tx, rx) = oneshot::channel();
		self.async_call(channel, method, arg, timeout, move |result| {
			let _ = tx.send(result);
		})?;
		rx.await.unwrap_or(Err(RpcError::Cancelled))
	}

	/// [`call`](Self::call) with the environment's configured timeout.
	pub async fn call_default(&self, channel: &dyn Channel, method: &str, arg: P) -> Result<P> {
		let timeout = self.env.config().call_timeout();
		self.call(channel, method, arg, timeout).await
	}

	/// Feeds one inbound message from the transport.
	///
	/// Responses with no pending call (already timed out, or duplicated) are
	/// dropped. Requests are rejected since this side only issues calls.
	pub fn on_rpc_message(&self, raw: Bytes) -> Result<()> {
		let msg = self.decoder.decode(raw).map_err(|err| {
			tracing::warn!(error = %err, "rpc.client.decode_failed");
			RpcError::Decode(err)
		})?;

		let resp = match msg {
			RpcMessage::Response(resp) => resp,
			RpcMessage::Request(req) => {
				tracing::error!(seq = req.seq, method = %req.method, "rpc.client.unexpected_request");
				return Err(RpcError::UnexpectedMessage { got: MessageKind::Request });
			}
		};

		match self.env.shard(resp.seq).cancel_by_index(resp.seq) {
			Some(pending) => {
				tracing::trace!(seq = resp.seq, ok = resp.result.is_ok(), "rpc.client.response");
				pending.resolve(resp.result.map(|ret| Box::new(ret) as Box<dyn Any + Send>));
			}
			None => tracing::debug!(seq = resp.seq, "rpc.client.response.unmatched"),
		}
		Ok(())
	}

	fn encode_request(&self, seq: u64, method: &str, arg: P, need_resp: bool) -> Result<Bytes> {
		let msg = RpcMessage::Request(RpcRequest {
			seq,
			method: method.to_owned(),
			arg,
			need_resp,
		});
		self.encoder.encode(&msg).map_err(|err| {
			tracing::warn!(seq, method, error = %err, "rpc.client.encode_failed");
			RpcError::Encode(err)
		})
	}

	fn pending_call(&self, seq: u64, callback: impl FnOnce(Result<P>) + Send + 'static) -> PendingCall {
		let guard = PendingGuard::new(&self.pending);
		let queue = self.queue.clone();
		let deliver = move |outcome: Outcome| {
			let result = outcome.and_then(|ret| match ret.downcast::<P>() {
				Ok(ret) => Ok(*ret),
				Err(_) => Err(RpcError::Decode(CodecError::Invalid(format!(
					"response {seq} does not carry a {}",
					std::any::type_name::<P>()
				)))),
			});
			let task = move || {
				drop(guard);
				callback(result);
			};
			match queue {
				Some(queue) => {
					if queue.post_no_wait(task).is_err() {
						tracing::warn!(seq, "rpc.client.callback.dropped");
					}
				}
				None => {
					protect("rpc.client.callback", task);
				}
			}
		};
		PendingCall {
			seq,
			deliver: Box::new(deliver),
		}
	}
}

fn on_timeout(handle: &TimerHandle, pending: PendingCall) {
	tracing::info!(seq = pending.seq, timer = handle.id(), "rpc.client.timeout");
	pending.resolve(Err(RpcError::Timeout));
}

fn send(channel: &dyn Channel, raw: Bytes) -> Result<()> {
	channel.send_request(raw).map_err(|source| {
		tracing::warn!(channel = channel.name(), error = %source, "rpc.client.send_failed");
		RpcError::Transport {
			channel: channel.name().to_owned(),
			source,
		}
	})
}
