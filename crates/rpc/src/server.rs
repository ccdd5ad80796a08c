//! Serving side: method registry and request dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use callwire_worker::protect;
use parking_lot::RwLock;

use crate::error::{MessageKind, RegisterError, Result, RpcError};
use crate::message::{RpcMessage, RpcResponse};
use crate::protocol::{Channel, Decoder, Encoder};

type Handler<P> = Arc<dyn Fn(Replyer<P>, P) + Send + Sync>;

/// Dispatches inbound requests to registered method handlers.
///
/// Handlers run on the thread that calls
/// [`on_rpc_message`](Self::on_rpc_message); long-running work should be
/// moved elsewhere, keeping the [`Replyer`] to answer later.
pub struct Server<P> {
	encoder: Arc<dyn Encoder<P>>,
	decoder: Arc<dyn Decoder<P>>,
	methods: RwLock<HashMap<String, Handler<P>>>,
}

impl<P> std::fmt::Debug for Server<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut names: Vec<_> = self.methods.read().keys().cloned().collect();
		names.sort_unstable();
		f.debug_struct("Server").field("methods", &names).finish_non_exhaustive()
	}
}

impl<P: Send + 'static> Server<P> {
	/// Creates a server with an empty registry.
	pub fn new(encoder: impl Encoder<P>, decoder: impl Decoder<P>) -> Self {
		Self {
			encoder: Arc::new(encoder),
			decoder: Arc::new(decoder),
			methods: RwLock::new(HashMap::new()),
		}
	}

	/// Registers `handler` under `name`.
	pub fn register_method(&self, name: impl Into<String>, handler: impl Fn(Replyer<P>, P) + Send + Sync + 'static) -> std::result::Result<(), RegisterError> {
		let name = name.into();
		let mut methods = self.methods.write();
		if methods.contains_key(&name) {
			return Err(RegisterError::Duplicate(name));
		}
		tracing::debug!(method = %name, "rpc.server.register");
		methods.insert(name, Arc::new(handler));
		Ok(())
	}

	/// Removes the handler for `name`, if any.
	pub fn unregister_method(&self, name: &str) -> bool {
		self.methods.write().remove(name).is_some()
	}

	/// Returns `true` if `name` has a handler.
	pub fn has_method(&self, name: &str) -> bool {
		self.methods.read().contains_key(name)
	}

	/// Feeds one inbound message from `channel`.
	///
	/// A request for an unknown method is answered with
	/// `invalid method:<name>` when the caller waits for a response, and
	/// dropped otherwise. A panicking handler is logged; its caller will time
	/// out.
	pub fn on_rpc_message(&self, channel: &Arc<dyn Channel>, raw: Bytes) -> Result<()> {
		let msg = self.decoder.decode(raw).map_err(|err| {
			tracing::warn!(channel = channel.name(), error = %err, "rpc.server.decode_failed");
			RpcError::Decode(err)
		})?;

		let req = match msg {
			RpcMessage::Request(req) => req,
			RpcMessage::Response(resp) => {
				tracing::error!(channel = channel.name(), seq = resp.seq, "rpc.server.unexpected_response");
				return Err(RpcError::UnexpectedMessage { got: MessageKind::Response });
			}
		};

		let replyer = Replyer {
			channel: Arc::clone(channel),
			encoder: Arc::clone(&self.encoder),
			seq: req.seq,
			need_resp: req.need_resp,
		};

		// Clone out so the handler runs without the registry lock.
		let handler = self.methods.read().get(&req.method).cloned();
		let Some(handler) = handler else {
			tracing::warn!(channel = channel.name(), seq = req.seq, method = %req.method, "rpc.server.unknown_method");
			return replyer.reply(Err(RpcError::Remote(format!("invalid method:{}", req.method))));
		};

		tracing::trace!(seq = req.seq, method = %req.method, "rpc.server.dispatch");
		protect("rpc.server.handler", move || handler(replyer, req.arg));
		Ok(())
	}
}

/// Answers one request. Consumed by [`reply`](Self::reply).
pub struct Replyer<P> {
	channel: Arc<dyn Channel>,
	encoder: Arc<dyn Encoder<P>>,
	seq: u64,
	need_resp: bool,
}

impl<P> std::fmt::Debug for Replyer<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Replyer")
			.field("channel", &self.channel.name())
			.field("seq", &self.seq)
			.field("need_resp", &self.need_resp)
			.finish()
	}
}

impl<P: 'static> Replyer<P> {
	/// Sequence number of the request being answered.
	pub fn seq(&self) -> u64 {
		self.seq
	}

	/// Whether the caller waits for a response.
	pub fn need_resp(&self) -> bool {
		self.need_resp
	}

	/// Name of the channel the request arrived on.
	pub fn channel_name(&self) -> &str {
		self.channel.name()
	}

	/// Sends the handler's outcome back. Does nothing for posts.
	///
	/// Errors travel as their display text and surface on the caller as
	/// [`RpcError::Remote`].
	pub fn reply(self, result: Result<P>) -> Result<()> {
		if !self.need_resp {
			return Ok(());
		}
		let msg = RpcMessage::Response(RpcResponse { seq: self.seq, result });
		let raw = self.encoder.encode(&msg).map_err(|err| {
			tracing::warn!(seq = self.seq, error = %err, "rpc.server.encode_failed");
			RpcError::Encode(err)
		})?;
		self.channel.send_response(raw).map_err(|source| {
			tracing::warn!(channel = self.channel.name(), seq = self.seq, error = %source, "rpc.server.send_failed");
			RpcError::Transport {
				channel: self.channel.name().to_owned(),
				source,
			}
		})
	}

	/// Replies with `ret`.
	pub fn ok(self, ret: P) -> Result<()> {
		self.reply(Ok(ret))
	}

	/// Replies with an application error carrying `message`.
	pub fn err(self, message: impl std::fmt::Display) -> Result<()> {
		self.reply(Err(RpcError::remote(message)))
	}
}
