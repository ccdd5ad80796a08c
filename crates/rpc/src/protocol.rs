//! Capabilities the RPC layer needs from its environment.
//!
//! Framing, serialization and transport are supplied by the embedding
//! application. The client and server only see opaque [`Bytes`] moving through
//! a [`Channel`], and an [`Encoder`]/[`Decoder`] pair that maps them to
//! [`RpcMessage`]s.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{CodecError, TransportError};
use crate::message::RpcMessage;

/// Serializes messages into transport payloads.
pub trait Encoder<P>: Send + Sync + 'static {
	/// Encodes `msg`. Response errors are carried as their display text.
	fn encode(&self, msg: &RpcMessage<P>) -> Result<Bytes, CodecError>;
}

/// Parses transport payloads back into messages.
pub trait Decoder<P>: Send + Sync + 'static {
	/// Decodes `raw`.
	///
	/// A response whose envelope is valid but whose payload is not should be
	/// returned as a response carrying [`RpcError::Decode`](crate::RpcError::Decode),
	/// so the waiting call still resolves.
	fn decode(&self, raw: Bytes) -> Result<RpcMessage<P>, CodecError>;
}

/// A duplex byte transport.
///
/// Implementations must be safe to call from several threads at once.
pub trait Channel: Send + Sync {
	/// Sends an encoded request to the peer's server side.
	fn send_request(&self, msg: Bytes) -> Result<(), TransportError>;

	/// Sends an encoded response to the peer's client side.
	fn send_response(&self, msg: Bytes) -> Result<(), TransportError>;

	/// Name used in logs and errors.
	fn name(&self) -> &str;
}

impl<T: Channel + ?Sized> Channel for Arc<T> {
	fn send_request(&self, msg: Bytes) -> Result<(), TransportError> {
		(**self).send_request(msg)
	}

	fn send_response(&self, msg: Bytes) -> Result<(), TransportError> {
		(**self).send_response(msg)
	}

	fn name(&self) -> &str {
		(**self).name()
	}
}
