//! In-memory message model shared by every codec.

use crate::error::{MessageKind, RpcError};

/// A decoded RPC message.
#[derive(Debug)]
pub enum RpcMessage<P> {
	/// Call or post from a client.
	Request(RpcRequest<P>),
	/// Reply to an earlier request.
	Response(RpcResponse<P>),
}

impl<P> RpcMessage<P> {
	/// Sequence number correlating a request with its response.
	pub fn seq(&self) -> u64 {
		match self {
			Self::Request(req) => req.seq,
			Self::Response(resp) => resp.seq,
		}
	}

	/// Which variant this is.
	pub fn kind(&self) -> MessageKind {
		match self {
			Self::Request(_) => MessageKind::Request,
			Self::Response(_) => MessageKind::Response,
		}
	}
}

/// A call (`need_resp == true`) or a fire-and-forget post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest<P> {
	/// Process-unique sequence number assigned by the client.
	pub seq: u64,
	/// Method name looked up in the server's registry.
	pub method: String,
	/// Method argument.
	pub arg: P,
	/// Whether the caller waits for a response.
	pub need_resp: bool,
}

/// Outcome of a request, keyed by the request's `seq`.
#[derive(Debug)]
pub struct RpcResponse<P> {
	/// Sequence number of the request being answered.
	pub seq: u64,
	/// Handler result, or the error to report to the caller.
	pub result: Result<P, RpcError>,
}

impl<P> From<RpcRequest<P>> for RpcMessage<P> {
	fn from(req: RpcRequest<P>) -> Self {
		Self::Request(req)
	}
}

impl<P> From<RpcResponse<P>> for RpcMessage<P> {
	fn from(resp: RpcResponse<P>) -> Self {
		Self::Response(resp)
	}
}
