//! Postcard-based default codec.
//!
//! Each message is a postcard [`Frame`] whose payload is itself postcard
//! encoded. Keeping the payload as a nested byte string lets the decoder
//! report a bad response payload against its `seq` instead of losing the
//! whole message.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, RpcError};
use crate::message::{RpcMessage, RpcRequest, RpcResponse};
use crate::protocol::{Decoder, Encoder};

#[derive(Debug, Serialize, Deserialize)]
enum Frame {
	Request {
		seq: u64,
		method: String,
		arg: Vec<u8>,
		need_resp: bool,
	},
	Response {
		seq: u64,
		ret: Option<Vec<u8>>,
		err: Option<String>,
	},
}

/// [`Encoder`] and [`Decoder`] for any serde payload type.
pub struct PostcardCodec<P> {
	_payload: PhantomData<fn() -> P>,
}

impl<P> PostcardCodec<P> {
	/// Creates the codec.
	pub const fn new() -> Self {
		Self { _payload: PhantomData }
	}
}

impl<P> Default for PostcardCodec<P> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P> Clone for PostcardCodec<P> {
	fn clone(&self) -> Self {
		Self::new()
	}
}

impl<P> fmt::Debug for PostcardCodec<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PostcardCodec").field("payload", &std::any::type_name::<P>()).finish()
	}
}

impl<P: Serialize + 'static> Encoder<P> for PostcardCodec<P> {
	fn encode(&self, msg: &RpcMessage<P>) -> Result<Bytes, CodecError> {
		let frame = match msg {
			RpcMessage::Request(req) => Frame::Request {
				seq: req.seq,
				method: req.method.clone(),
				arg: postcard::to_stdvec(&req.arg)?,
				need_resp: req.need_resp,
			},
			RpcMessage::Response(resp) => match &resp.result {
				Ok(ret) => Frame::Response {
					seq: resp.seq,
					ret: Some(postcard::to_stdvec(ret)?),
					err: None,
				},
				Err(err) => Frame::Response {
					seq: resp.seq,
					ret: None,
					err: Some(err.to_string()),
				},
			},
		};
		Ok(Bytes::from(postcard::to_stdvec(&frame)?))
	}
}

impl<P: DeserializeOwned + 'static> Decoder<P> for PostcardCodec<P> {
	fn decode(&self, raw: Bytes) -> Result<RpcMessage<P>, CodecError> {
		let msg = match postcard::from_bytes::<Frame>(&raw)? {
			Frame::Request {
				seq,
				method,
				arg,
				need_resp,
			} => RpcMessage::Request(RpcRequest {
				seq,
				method,
				arg: postcard::from_bytes(&arg)?,
				need_resp,
			}),
			Frame::Response { seq, ret, err } => {
				let result = match (ret, err) {
					(_, Some(err)) => Err(RpcError::Remote(err)),
					(Some(ret), None) => postcard::from_bytes(&ret).map_err(|e| RpcError::Decode(e.into())),
					(None, None) => Err(RpcError::Decode(CodecError::Invalid("response carries neither a result nor an error".into()))),
				};
				RpcMessage::Response(RpcResponse { seq, result })
			}
		};
		Ok(msg)
	}
}
