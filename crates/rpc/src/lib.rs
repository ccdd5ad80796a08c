//! Transport-agnostic request/response correlation.
//!
//! A [`Client`] stamps each outgoing request with a process-unique `seq`, parks
//! the caller's callback in a sharded [`RpcEnv`] timer, and resolves it when a
//! matching response is fed back or the timer fires, whichever comes first.
//! A [`Server`] maps method names to handlers and answers through a
//! [`Replyer`].
//!
//! Bytes move through a caller-supplied [`Channel`]. Serialization is
//! pluggable through [`Encoder`]/[`Decoder`]; [`PostcardCodec`] covers any
//! serde payload.

#![warn(missing_docs)]

mod client;
pub mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod message;
pub mod protocol;
mod server;

pub use client::Client;
pub use codec::PostcardCodec;
pub use config::RpcConfig;
pub use env::{RpcEnv, SeqCounter};
pub use error::{CodecError, ConfigError, MessageKind, RegisterError, Result, RpcError, TransportError};
pub use message::{RpcMessage, RpcRequest, RpcResponse};
pub use protocol::{Channel, Decoder, Encoder};
pub use server::{Replyer, Server};

#[cfg(test)]
mod test_support;
