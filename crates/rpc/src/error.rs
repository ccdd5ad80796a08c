//! Error types for calls, codecs, transports and method registration.

use std::fmt;

use thiserror::Error;

/// Discriminant of an [`RpcMessage`](crate::RpcMessage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
	/// A call or post issued by a client.
	Request,
	/// A reply produced by a server.
	Response,
}

impl fmt::Display for MessageKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Request => f.write_str("request"),
			Self::Response => f.write_str("response"),
		}
	}
}

/// Failure to encode or decode a message.
#[derive(Debug, Error)]
pub enum CodecError {
	/// Serialization backend error.
	#[error("postcard: {0}")]
	Postcard(#[from] postcard::Error),
	/// Structurally valid input with invalid content.
	#[error("{0}")]
	Invalid(String),
}

/// Failure reported by a [`Channel`](crate::Channel) while sending.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
	message: String,
	#[source]
	source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
	/// Creates an error with a message and no underlying cause.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: None,
		}
	}

	/// Creates an error wrapping an underlying cause.
	pub fn with_source(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
		Self {
			message: message.into(),
			source: Some(Box::new(source)),
		}
	}

	/// The channel was closed before the message could be sent.
	pub fn closed() -> Self {
		Self::new("channel closed")
	}
}

impl From<std::io::Error> for TransportError {
	fn from(err: std::io::Error) -> Self {
		Self::with_source("i/o error", err)
	}
}

/// Errors surfaced by the RPC client and server.
#[derive(Debug, Error)]
pub enum RpcError {
	/// No response arrived before the call's timer fired.
	#[error("rpc call timeout")]
	Timeout,
	/// The outgoing message could not be encoded.
	#[error("encode error: {0}")]
	Encode(#[source] CodecError),
	/// An incoming message (or just its payload) could not be decoded.
	#[error("decode error: {0}")]
	Decode(#[source] CodecError),
	/// The channel refused the message.
	#[error("send on {channel} failed: {source}")]
	Transport {
		/// Name of the channel that failed.
		channel: String,
		/// Error reported by the channel.
		#[source]
		source: TransportError,
	},
	/// Error reported by the remote handler. Displays the remote text verbatim.
	#[error("{0}")]
	Remote(String),
	/// A message of the wrong kind reached a client or server.
	#[error("unexpected {got} message")]
	UnexpectedMessage {
		/// Kind that was received.
		got: MessageKind,
	},
	/// The call's callback was dropped before it could run.
	#[error("rpc call abandoned")]
	Cancelled,
}

impl RpcError {
	/// Builds an application error carried back to the caller as text.
	pub fn remote(message: impl fmt::Display) -> Self {
		Self::Remote(message.to_string())
	}

	/// Returns `true` for [`RpcError::Timeout`].
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout)
	}
}

/// Method registration failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
	/// A handler is already registered under this name.
	#[error("duplicate method: {0}")]
	Duplicate(String),
}

/// Configuration parse or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
	/// A field holds a value outside its allowed range.
	#[error("invalid value for {field}: {reason}")]
	Invalid {
		/// Field name.
		field: &'static str,
		/// What is wrong with it.
		reason: &'static str,
	},
}

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;
