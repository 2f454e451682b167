use std::net::SocketAddr;

use thiserror::Error;

/// Every variant that originates from an I/O or protocol failure on a
/// pooled connection is raised only after the owning
/// [`crate::connection::Connection`] has already been torn down.
#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to resolve {host}:{port}")]
	ResolveFailed { host: String, port: u16 },

	#[error("redirect loop detected at {0}")]
	RedirectLoop(String),

	#[error("too many redirections (> {0})")]
	TooManyRedirections(usize),

	#[error("connection is stale")]
	ConnectionStale,

	#[error("unknown proxy scheme: {0}")]
	UnknownProxyScheme(String),

	#[error("failed to connect to {0}: {1}")]
	ConnectFailed(SocketAddr, #[source] std::io::Error),

	#[error("proxy protocol error: {0}")]
	ProxyProtocolError(String),

	#[error("protocol error: {0}")]
	ProtocolError(String),

	#[error("proxy authentication failed")]
	ProxyAuthFailed,

	#[error("SOCKS5 error {status:#04x}: {message}")]
	Socks5Error { status: u8, message: String },

	#[error("request timed out")]
	Timeout,

	#[error("malformed proxy URL: {0}")]
	InvalidProxyUrl(String),

	#[error("malformed URL: {0}")]
	InvalidUrl(#[from] url::ParseError),

	#[error(transparent)]
	Http(#[from] http::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
