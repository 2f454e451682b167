use std::io;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;

use crate::config::CONN_READ_TIMEOUT;
use crate::endpoint::EndpointKey;
use crate::error::{Error, Result};
use crate::pool::PoolInner;

/// Either half of the duplex stream a [`Connection`] drives. TLS is
/// layered after the fact (direct-TLS at construction time, or after a
/// CONNECT/SOCKS5 tunnel), so a connection transparently upgrades from
/// `Plain` to `Tls` in place.
pub(crate) enum Socket {
	Plain(TcpStream),
	Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for Socket {
	fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		match self.get_mut() {
			Socket::Plain(s) => Pin::new(s).poll_read(cx, buf),
			Socket::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
		}
	}
}

impl AsyncWrite for Socket {
	fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		match self.get_mut() {
			Socket::Plain(s) => Pin::new(s).poll_write(cx, buf),
			Socket::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
		}
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		match self.get_mut() {
			Socket::Plain(s) => Pin::new(s).poll_flush(cx),
			Socket::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
		}
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		match self.get_mut() {
			Socket::Plain(s) => Pin::new(s).poll_shutdown(cx),
			Socket::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
		}
	}
}

/// How much to read in one [`Connection::read`] call.
#[derive(Clone, Copy, Debug)]
pub enum ReadSize {
	Exact(usize),
	ToEof,
}

/// A single TCP (optionally TLS) duplex stream, plus the bookkeeping the
/// pool and proxy engine need.
///
/// Lifecycle: constructed by the pool (not yet dialed) -> `connect()` ->
/// optionally tunneled (SOCKS5/TLS) -> handed to a request as in-use ->
/// `close()` either recycles it back to the pool or tears it down for
/// good. A closed connection is never reopened.
pub struct Connection {
	pub key: EndpointKey,
	pub peer: std::net::SocketAddr,
	socket: Option<Socket>,
	direct_tls: bool,
	pub tls_established: bool,
	pub socks_established: bool,
	pub recycle_allowed: bool,
	last_activity: Instant,
	keep_alive_ceiling: Duration,
	read_timeout: Duration,
	eof: bool,
	pool: Weak<PoolInner>,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("key", &self.key)
			.field("peer", &self.peer)
			.field("tls_established", &self.tls_established)
			.field("socks_established", &self.socks_established)
			.field("recycle_allowed", &self.recycle_allowed)
			.finish()
	}
}

impl Connection {
	pub(crate) fn new(
		key: EndpointKey,
		peer: std::net::SocketAddr,
		direct_tls: bool,
		recycle_allowed: bool,
		keep_alive_ceiling: Duration,
		pool: Weak<PoolInner>,
	) -> Self {
		Connection {
			key,
			peer,
			socket: None,
			direct_tls,
			tls_established: false,
			socks_established: false,
			recycle_allowed,
			last_activity: Instant::now(),
			keep_alive_ceiling,
			read_timeout: CONN_READ_TIMEOUT,
			eof: false,
			pool,
		}
	}

	fn watch(&mut self) {
		self.last_activity = Instant::now();
	}

	pub fn is_timeout(&self) -> bool {
		self.last_activity.elapsed() > self.keep_alive_ceiling
	}

	/// A connection whose read half has seen EOF, or which has no socket
	/// at all, is stale.
	pub fn stale(&self) -> bool {
		self.socket.is_none() || self.eof
	}

	pub fn closed(&self) -> bool {
		self.socket.is_none()
	}

	/// Dial the TCP endpoint (and perform TLS immediately if this
	/// connection was constructed with `direct_tls`). Closes and
	/// surfaces the error on failure.
	pub async fn connect(&mut self) -> Result<()> {
		debug!(key = %self.key, peer = %self.peer, "connecting");
		let stream = match TcpStream::connect(self.peer).await {
			Ok(s) => s,
			Err(e) => {
				self.close();
				return Err(Error::ConnectFailed(self.peer, e));
			},
		};
		let _ = stream.set_nodelay(true);
		self.socket = Some(Socket::Plain(stream));
		self.watch();

		if self.direct_tls {
			let host = match &self.key {
				EndpointKey::DirectTls { host, .. } => host.to_string(),
				_ => unreachable!("direct_tls set only for EndpointKey::DirectTls"),
			};
			if let Err(e) = self.ssl_handshake(&host).await {
				self.close();
				return Err(e);
			}
		}
		Ok(())
	}

	/// Wrap the already-connected raw socket in TLS with SNI = `server_name`.
	/// Used for HTTPS-over-HTTP-proxy after the CONNECT response and for
	/// SOCKS5+TLS.
	pub async fn ssl_handshake(&mut self, server_name: &str) -> Result<()> {
		debug!(key = %self.key, server_name, "tls handshake");
		let plain = match self.socket.take() {
			Some(Socket::Plain(s)) => s,
			Some(other) => {
				self.socket = Some(other);
				return Err(Error::Other(anyhow::anyhow!("tls handshake on non-plain socket")));
			},
			None => return Err(Error::ConnectionStale),
		};

		let connector = crate::client::tls::connector();
		let name = crate::client::tls::server_name(server_name)
			.map_err(|e| Error::Other(anyhow::anyhow!(e)))?;

		let tls = match connector.connect(name, plain).await {
			Ok(t) => t,
			Err(e) => {
				self.eof = true;
				return Err(Error::Io(e));
			},
		};
		self.socket = Some(Socket::Tls(Box::new(tls)));
		self.tls_established = true;
		self.watch();
		Ok(())
	}

	/// Write bytes. Must not be called on a closed/stale connection.
	pub async fn send(&mut self, data: &[u8]) -> Result<()> {
		trace!(key = %self.key, bytes = data.len(), "send");
		self.watch();
		if self.stale() {
			return Err(Error::ConnectionStale);
		}
		let socket = self.socket.as_mut().expect("checked not stale above");
		if let Err(e) = socket.write_all(data).await {
			self.close_hard();
			return Err(Error::Io(e));
		}
		Ok(())
	}

	/// Read exactly `n` bytes, or to EOF when `size` is [`ReadSize::ToEof`].
	/// Bounded by `CONN_READ_TIMEOUT`; fails with [`Error::ConnectionStale`]
	/// if the stream already signaled EOF at entry.
	pub async fn read(&mut self, size: ReadSize) -> Result<Vec<u8>> {
		if self.stale() {
			return Err(Error::ConnectionStale);
		}
		self.watch();
		let timeout = self.read_timeout;
		let result = tokio::time::timeout(timeout, self.read_inner(size)).await;
		match result {
			Ok(Ok(buf)) => Ok(buf),
			Ok(Err(e)) => {
				self.close_hard();
				Err(e)
			},
			Err(_) => {
				self.close_hard();
				Err(Error::Timeout)
			},
		}
	}

	async fn read_inner(&mut self, size: ReadSize) -> Result<Vec<u8>> {
		use tokio::io::AsyncReadExt;
		let socket = self.socket.as_mut().expect("checked not stale above");
		match size {
			ReadSize::Exact(n) => {
				let mut buf = vec![0u8; n];
				let mut filled = 0;
				while filled < n {
					let read = socket.read(&mut buf[filled..]).await?;
					if read == 0 {
						self.eof = true;
						return Err(Error::Io(io::Error::new(
							io::ErrorKind::UnexpectedEof,
							"connection closed before N bytes were read",
						)));
					}
					filled += read;
				}
				Ok(buf)
			},
			ReadSize::ToEof => {
				let mut buf = Vec::new();
				socket.read_to_end(&mut buf).await?;
				self.eof = true;
				Ok(buf)
			},
		}
	}

	/// Read up to and including `\n`. Same timeout/staleness rules as
	/// [`Connection::read`].
	pub async fn readline(&mut self) -> Result<Vec<u8>> {
		if self.stale() {
			return Err(Error::ConnectionStale);
		}
		self.watch();
		let timeout = self.read_timeout;
		match tokio::time::timeout(timeout, self.readline_inner()).await {
			Ok(Ok(line)) => Ok(line),
			Ok(Err(e)) => {
				self.close_hard();
				Err(e)
			},
			Err(_) => {
				self.close_hard();
				Err(Error::Timeout)
			},
		}
	}

	async fn readline_inner(&mut self) -> Result<Vec<u8>> {
		use tokio::io::AsyncReadExt;
		let socket = self.socket.as_mut().expect("checked not stale above");
		let mut line = Vec::new();
		let mut byte = [0u8; 1];
		loop {
			let n = socket.read(&mut byte).await?;
			if n == 0 {
				self.eof = true;
				break;
			}
			line.push(byte[0]);
			if byte[0] == b'\n' {
				break;
			}
		}
		Ok(line)
	}

	/// Tear down the stream unconditionally, without ever offering it
	/// back to the pool. Used on any I/O or protocol error: a connection
	/// that faulted mid-exchange can't be trusted to recycle cleanly.
	pub fn close_hard(&mut self) {
		// Dropping the socket closes the fd; there is no async shutdown
		// path here because `close_hard` runs from sync error contexts.
		self.socket = None;
		self.recycle_allowed = false;
	}

	/// Idempotent. If still recycleable, not stale, and not over the
	/// keep-alive ceiling, offers the connection back to the owning pool;
	/// otherwise tears the stream down for good.
	pub fn close(&mut self) {
		if self.closed() {
			return;
		}
		if self.recycle_allowed && !self.stale() && !self.is_timeout() {
			if let Some(pool) = self.pool.upgrade() {
				let key = self.key.clone();
				let recyclable = self.take_for_recycle();
				match pool.try_store(key, recyclable) {
					Ok(()) => return,
					Err(mut returned) => {
						returned.close_hard();
						return;
					},
				}
			}
		}
		self.close_hard();
	}

	/// Split this connection's recyclable state out into a standalone
	/// value the pool can own, leaving `self` logically closed. Only
	/// called from `close()` once we've already decided to recycle.
	fn take_for_recycle(&mut self) -> Connection {
		Connection {
			key: self.key.clone(),
			peer: self.peer,
			socket: self.socket.take(),
			direct_tls: self.direct_tls,
			tls_established: self.tls_established,
			socks_established: self.socks_established,
			recycle_allowed: self.recycle_allowed,
			last_activity: self.last_activity,
			keep_alive_ceiling: self.keep_alive_ceiling,
			read_timeout: self.read_timeout,
			eof: self.eof,
			pool: self.pool.clone(),
		}
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		// Dropping without going through `close()` (e.g. a panic unwind)
		// must not leak the socket or silently recycle half-used state.
		self.socket = None;
	}
}

use tracing::{debug, trace};
