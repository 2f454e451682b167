pub mod tls;

use async_compression::tokio::bufread::{DeflateDecoder, GzipDecoder, ZlibDecoder};
use tokio::io::AsyncReadExt;

use crate::connection::{Connection, ReadSize};
use crate::dns::DnsCache;
use crate::endpoint::EndpointKey;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::pool::ConnectionPool;
use crate::proxy::{self, ProxyScheme, ProxyUrl};
use crate::request::Request;
use crate::response::{find_encoding, Response};

/// Assembles the endpoint key, obtains a connection from the pool, drives
/// proxy setup on first use, and runs the request/response halves of the
/// wire protocol.
pub struct Adapter {
	pool: ConnectionPool,
	dns: DnsCache,
}

impl Adapter {
	pub fn new(pool: ConnectionPool, dns: DnsCache) -> Self {
		Adapter { pool, dns }
	}

	/// Derive the endpoint key and hand back a connected [`Connection`],
	/// performing proxy and TLS setup on a freshly dialed socket.
	pub async fn connection_for(&self, request: &Request, recycle: Option<bool>) -> Result<Connection> {
		let host = request.host()?;
		let port = request.port();
		let tls = request.is_tls();

		let (key, peer, direct_tls) = match &request.proxy {
			None => self.direct_key(&host, port, tls).await?,
			Some(proxy_url) => self.proxy_key(proxy_url, &host, port, tls).await?,
		};

		let mut conn = self.pool.acquire(key, peer, direct_tls, recycle);
		if conn.closed() {
			conn.connect().await?;
		}

		if let Some(proxy_url) = &request.proxy {
			let proxy = ProxyUrl::parse(proxy_url)?;
			let needs_socks5 = matches!(proxy.scheme, ProxyScheme::Socks5) && !conn.socks_established;
			let needs_connect_tls = matches!(proxy.scheme, ProxyScheme::Http) && tls && !conn.tls_established;
			if needs_socks5 || needs_connect_tls {
				proxy::establish(&mut conn, &proxy, &host, port, tls).await?;
			}
		}

		Ok(conn)
	}

	async fn direct_key(&self, host: &str, port: u16, tls: bool) -> Result<(EndpointKey, std::net::SocketAddr, bool)> {
		if let Ok(ip) = host.parse::<std::net::IpAddr>() {
			let peer = std::net::SocketAddr::new(ip, port);
			let key = if tls {
				EndpointKey::DirectTls { host: host.into(), port }
			} else {
				EndpointKey::DirectPlain { ip, port }
			};
			return Ok((key, peer, tls));
		}

		let peer = self.dns.get(host, port).await?;
		let key = if tls {
			// TLS keys on hostname (for SNI reuse), not the resolved IP.
			EndpointKey::DirectTls { host: host.into(), port }
		} else {
			EndpointKey::DirectPlain { ip: peer.ip(), port: peer.port() }
		};
		Ok((key, peer, tls))
	}

	async fn proxy_key(
		&self,
		proxy_url: &str,
		target_host: &str,
		target_port: u16,
		target_tls: bool,
	) -> Result<(EndpointKey, std::net::SocketAddr, bool)> {
		let proxy = ProxyUrl::parse(proxy_url)?;
		let proxy_peer = self.dns.get(&proxy.host, proxy.port).await?;

		let key = if target_tls {
			EndpointKey::HttpProxyTls {
				proxy_ip: proxy_peer.ip(),
				proxy_port: proxy_peer.port(),
				target: format!("{target_host}:{target_port}").into(),
			}
		} else {
			EndpointKey::HttpProxyPlain {
				proxy_ip: proxy_peer.ip(),
				proxy_port: proxy_peer.port(),
			}
		};

		// The tunnel to the proxy is always a plain TCP dial; TLS (if any)
		// is layered on after the CONNECT/SOCKS5 handshake completes.
		Ok((key, proxy_peer, false))
	}

	pub async fn send_request(&self, conn: &mut Connection, request: &Request) -> Result<()> {
		let (request_line, headers_block, body) = request.make_request();
		conn.send(format!("{request_line}\r\n").as_bytes()).await?;
		conn.send(format!("{headers_block}\r\n").as_bytes()).await?;
		conn.send(b"\r\n").await?;
		if let Some(data) = body {
			conn.send(&data).await?;
		}
		Ok(())
	}

	/// Read the status line, headers, and body, then decode per
	/// `Content-Encoding`/charset.
	pub async fn recv_response(&self, method: &str, conn: &mut Connection, encoding: Option<String>) -> Result<Response> {
		let head = read_head(conn).await?;
		let (status_code, headers, cookies) = parse_head(&head)?;

		let body = if method.eq_ignore_ascii_case("head") {
			Vec::new()
		} else {
			read_body(conn, &headers).await?
		};

		let decoded = decode_content_encoding(&headers, body).await?;

		let encoding = encoding.or_else(|| find_encoding(headers.get("content-type").unwrap_or_default()));
		let encoding = encoding.unwrap_or_else(|| crate::config::DEFAULT_ENCODING.to_string());

		if headers.get("connection").map(|v| v.eq_ignore_ascii_case("close")).unwrap_or(false) {
			conn.recycle_allowed = false;
			conn.close();
		}

		Ok(Response::new(status_code, headers, cookies, decoded, encoding))
	}
}

/// Read lines until the blank CRLF that ends the header block.
async fn read_head(conn: &mut Connection) -> Result<Vec<u8>> {
	let mut buf = Vec::new();
	loop {
		let line = conn.readline().await?;
		if line.is_empty() {
			return Err(Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed before headers completed")));
		}
		let is_blank = line == b"\r\n";
		buf.extend_from_slice(&line);
		if is_blank {
			break;
		}
	}
	Ok(buf)
}

fn parse_head(head: &[u8]) -> Result<(u16, Headers, crate::cookies::CookieJar)> {
	let mut parsed_headers = [httparse::EMPTY_HEADER; 64];
	let mut response = httparse::Response::new(&mut parsed_headers);

	match response.parse(head) {
		Ok(httparse::Status::Complete(_)) | Ok(httparse::Status::Partial) => {},
		Err(e) => return Err(Error::ProtocolError(format!("malformed response head: {e}"))),
	}

	let status_code = response.code.unwrap_or(0);
	let mut headers = Headers::new();
	let mut cookies = crate::cookies::CookieJar::new();

	for raw in response.headers.iter() {
		let name = raw.name;
		let value = String::from_utf8_lossy(raw.value).into_owned();
		if name.eq_ignore_ascii_case("set-cookie") {
			cookies.load(&value);
		}
		headers.append(name, value);
	}

	Ok((status_code, headers, cookies))
}

async fn read_body(conn: &mut Connection, headers: &Headers) -> Result<Vec<u8>> {
	if let Some(len) = headers.get("content-length") {
		let n: usize = len.trim().parse().map_err(|_| Error::ProtocolError(format!("bad Content-Length: {len}")))?;
		return conn.read(ReadSize::Exact(n)).await;
	}

	if headers.get("transfer-encoding").map(|v| v.eq_ignore_ascii_case("chunked")).unwrap_or(false) {
		return read_chunked(conn).await;
	}

	// No framing at all: treat as an empty body rather than reading to
	// EOF, which would hang on a keep-alive connection.
	Ok(Vec::new())
}

async fn read_chunked(conn: &mut Connection) -> Result<Vec<u8>> {
	let mut body = Vec::new();
	loop {
		let size_line = conn.readline().await?;
		let size_str = String::from_utf8_lossy(&size_line);
		let size_str = size_str.trim_end_matches(['\r', '\n']);
		let size_str = size_str.split(';').next().unwrap_or("0");
		let size = usize::from_str_radix(size_str.trim(), 16)
			.map_err(|_| Error::ProtocolError(format!("bad chunk size: {size_str:?}")))?;

		if size == 0 {
			conn.readline().await?;
			break;
		}

		let block = conn.read(ReadSize::Exact(size)).await?;
		body.extend_from_slice(&block);
		conn.readline().await?;
	}
	Ok(body)
}

async fn decode_content_encoding(headers: &Headers, body: Vec<u8>) -> Result<Vec<u8>> {
	if body.is_empty() {
		return Ok(body);
	}
	match headers.get("content-encoding").map(str::to_ascii_lowercase).as_deref() {
		Some("gzip") => {
			let mut out = Vec::new();
			let mut decoder = GzipDecoder::new(&body[..]);
			decoder.read_to_end(&mut out).await.map_err(Error::Io)?;
			Ok(out)
		},
		Some("deflate") => {
			// Try zlib-wrapped deflate first, then fall back to raw
			// deflate: servers disagree on which framing "deflate" means.
			let mut zlib_out = Vec::new();
			let mut decoder = ZlibDecoder::new(&body[..]);
			match decoder.read_to_end(&mut zlib_out).await {
				Ok(_) => Ok(zlib_out),
				Err(_) => {
					let mut raw_out = Vec::new();
					let mut raw = DeflateDecoder::new(&body[..]);
					raw.read_to_end(&mut raw_out).await.map_err(Error::Io)?;
					Ok(raw_out)
				},
			}
		},
		_ => Ok(body),
	}
}
