use base64::Engine;

use crate::connection::{Connection, ReadSize};
use crate::error::{Error, Result};

/// Issue a CONNECT request to an HTTP proxy and wait for the `2xx`
/// response that establishes the tunnel. `dest` is `host:port`, the bare
/// form used in the request-line (no scheme). `auth`, if supplied, is
/// sent as `Proxy-Authorization: Basic <b64(user:pass)>`.
pub async fn handshake(conn: &mut Connection, dest: &str, auth: Option<&(String, String)>) -> Result<()> {
	let mut request = format!("CONNECT {dest} HTTP/1.1\r\nHost: {dest}\r\n");
	if let Some((user, pass)) = auth {
		let basic = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
		request.push_str(&format!("Proxy-Authorization: Basic {basic}\r\n"));
		request.push_str("Proxy-Connection: Keep-Alive\r\n");
	}
	request.push_str("\r\n");
	conn.send(request.as_bytes()).await?;

	let mut buf = Vec::with_capacity(256);
	loop {
		let chunk = conn.read(ReadSize::Exact(1)).await?;
		buf.extend_from_slice(&chunk);

		if buf.len() > 8192 {
			return Err(Error::ProxyProtocolError("CONNECT response headers too long".into()));
		}
		if !buf.ends_with(b"\r\n\r\n") {
			continue;
		}

		let status_line = String::from_utf8_lossy(&buf);
		let status_line = status_line.lines().next().unwrap_or_default();
		let code = status_line
			.split_whitespace()
			.nth(1)
			.and_then(|s| s.parse::<u16>().ok());

		match code {
			Some(code) if (200..300).contains(&code) => return Ok(()),
			Some(407) => return Err(Error::ProxyAuthFailed),
			_ => {
				return Err(Error::ProxyProtocolError(format!("CONNECT tunnel rejected: {status_line}")));
			},
		}
	}
}
