use std::net::IpAddr;

use crate::connection::{Connection, ReadSize};
use crate::error::{Error, Result};

const SOCKS5_ERRORS: &[(u8, &str)] = &[
	(0x01, "general SOCKS server failure"),
	(0x02, "connection not allowed by ruleset"),
	(0x03, "network unreachable"),
	(0x04, "host unreachable"),
	(0x05, "connection refused"),
	(0x06, "TTL expired"),
	(0x07, "command not supported, or protocol error"),
	(0x08, "address type not supported"),
];

fn describe(status: u8) -> &'static str {
	SOCKS5_ERRORS
		.iter()
		.find(|(code, _)| *code == status)
		.map(|(_, msg)| *msg)
		.unwrap_or("unknown error")
}

/// Credentials for SOCKS5 username/password auth (RFC 1929).
#[derive(Clone, Debug, Default)]
pub struct Socks5Auth {
	pub username: Option<String>,
	pub password: Option<String>,
}

/// Run the greeting/auth/CONNECT handshake against an already-dialed
/// SOCKS5 proxy connection. Returns the bound address/port the proxy
/// reports for its outbound side (rarely useful, but part of the
/// protocol reply), leaving `conn` positioned to carry the tunneled
/// bytes.
pub async fn handshake(
	conn: &mut Connection,
	dest_host: &str,
	dest_port: u16,
	auth: &Socks5Auth,
) -> Result<(IpAddr, u16)> {
	greet_and_auth(conn, auth).await?;
	connect(conn, dest_host, dest_port).await
}

async fn greet_and_auth(conn: &mut Connection, auth: &Socks5Auth) -> Result<()> {
	let has_creds = auth.username.is_some() && auth.password.is_some();
	if has_creds {
		conn.send(&[0x05, 0x02, 0x00, 0x02]).await?;
	} else {
		conn.send(&[0x05, 0x01, 0x00]).await?;
	}

	let chosen = conn.read(ReadSize::Exact(2)).await?;
	if chosen[0] != 0x05 {
		return Err(Error::ProxyProtocolError("SOCKS5 proxy sent invalid greeting".into()));
	}

	match chosen[1] {
		0x02 if has_creds => {
			let user = auth.username.as_deref().unwrap_or_default();
			let pass = auth.password.as_deref().unwrap_or_default();
			let mut payload = Vec::with_capacity(3 + user.len() + pass.len());
			payload.push(0x01);
			payload.push(user.len() as u8);
			payload.extend_from_slice(user.as_bytes());
			payload.push(pass.len() as u8);
			payload.extend_from_slice(pass.as_bytes());
			conn.send(&payload).await?;

			let status = conn.read(ReadSize::Exact(2)).await?;
			if status[0] != 0x01 {
				return Err(Error::ProxyProtocolError("SOCKS5 proxy sent invalid auth reply".into()));
			}
			if status[1] != 0x00 {
				return Err(Error::ProxyAuthFailed);
			}
			Ok(())
		},
		0x00 => Ok(()),
		0xff => Err(Error::ProxyAuthFailed),
		_ => Err(Error::ProxyProtocolError("SOCKS5 proxy sent invalid greeting".into())),
	}
}

async fn connect(conn: &mut Connection, dest_host: &str, dest_port: u16) -> Result<(IpAddr, u16)> {
	let header = [0x05u8, 0x01, 0x00];
	let mut request = Vec::with_capacity(10 + dest_host.len());
	request.extend_from_slice(&header);

	// Probe address-type encodings in order: IPv4, then IPv6, then fall
	// back to the domain-name form.
	if let Ok(v4) = dest_host.parse::<std::net::Ipv4Addr>() {
		request.push(0x01);
		request.extend_from_slice(&v4.octets());
	} else if let Ok(v6) = dest_host.parse::<std::net::Ipv6Addr>() {
		request.push(0x04);
		request.extend_from_slice(&v6.octets());
	} else {
		request.push(0x03);
		request.push(dest_host.len() as u8);
		request.extend_from_slice(dest_host.as_bytes());
	}
	request.extend_from_slice(&dest_port.to_be_bytes());
	conn.send(&request).await?;

	let head = conn.read(ReadSize::Exact(3)).await?;
	if head[0] != 0x05 {
		return Err(Error::ProxyProtocolError("SOCKS5 proxy sent invalid reply".into()));
	}
	let status = head[1];
	if status != 0x00 {
		return Err(Error::Socks5Error {
			status,
			message: describe(status).to_string(),
		});
	}

	let addr_type = conn.read(ReadSize::Exact(1)).await?;
	let addr = match addr_type[0] {
		0x01 => {
			let bytes = conn.read(ReadSize::Exact(4)).await?;
			IpAddr::from([bytes[0], bytes[1], bytes[2], bytes[3]])
		},
		0x03 => {
			let len = conn.read(ReadSize::Exact(1)).await?[0] as usize;
			let _name = conn.read(ReadSize::Exact(len)).await?;
			// A domain-name bound-address has no IpAddr representation;
			// callers only use the returned pair for diagnostics.
			IpAddr::from([0, 0, 0, 0])
		},
		0x04 => {
			let bytes = conn.read(ReadSize::Exact(16)).await?;
			let octets: [u8; 16] = bytes.try_into().map_err(|_| {
				Error::ProxyProtocolError("SOCKS5 proxy sent a short IPv6 bound address".into())
			})?;
			IpAddr::from(octets)
		},
		_ => return Err(Error::ProxyProtocolError("SOCKS5 proxy sent an unknown address type".into())),
	};

	let port_bytes = conn.read(ReadSize::Exact(2)).await?;
	let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);

	Ok((addr, port))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn describes_known_status() {
		assert_eq!(describe(0x05), "connection refused");
	}

	#[test]
	fn unknown_status_has_fallback_message() {
		assert_eq!(describe(0xaa), "unknown error");
	}
}
