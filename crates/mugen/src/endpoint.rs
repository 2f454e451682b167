use std::net::IpAddr;

use mugen_core::prelude::Arc;

/// The identity used to look up a pooled connection.
///
/// Modeled as a tagged variant per the design notes rather than an
/// untyped tuple, so hash/equality fall out of `#[derive]` instead of
/// depending on tuple-shape discipline across call sites.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKey {
	/// `(ip, port, tls=false)`.
	DirectPlain { ip: IpAddr, port: u16 },
	/// `(host, port, tls=true)` — TLS endpoints key on hostname, not IP,
	/// so SNI reuse is correct.
	DirectTls { host: Arc<str>, port: u16 },
	/// `(proxy_ip, proxy_port, tls=false)`.
	HttpProxyPlain { proxy_ip: IpAddr, proxy_port: u16 },
	/// `(proxy_ip, proxy_port, tls=false, target_host)` — distinct from
	/// `HttpProxyPlain` because a CONNECT tunnel terminates at a specific
	/// target.
	HttpProxyTls {
		proxy_ip: IpAddr,
		proxy_port: u16,
		target: Arc<str>,
	},
}

impl EndpointKey {
	/// Whether a connection under this key requires an application-level
	/// TLS handshake once dialed (true for `DirectTls`; for
	/// `HttpProxyTls` the CONNECT tunnel is plaintext to the proxy, and
	/// TLS is layered on top by the caller after the tunnel is up).
	pub fn is_direct_tls(&self) -> bool {
		matches!(self, EndpointKey::DirectTls { .. })
	}
}

impl std::fmt::Display for EndpointKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			EndpointKey::DirectPlain { ip, port } => write!(f, "direct://{ip}:{port}"),
			EndpointKey::DirectTls { host, port } => write!(f, "direct+tls://{host}:{port}"),
			EndpointKey::HttpProxyPlain { proxy_ip, proxy_port } => {
				write!(f, "proxy://{proxy_ip}:{proxy_port}")
			},
			EndpointKey::HttpProxyTls {
				proxy_ip,
				proxy_port,
				target,
			} => write!(f, "proxy://{proxy_ip}:{proxy_port}=>{target}"),
		}
	}
}
