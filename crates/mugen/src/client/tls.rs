use std::sync::{Arc, OnceLock};

use rustls_pki_types::ServerName;
use tokio_rustls::TlsConnector;

/// Lazily load the platform's trust store once per process. Building a
/// `rustls::RootCertStore` from the OS store on every handshake would be
/// wasteful.
fn root_store() -> &'static Arc<rustls::RootCertStore> {
	static ROOTS: OnceLock<Arc<rustls::RootCertStore>> = OnceLock::new();
	ROOTS.get_or_init(|| {
		let mut roots = rustls::RootCertStore::empty();
		let result = rustls_native_certs::load_native_certs();
		for cert in result.certs {
			let _ = roots.add(cert);
		}
		for err in &result.errors {
			tracing::warn!(%err, "failed to load a native certificate");
		}
		add_test_trust_anchor(&mut roots);
		Arc::new(roots)
	})
}

/// Test-only escape hatch: a DER-encoded certificate named by this
/// variable is trusted in addition to the platform store, so integration
/// tests can stand up a loopback TLS server without touching the real
/// trust store. Unset in any normal run.
fn add_test_trust_anchor(roots: &mut rustls::RootCertStore) {
	let Ok(path) = std::env::var("MUGEN_TEST_EXTRA_ROOT_DER") else { return };
	let Ok(der) = std::fs::read(path) else { return };
	let _ = roots.add(rustls_pki_types::CertificateDer::from(der));
}

fn client_config() -> &'static Arc<rustls::ClientConfig> {
	static CONFIG: OnceLock<Arc<rustls::ClientConfig>> = OnceLock::new();
	CONFIG.get_or_init(|| {
		let cfg = rustls::ClientConfig::builder()
			.with_root_certificates(root_store().clone())
			.with_no_client_auth();
		Arc::new(cfg)
	})
}

/// The shared `TlsConnector` every direct-TLS, CONNECT-tunneled-TLS, and
/// SOCKS5+TLS handshake goes through.
pub fn connector() -> TlsConnector {
	TlsConnector::from(client_config().clone())
}

/// Build the SNI/`ServerName` for a handshake target. Accepts a bare IP
/// literal (common when proxying straight to an address) or a hostname.
pub fn server_name(host: &str) -> Result<ServerName<'static>, String> {
	if let Ok(ip) = host.parse::<std::net::IpAddr>() {
		return Ok(ServerName::IpAddress(ip.into()));
	}
	rustls_pki_types::DnsName::try_from(host.to_string())
		.map(ServerName::DnsName)
		.map_err(|e| format!("invalid DNS name {host:?}: {e}"))
}
