use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// Spin up a listener that accepts exactly one connection, reads a full
/// request (headers, plus a body if `Content-Length` says there is one),
/// and writes back `response` verbatim. Returns the bound address and a
/// receiver for the bytes the server actually read off the wire.
pub async fn spawn_capturing(response: &'static [u8]) -> (SocketAddr, tokio::sync::oneshot::Receiver<Vec<u8>>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let (tx, rx) = tokio::sync::oneshot::channel();

	tokio::spawn(async move {
		let (mut socket, _) = listener.accept().await.unwrap();
		let request = read_request(&mut socket).await;
		let _ = socket.write_all(response).await;
		let _ = socket.shutdown().await;
		let _ = tx.send(request);
	});

	(addr, rx)
}

/// Same as [`spawn_capturing`] but discards the captured request.
pub async fn spawn_once(response: &'static [u8]) -> SocketAddr {
	spawn_capturing(response).await.0
}

/// A listener that never writes anything back, used to exercise timeouts.
pub async fn spawn_silent() -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		let (_socket, _) = listener.accept().await.unwrap();
		std::future::pending::<()>().await;
	});
	addr
}

async fn read_request<S: AsyncRead + Unpin>(socket: &mut S) -> Vec<u8> {
	let mut buf = Vec::new();
	let mut byte = [0u8; 1];
	loop {
		match socket.read(&mut byte).await {
			Ok(0) => return buf,
			Ok(_) => buf.push(byte[0]),
			Err(_) => return buf,
		}
		if buf.ends_with(b"\r\n\r\n") {
			break;
		}
	}

	let headers = String::from_utf8_lossy(&buf);
	let content_length = headers
		.lines()
		.find_map(|line| line.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
		.and_then(|v| v.parse::<usize>().ok())
		.unwrap_or(0);

	let mut remaining = content_length;
	while remaining > 0 {
		let mut chunk = vec![0u8; remaining];
		match socket.read(&mut chunk).await {
			Ok(0) => break,
			Ok(n) => {
				buf.extend_from_slice(&chunk[..n]);
				remaining -= n;
			},
			Err(_) => break,
		}
	}
	buf
}

/// A raw SOCKS5 server that completes the no-auth greeting and CONNECT
/// handshake, then hands the same socket off to `serve_http_once` so the
/// tunneled bytes look like an ordinary HTTP exchange with the "target".
pub async fn spawn_socks5_origin(response: &'static [u8]) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	tokio::spawn(async move {
		let (mut socket, _) = listener.accept().await.unwrap();

		let mut greeting = [0u8; 2];
		socket.read_exact(&mut greeting).await.unwrap();
		let mut methods = vec![0u8; greeting[1] as usize];
		socket.read_exact(&mut methods).await.unwrap();
		socket.write_all(&[0x05, 0x00]).await.unwrap();

		let mut header = [0u8; 4];
		socket.read_exact(&mut header).await.unwrap();
		match header[3] {
			0x01 => {
				let mut ip = [0u8; 4];
				socket.read_exact(&mut ip).await.unwrap();
			},
			0x03 => {
				let mut len = [0u8; 1];
				socket.read_exact(&mut len).await.unwrap();
				let mut name = vec![0u8; len[0] as usize];
				socket.read_exact(&mut name).await.unwrap();
			},
			0x04 => {
				let mut ip = [0u8; 16];
				socket.read_exact(&mut ip).await.unwrap();
			},
			_ => panic!("unexpected SOCKS5 address type"),
		}
		let mut port = [0u8; 2];
		socket.read_exact(&mut port).await.unwrap();

		socket
			.write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
			.await
			.unwrap();

		let _request = read_request(&mut socket).await;
		let _ = socket.write_all(response).await;
		let _ = socket.shutdown().await;
	});

	addr
}

static TEST_CERT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A self-signed loopback certificate for `127.0.0.1`, plus the temp
/// file path its DER bytes are written to so the client's TLS trust
/// store can be pointed at it via `MUGEN_TEST_EXTRA_ROOT_DER`.
pub struct TestCert {
	pub der_path: std::path::PathBuf,
	cert_der: Vec<u8>,
	key_der: Vec<u8>,
}

pub fn generate_test_cert() -> TestCert {
	let key_pair = rcgen::KeyPair::generate().unwrap();
	let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
	params.subject_alt_names = vec![rcgen::SanType::IpAddress("127.0.0.1".parse().unwrap())];
	let cert = params.self_signed(&key_pair).unwrap();

	let cert_der = cert.der().to_vec();
	let key_der = key_pair.serialize_der();

	let seq = TEST_CERT_SEQ.fetch_add(1, Ordering::Relaxed);
	let der_path = std::env::temp_dir().join(format!("mugen-test-root-{}-{seq}.der", std::process::id()));
	std::fs::write(&der_path, &cert_der).unwrap();

	TestCert { der_path, cert_der, key_der }
}

pub fn test_tls_acceptor(cert: &TestCert) -> TlsAcceptor {
	let chain = vec![CertificateDer::from(cert.cert_der.clone())];
	let key = PrivateKeyDer::try_from(cert.key_der.clone()).unwrap();
	let config = rustls::ServerConfig::builder()
		.with_no_client_auth()
		.with_single_cert(chain, key)
		.unwrap();
	TlsAcceptor::from(Arc::new(config))
}

/// A fake HTTP forward proxy that completes a CONNECT tunnel (asserting
/// `Proxy-Authorization` equals `expected_auth` when given), then
/// terminates TLS on the very same socket and serves `response` as if it
/// were the HTTPS origin on the other side of the tunnel.
pub async fn spawn_https_connect_origin(
	response: &'static [u8],
	acceptor: TlsAcceptor,
	expected_auth: Option<String>,
) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	tokio::spawn(async move {
		let (mut socket, _) = listener.accept().await.unwrap();

		let mut buf = Vec::new();
		let mut byte = [0u8; 1];
		loop {
			socket.read_exact(&mut byte).await.unwrap();
			buf.push(byte[0]);
			if buf.ends_with(b"\r\n\r\n") {
				break;
			}
		}
		let request = String::from_utf8_lossy(&buf);
		assert!(request.starts_with("CONNECT "), "expected a CONNECT request, got: {request}");
		if let Some(expected) = &expected_auth {
			let lower = request.to_ascii_lowercase();
			assert!(
				lower.contains(&format!("proxy-authorization: {}", expected.to_ascii_lowercase())),
				"missing or mismatched Proxy-Authorization in: {request}"
			);
		}
		socket.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await.unwrap();

		let mut tls = acceptor.accept(socket).await.unwrap();
		let _request = read_request(&mut tls).await;
		let _ = tls.write_all(response).await;
		let _ = tls.shutdown().await;
	});

	addr
}
