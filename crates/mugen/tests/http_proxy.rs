mod common;

use base64::Engine;
use mugen::{Config, RequestOptions, Session};

/// A plaintext request through an HTTP forward proxy needs no CONNECT
/// tunnel: the proxy is dialed directly and the request-line carries the
/// absolute-form target, so the "proxy" here can just behave like any
/// other origin server.
#[tokio::test]
async fn get_through_plaintext_http_proxy() {
	let response = b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nforwrd";
	let (proxy_addr, captured) = common::spawn_capturing(response).await;

	let mut opts = RequestOptions::new();
	opts.proxy = Some(format!("http://{proxy_addr}"));

	let mut session = Session::new(&Config::default()).unwrap();
	let resp = session
		.get("http://example.invalid/resource", opts)
		.await
		.unwrap();

	assert_eq!(resp.status_code, 200);
	assert_eq!(resp.text(), "forwrd");

	let request = String::from_utf8_lossy(&captured.await.unwrap());
	assert!(request.starts_with("GET http://example.invalid/resource HTTP/1.1"));
}

/// HTTPS through an HTTP forward proxy needs a CONNECT tunnel first: the
/// proxy gets an authenticated `CONNECT host:port`, replies `200`, and
/// only then does the client layer TLS and the real GET on top.
#[tokio::test]
async fn get_https_through_http_proxy_connect_tunnel() {
	let cert = common::generate_test_cert();
	// SAFETY: this test file runs as its own process; no other test in
	// it touches TLS, so there's no concurrent access to the var.
	unsafe { std::env::set_var("MUGEN_TEST_EXTRA_ROOT_DER", &cert.der_path) };
	let acceptor = common::test_tls_acceptor(&cert);

	let expected_auth = format!("Basic {}", base64::engine::general_purpose::STANDARD.encode("alice:hunter2"));
	let response = b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\ntunnel";
	let addr = common::spawn_https_connect_origin(response, acceptor, Some(expected_auth)).await;

	let mut opts = RequestOptions::new();
	opts.proxy = Some(format!("http://alice:hunter2@{addr}"));

	let mut session = Session::new(&Config::default()).unwrap();
	let resp = session.get(&format!("https://{addr}/resource"), opts).await.unwrap();

	assert_eq!(resp.status_code, 200);
	assert_eq!(resp.text(), "tunnel");
}
