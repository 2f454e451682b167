mod common;

use mugen::{Config, RequestOptions, Session};

#[tokio::test]
async fn get_over_direct_plaintext() {
	let addr = common::spawn_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;

	let mut session = Session::new(&Config::default()).unwrap();
	let resp = session
		.get(&format!("http://{addr}/greet"), RequestOptions::new())
		.await
		.unwrap();

	assert_eq!(resp.status_code, 200);
	assert_eq!(resp.text(), "hello");
}

#[tokio::test]
async fn head_request_never_reads_a_body() {
	let addr = common::spawn_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;

	let mut session = Session::new(&Config::default()).unwrap();
	let resp = session.head(&format!("http://{addr}/"), RequestOptions::new()).await.unwrap();

	assert_eq!(resp.status_code, 200);
	assert!(resp.content.is_empty());
}

#[tokio::test]
async fn chunked_response_is_fully_decoded() {
	let body = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
	let addr = common::spawn_once(body).await;

	let mut session = Session::new(&Config::default()).unwrap();
	let resp = session.get(&format!("http://{addr}/"), RequestOptions::new()).await.unwrap();

	assert_eq!(resp.text(), "hello world");
}

#[tokio::test]
async fn post_form_body_is_sent_as_urlencoded() {
	let addr_response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
	let (addr, captured) = common::spawn_capturing(addr_response).await;

	let mut form = indexmap::IndexMap::new();
	form.insert("name".to_string(), "a b".to_string());

	let mut opts = RequestOptions::new();
	opts.body = Some(mugen::Body::Form(form));

	let mut session = Session::new(&Config::default()).unwrap();
	let resp = session.post(&format!("http://{addr}/submit"), opts).await.unwrap();
	assert_eq!(resp.status_code, 200);

	let request_bytes = captured.await.unwrap();
	let request = String::from_utf8_lossy(&request_bytes);
	assert!(request.contains("Content-Type: application/x-www-form-urlencoded"));
	assert!(request.ends_with("name=a%20b"));
}
