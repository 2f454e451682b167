mod common;

use mugen::{Config, RequestOptions, Session};

#[tokio::test]
async fn set_cookie_is_captured_and_resent() {
	let first = b"HTTP/1.1 200 OK\r\nSet-Cookie: session=abc123; Path=/\r\nContent-Length: 2\r\n\r\nok";
	let addr1 = common::spawn_once(first).await;

	let mut session = Session::new(&Config::default()).unwrap();
	session.get(&format!("http://{addr1}/login"), RequestOptions::new()).await.unwrap();

	assert_eq!(session.cookies().get("session"), Some("abc123"));

	let second_response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
	let (addr2, captured) = common::spawn_capturing(second_response).await;
	session.get(&format!("http://{addr2}/dashboard"), RequestOptions::new()).await.unwrap();

	let request = String::from_utf8_lossy(&captured.await.unwrap());
	assert!(request.contains("Cookie: session=abc123;"));
}
