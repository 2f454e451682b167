mod common;

use std::time::Duration;

use mugen::{Config, Error, RequestOptions, Session};

#[tokio::test]
async fn request_times_out_against_a_silent_server() {
	let addr = common::spawn_silent().await;

	let mut opts = RequestOptions::new();
	opts.timeout = Some(Duration::from_millis(100));

	let mut session = Session::new(&Config::default()).unwrap();
	let err = session.get(&format!("http://{addr}/"), opts).await.unwrap_err();

	assert!(matches!(err, Error::Timeout));
}
