use std::panic::AssertUnwindSafe;

use super::*;

#[tokio::test]
async fn join_error_carries_static_str_payload() {
	let handle = tokio::spawn(async { panic!("boom-str") });
	let err = handle.await.expect_err("task should panic");
	let msg = join_error_panic_message(err).expect("should be a panic");
	assert!(msg.contains("boom-str"), "expected 'boom-str', got: {msg}");
}

#[tokio::test]
async fn join_error_carries_formatted_payload() {
	let handle = tokio::spawn(async { panic!("{}", String::from("boom-string")) });
	let err = handle.await.expect_err("task should panic");
	let msg = join_error_panic_message(err).expect("should be a panic");
	assert!(msg.contains("boom-string"), "expected 'boom-string', got: {msg}");
}

#[tokio::test]
async fn cancelled_task_has_no_panic_message() {
	let handle = tokio::spawn(async {
		tokio::time::sleep(std::time::Duration::from_secs(60)).await;
	});
	handle.abort();
	let err = handle.await.expect_err("aborted task should fail to join");
	assert!(join_error_panic_message(err).is_none());
}

#[test]
fn catch_unwind_payload_is_readable() {
	let payload = std::panic::catch_unwind(AssertUnwindSafe(|| panic!("payload {}", 42))).expect_err("closure should panic");
	assert_eq!(panic_message(payload.as_ref()).as_deref(), Some("payload 42"));
}
