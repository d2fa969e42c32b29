use std::any::Any;

/// Extracts the message from a panic payload (`&str` or `String` payloads).
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	payload.downcast_ref::<String>().cloned()
}

/// Returns the panic message of a failed task, or `None` if it was cancelled.
pub fn join_error_panic_message(err: tokio::task::JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	let payload = err.into_panic();
	Some(panic_message(payload.as_ref()).unwrap_or_else(|| "<non-string panic payload>".to_string()))
}

#[cfg(test)]
#[path = "panic_tests.rs"]
mod tests;
