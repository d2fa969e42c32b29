use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Push failed because the queue was closed. The rejected item is handed back.
#[derive(PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Debug for QueueClosed<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("QueueClosed(..)")
	}
}

impl<T> fmt::Display for QueueClosed<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("work queue closed")
	}
}

impl<T> std::error::Error for QueueClosed<T> {}

/// Outcome of a cancel-aware receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
	/// Next item in insertion order.
	Item(T),
	/// Queue is closed and fully drained.
	Closed,
	/// The cancellation token fired first.
	Cancelled,
}

struct QueueState<T> {
	items: VecDeque<T>,
	closed: bool,
}

struct QueueInner<T> {
	state: Mutex<QueueState<T>>,
	notify_recv: Notify,
}

/// Producer half of an unbounded FIFO work queue. Cloneable.
pub struct QueueSender<T> {
	inner: Arc<QueueInner<T>>,
}

/// Consumer half of an unbounded FIFO work queue. There is exactly one.
pub struct QueueReceiver<T> {
	inner: Arc<QueueInner<T>>,
}

impl<T> Clone for QueueSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

/// Creates an unbounded multi-producer, single-consumer FIFO queue.
///
/// Pushing never waits; the consumer parks on a [`Notify`] while the queue is
/// empty.
pub fn work_queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
	let inner = Arc::new(QueueInner {
		state: Mutex::new(QueueState {
			items: VecDeque::new(),
			closed: false,
		}),
		notify_recv: Notify::new(),
	});
	(
		QueueSender {
			inner: Arc::clone(&inner),
		},
		QueueReceiver { inner },
	)
}

impl<T> QueueSender<T> {
	/// Appends at the tail. Returns the queue depth after the push.
	pub fn push(&self, item: T) -> Result<usize, QueueClosed<T>> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(QueueClosed(item));
		}
		state.items.push_back(item);
		let depth = state.items.len();
		drop(state);
		self.inner.notify_recv.notify_one();
		Ok(depth)
	}

	/// Closes the queue. Pending items stay receivable; later pushes fail.
	pub fn close(&self) {
		close(&self.inner);
	}

	pub fn len(&self) -> usize {
		self.inner.state.lock().items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}
}

impl<T> QueueReceiver<T> {
	/// Receives the next item. Returns `None` once the queue is closed and drained.
	pub async fn recv(&mut self) -> Option<T> {
		loop {
			let notified = self.inner.notify_recv.notified();
			if let Some(outcome) = self.poll_state() {
				return outcome;
			}
			notified.await;
		}
	}

	/// Like [`Self::recv`], but gives up as soon as `cancel` fires.
	///
	/// Cancellation is checked before the queue, so a cancelled consumer never
	/// takes another item.
	pub async fn recv_until(&mut self, cancel: &CancellationToken) -> Recv<T> {
		loop {
			if cancel.is_cancelled() {
				return Recv::Cancelled;
			}
			let notified = self.inner.notify_recv.notified();
			match self.poll_state() {
				Some(Some(item)) => return Recv::Item(item),
				Some(None) => return Recv::Closed,
				None => {}
			}
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Recv::Cancelled,
				_ = notified => {}
			}
		}
	}

	/// Takes the head without waiting.
	pub fn try_recv(&mut self) -> Option<T> {
		self.inner.state.lock().items.pop_front()
	}

	/// Removes and returns every pending item in insertion order.
	pub fn drain(&mut self) -> Vec<T> {
		self.inner.state.lock().items.drain(..).collect()
	}

	/// Closes the queue from the consumer side.
	pub fn close(&self) {
		close(&self.inner);
	}

	pub fn len(&self) -> usize {
		self.inner.state.lock().items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// `Some(Some(item))` for an item, `Some(None)` when closed and empty,
	/// `None` when the caller should wait.
	fn poll_state(&self) -> Option<Option<T>> {
		let mut state = self.inner.state.lock();
		if let Some(item) = state.items.pop_front() {
			return Some(Some(item));
		}
		if state.closed {
			return Some(None);
		}
		None
	}
}

fn close<T>(inner: &QueueInner<T>) {
	inner.state.lock().closed = true;
	inner.notify_recv.notify_one();
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn items_come_out_in_push_order() {
		let (tx, mut rx) = work_queue();
		for i in 0..5u32 {
			assert_eq!(tx.push(i), Ok(i as usize + 1));
		}

		for expected in 0..5u32 {
			assert_eq!(rx.recv().await, Some(expected));
		}
		assert!(rx.is_empty());
	}

	#[tokio::test]
	async fn close_drains_pending_then_ends() {
		let (tx, mut rx) = work_queue();
		let _ = tx.push("a");
		let _ = tx.push("b");
		tx.close();

		assert_eq!(tx.push("c"), Err(QueueClosed("c")));
		assert_eq!(rx.recv().await, Some("a"));
		assert_eq!(rx.recv().await, Some("b"));
		assert_eq!(rx.recv().await, None);
	}

	#[tokio::test]
	async fn recv_parks_until_a_producer_pushes() {
		let (tx, mut rx) = work_queue::<u32>();
		let consumer = tokio::spawn(async move { rx.recv().await });

		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!consumer.is_finished());

		let _ = tx.push(7);
		let got = tokio::time::timeout(Duration::from_millis(200), consumer)
			.await
			.expect("consumer should wake after push")
			.expect("consumer task should not panic");
		assert_eq!(got, Some(7));
	}

	#[tokio::test]
	async fn recv_until_returns_cancelled_without_taking_items() {
		let (tx, mut rx) = work_queue();
		let cancel = CancellationToken::new();
		cancel.cancel();
		let _ = tx.push(1u8);

		assert_eq!(rx.recv_until(&cancel).await, Recv::Cancelled);
		assert_eq!(rx.drain(), vec![1]);
	}

	#[tokio::test]
	async fn recv_until_wakes_on_cancel_while_parked() {
		let (_tx, mut rx) = work_queue::<u8>();
		let cancel = CancellationToken::new();
		let child = cancel.clone();
		let consumer = tokio::spawn(async move { rx.recv_until(&child).await });

		tokio::time::sleep(Duration::from_millis(10)).await;
		cancel.cancel();
		let got = tokio::time::timeout(Duration::from_millis(200), consumer)
			.await
			.expect("cancel should wake the consumer")
			.expect("consumer task should not panic");
		assert_eq!(got, Recv::Cancelled);
	}

	#[tokio::test]
	async fn consumer_close_rejects_producers() {
		let (tx, mut rx) = work_queue();
		let _ = tx.push(1u8);
		rx.close();

		assert!(tx.is_closed());
		assert_eq!(tx.push(2), Err(QueueClosed(2)));
		assert_eq!(rx.recv_until(&CancellationToken::new()).await, Recv::Item(1));
		assert_eq!(rx.recv_until(&CancellationToken::new()).await, Recv::Closed);
	}
}
