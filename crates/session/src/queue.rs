//! The session's request queue: type-erased requests over the worker FIFO.

use shellkeep_worker::{QueueClosed, QueueReceiver, QueueSender, Recv, work_queue};
use tokio_util::sync::CancellationToken;

use crate::request::BoxedRequest;

/// Producer side, shared by every caller.
pub(crate) struct RequestQueue<E> {
	tx: QueueSender<BoxedRequest<E>>,
}

/// Consumer side, owned by the driver.
pub(crate) struct RequestStream<E> {
	rx: QueueReceiver<BoxedRequest<E>>,
}

pub(crate) fn request_queue<E>() -> (RequestQueue<E>, RequestStream<E>) {
	let (tx, rx) = work_queue();
	(RequestQueue { tx }, RequestStream { rx })
}

impl<E> RequestQueue<E> {
	/// Appends at the tail. Hands the request back if the queue is closed.
	pub(crate) fn enqueue(&self, request: BoxedRequest<E>) -> Result<usize, BoxedRequest<E>> {
		self.tx.push(request).map_err(|QueueClosed(request)| request)
	}

	/// Stops accepting requests; pending ones stay dequeueable.
	pub(crate) fn close(&self) {
		self.tx.close();
	}

	pub(crate) fn len(&self) -> usize {
		self.tx.len()
	}
}

impl<E> RequestStream<E> {
	/// Next request in insertion order. `None` once the queue is closed and
	/// drained, or when `shutdown` fires.
	pub(crate) async fn dequeue(&mut self, shutdown: &CancellationToken) -> Option<BoxedRequest<E>> {
		match self.rx.recv_until(shutdown).await {
			Recv::Item(request) => Some(request),
			Recv::Closed | Recv::Cancelled => None,
		}
	}

	/// Closes the queue and takes everything still pending.
	pub(crate) fn drain(&mut self) -> Vec<BoxedRequest<E>> {
		self.rx.close();
		self.rx.drain()
	}
}
