//! Execution requests and the caller-side completion handle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use shellkeep_engine::{DecodeError, Engine, EngineError, FromValue, Pipeline, Value};
use tokio::sync::oneshot;

use crate::SessionError;
use crate::host::{ExecutionOptions, OutputSink, echo};

/// Converts raw engine output into the caller's result type.
pub(crate) type Decoder<T> = fn(Vec<Value>) -> Result<T, DecodeError>;

pub(crate) fn decode_each<T: FromValue>(values: Vec<Value>) -> Result<Vec<T>, DecodeError> {
	values.into_iter().map(T::from_value).collect()
}

pub(crate) fn discard(_values: Vec<Value>) -> Result<(), DecodeError> {
	Ok(())
}

type EngineFn<E, T> = Box<dyn FnMut(&E) -> Result<T, EngineError> + Send>;

/// What a request runs. Payloads are re-runnable so a busy attempt can be retried.
pub(crate) enum Payload<E, T> {
	/// Closure over the engine binding.
	Function(EngineFn<E, T>),
	/// Structured pipeline or script text, with host output and a decoder.
	Pipeline {
		pipeline: Pipeline,
		options: ExecutionOptions,
		sink: Arc<dyn OutputSink>,
		decode: Decoder<T>,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
	Function,
	Pipeline,
	Script,
	/// Session bootstrap work (version detection).
	Startup,
}

impl RequestKind {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Function => "function",
			Self::Pipeline => "pipeline",
			Self::Script => "script",
			Self::Startup => "startup",
		}
	}
}

/// Result of a single attempt at running a request.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Attempt {
	/// Result written to the completion slot.
	Completed,
	/// Failure written to the completion slot.
	Failed(String),
	/// The engine was busy. Nothing was written; the request may be retried.
	Busy,
}

/// A queued request with its result type erased.
pub(crate) trait QueuedRequest<E>: Send {
	fn id(&self) -> u64;

	fn kind(&self) -> RequestKind;

	/// Span of the submitting caller.
	fn span(&self) -> &tracing::Span;

	fn attempt(&mut self, engine: &E) -> Attempt;

	/// Completes the request with `error` without running it.
	fn reject(self: Box<Self>, error: SessionError);
}

pub(crate) type BoxedRequest<E> = Box<dyn QueuedRequest<E>>;

pub(crate) struct ExecutionRequest<E, T> {
	id: u64,
	kind: RequestKind,
	span: tracing::Span,
	payload: Payload<E, T>,
	completion: Option<oneshot::Sender<Result<T, SessionError>>>,
}

impl<E, T> ExecutionRequest<E, T> {
	/// Builds a request and the handle its caller awaits. Captures the current span.
	pub(crate) fn new(id: u64, kind: RequestKind, payload: Payload<E, T>) -> (Self, ExecutionHandle<T>) {
		let (tx, rx) = oneshot::channel();
		let request = Self {
			id,
			kind,
			span: tracing::Span::current(),
			payload,
			completion: Some(tx),
		};
		(request, ExecutionHandle { id, rx })
	}

	fn complete(&mut self, result: Result<T, SessionError>) {
		let Some(tx) = self.completion.take() else {
			return;
		};
		if tx.send(result).is_err() {
			tracing::trace!(id = self.id, "session.request.unobserved");
		}
	}
}

impl<E, T> QueuedRequest<E> for ExecutionRequest<E, T>
where
	E: Engine,
	T: Send + 'static,
{
	fn id(&self) -> u64 {
		self.id
	}

	fn kind(&self) -> RequestKind {
		self.kind
	}

	fn span(&self) -> &tracing::Span {
		&self.span
	}

	fn attempt(&mut self, engine: &E) -> Attempt {
		let result = match &mut self.payload {
			Payload::Function(f) => match f(engine) {
				Err(EngineError::Busy) => return Attempt::Busy,
				other => other.map_err(SessionError::from),
			},
			Payload::Pipeline {
				pipeline,
				options,
				sink,
				decode,
			} => {
				let output = engine.invoke(pipeline);
				if matches!(output, Err(EngineError::Busy)) {
					return Attempt::Busy;
				}
				echo(sink.as_ref(), *options, pipeline, &output);
				output.map_err(SessionError::from).and_then(|values| decode(values).map_err(SessionError::from))
			}
		};
		let failure = result.as_ref().err().map(ToString::to_string);
		self.complete(result);
		match failure {
			Some(message) => Attempt::Failed(message),
			None => Attempt::Completed,
		}
	}

	fn reject(mut self: Box<Self>, error: SessionError) {
		tracing::debug!(id = self.id, kind = self.kind.as_str(), %error, "session.request.rejected");
		self.complete(Err(error));
	}
}

/// Resolves to the result of a submitted request.
///
/// Dropping the handle does not withdraw the request; it still runs and its
/// result is discarded.
#[must_use = "dropping the handle discards the request's result"]
pub struct ExecutionHandle<T> {
	id: u64,
	rx: oneshot::Receiver<Result<T, SessionError>>,
}

impl<T> ExecutionHandle<T> {
	pub fn id(&self) -> u64 {
		self.id
	}
}

impl<T> Future for ExecutionHandle<T> {
	type Output = Result<T, SessionError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx).poll(cx).map(|res| res.unwrap_or(Err(SessionError::Abandoned)))
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use shellkeep_engine::ScriptEngine;

	use super::*;
	use crate::host::NullOutput;

	fn script_request(text: &str) -> (ExecutionRequest<ScriptEngine, Vec<i64>>, ExecutionHandle<Vec<i64>>) {
		ExecutionRequest::new(
			1,
			RequestKind::Script,
			Payload::Pipeline {
				pipeline: Pipeline::script(text),
				options: ExecutionOptions::silent(),
				sink: Arc::new(NullOutput),
				decode: decode_each::<i64>,
			},
		)
	}

	#[tokio::test]
	async fn completed_attempt_resolves_the_handle() {
		let engine = ScriptEngine::new();
		let (mut request, handle) = script_request("1 + 1");
		assert_eq!(request.attempt(&engine), Attempt::Completed);
		assert_eq!(handle.await, Ok(vec![2]));
	}

	#[tokio::test]
	async fn decode_failures_are_reported() {
		let engine = ScriptEngine::new();
		let (mut request, handle) = script_request("'text'");
		assert!(matches!(request.attempt(&engine), Attempt::Failed(_)));
		assert!(matches!(handle.await, Err(SessionError::Decode(_))));
	}

	#[tokio::test]
	async fn busy_function_writes_nothing() {
		let engine = ScriptEngine::new();
		let mut calls = 0;
		let (mut request, handle) = ExecutionRequest::<ScriptEngine, u32>::new(
			7,
			RequestKind::Function,
			Payload::Function(Box::new(move |_: &ScriptEngine| {
				calls += 1;
				if calls < 2 { Err(EngineError::Busy) } else { Ok(calls) }
			})),
		);
		assert_eq!(handle.id(), 7);
		assert_eq!(request.attempt(&engine), Attempt::Busy);
		assert_eq!(request.attempt(&engine), Attempt::Completed);
		assert_eq!(handle.await, Ok(2));
	}

	#[tokio::test]
	async fn dropped_request_reports_abandoned() {
		let (request, handle) = script_request("1");
		drop(request);
		assert_eq!(handle.await, Err(SessionError::Abandoned));
	}

	#[tokio::test]
	async fn reject_completes_without_running() {
		let (request, handle) = script_request("$never = 1");
		let boxed: BoxedRequest<ScriptEngine> = Box::new(request);
		boxed.reject(SessionError::Disposed);
		assert_eq!(handle.await, Err(SessionError::Disposed));
	}
}
