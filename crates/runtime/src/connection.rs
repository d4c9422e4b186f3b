//! Request/response correlation on top of the DevTools transport.
//!
//! This module handles:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Broadcasting events to every subscriber
//! - Failing pending and future requests once the transport is gone
//!
//! # Message Flow
//!
//! 1. Caller invokes `send_message()` with an optional session id, method and params
//! 2. Connection generates a unique ID and parks a oneshot sender under it
//! 3. Request is serialized and queued for the writer task
//! 4. Message loop receives the response from the transport
//! 5. Response is correlated by ID and delivered through the oneshot
//! 6. Events (no ID) are pushed onto a broadcast channel


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};

use hr_protocol::{ErrorPayload, Event, Message, Request};
use parking_lot::Mutex as ParkingLotMutex;
use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Capacity of the event broadcast buffer before slow subscribers lag.
pub const EVENT_BUFFER: usize = 1024;

struct Pending {
	method: String,
	tx: oneshot::Sender<Result<Value>>,
}

/// Pending request callbacks keyed by request ID.
type CallbackMap = Arc<TokioMutex<HashMap<u64, Pending>>>;

/// RAII guard ensuring callback cleanup when a request future is dropped.
struct CancelGuard {
	id: u64,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u64, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		let id = self.id;
		let callbacks = Arc::clone(&self.callbacks);

		if let Ok(handle) = tokio::runtime::Handle::try_current() {
			handle.spawn(async move {
				if callbacks.lock().await.remove(&id).is_some() {
					tracing::debug!(id, "CancelGuard: removed orphaned callback");
				}
			});
		}
	}
}

/// Future returned by [`Connection::send_message`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// DevTools connection to one browser.
///
/// Commands for every attached target share this connection; flattened target
/// sessions are addressed through the `sessionId` field.
pub struct Connection {
	/// Sequential request ID counter
	last_id: AtomicU64,
	/// Pending request callbacks keyed by request ID
	callbacks: CallbackMap,
	/// Channel for sending outbound messages to the writer task
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Transport sender (taken by run() to start writer task)
	transport_sender: TokioMutex<Option<Box<dyn Transport>>>,
	/// Receiving half of the transport (taken by run())
	transport_receiver: TokioMutex<Option<Box<dyn TransportReceiver>>>,
	/// Receiver for incoming messages from transport
	message_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Receiver for outbound messages (taken by run() to start writer task)
	outbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Event fan-out; taken on shutdown so subscribers observe the close
	events_tx: ParkingLotMutex<Option<broadcast::Sender<Event>>>,
	closed: AtomicBool,
}

impl Connection {
	/// Create a new Connection with the given transport
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

		Self {
			last_id: AtomicU64::new(1),
			callbacks: Arc::new(TokioMutex::new(HashMap::new())),
			outbound_tx,
			transport_sender: TokioMutex::new(Some(sender)),
			transport_receiver: TokioMutex::new(Some(receiver)),
			message_rx: TokioMutex::new(Some(message_rx)),
			outbound_rx: TokioMutex::new(Some(outbound_rx)),
			events_tx: ParkingLotMutex::new(Some(events_tx)),
			closed: AtomicBool::new(false),
		}
	}

	/// Sends a command and awaits the browser's response.
	///
	/// `session_id` routes the command to an attached target; `None` addresses
	/// the browser itself.
	pub async fn send_message(&self, session_id: Option<&str>, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		tracing::debug!(id, method, session = session_id.unwrap_or("browser"), "Sending command");

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().await.insert(
			id,
			Pending {
				method: method.to_string(),
				tx,
			},
		);
		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		// Shutdown drains callbacks after setting `closed`; re-check so an insert
		// racing with the drain cannot wait forever.
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let request = Request {
			id,
			method: method.to_string(),
			params,
			session_id: session_id.map(str::to_owned),
		};
		let request_value = serde_json::to_value(&request)?;

		if self.outbound_tx.send(request_value).is_err() {
			tracing::error!("Failed to queue message: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		ResponseFuture { rx, guard }.await
	}

	/// Subscribes to every event arriving on this connection.
	///
	/// After shutdown the returned receiver reports closed immediately.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		match self.events_tx.lock().as_ref() {
			Some(tx) => tx.subscribe(),
			None => broadcast::channel(1).1,
		}
	}

	/// Whether the transport has shut down.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Runs the message dispatch loop until the transport ends.
	pub async fn run(self: &Arc<Self>) -> Result<()> {
		let transport_receiver = self
			.transport_receiver
			.lock()
			.await
			.take()
			.ok_or_else(|| Error::ProtocolError("run() can only be called once".to_string()))?;
		let mut transport_sender = self
			.transport_sender
			.lock()
			.await
			.take()
			.ok_or_else(|| Error::ProtocolError("run() can only be called once".to_string()))?;
		let mut outbound_rx = self
			.outbound_rx
			.lock()
			.await
			.take()
			.ok_or_else(|| Error::ProtocolError("run() can only be called once".to_string()))?;
		let mut message_rx = self
			.message_rx
			.lock()
			.await
			.take()
			.ok_or_else(|| Error::ProtocolError("run() can only be called once".to_string()))?;

		let reader_handle = tokio::spawn(async move {
			let result = transport_receiver.run().await;
			if let Err(e) = &result {
				tracing::error!("Transport read error: {}", e);
			}
			result
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = transport_sender.send(message).await {
					tracing::error!("Transport write error: {}", e);
					break;
				}
			}
		});

		while let Some(message_value) = message_rx.recv().await {
			match serde_json::from_value::<Message>(message_value) {
				Ok(message) => {
					if let Err(e) = self.dispatch_internal(message).await {
						tracing::warn!("Error dispatching message: {}", e);
					}
				}
				Err(e) => {
					tracing::error!("Failed to parse message: {}", e);
				}
			}
		}

		self.shutdown().await;
		writer_handle.abort();

		match reader_handle.await {
			Ok(result) => result,
			Err(e) => Err(Error::TransportError(format!("reader task failed: {e}"))),
		}
	}

	/// Marks the connection closed and fails everything still waiting on it.
	async fn shutdown(&self) {
		self.closed.store(true, Ordering::SeqCst);
		self.events_tx.lock().take();

		let pending: Vec<Pending> = self.callbacks.lock().await.drain().map(|(_, p)| p).collect();
		if !pending.is_empty() {
			tracing::debug!(count = pending.len(), "Failing requests pending at shutdown");
		}
		for p in pending {
			let _ = p.tx.send(Err(Error::ChannelClosed));
		}

		tracing::debug!(target = "hr", "DevTools connection closed");
	}

	/// Dispatch an incoming message (test-only public version)
	#[cfg(test)]
	pub async fn dispatch(&self, message: Message) -> Result<()> {
		self.dispatch_internal(message).await
	}

	async fn dispatch_internal(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let pending = self.callbacks.lock().await.remove(&response.id).ok_or_else(|| {
					Error::ProtocolError(format!("Cannot find request to respond: id={}", response.id))
				})?;

				let result = match response.error {
					Some(error) => Err(parse_protocol_error(&pending.method, error)),
					None => Ok(response.result.unwrap_or_else(|| Value::Object(Default::default()))),
				};

				let _ = pending.tx.send(result);
				Ok(())
			}
			Message::Event(event) => {
				tracing::trace!(method = %event.method, session = ?event.session_id, "Event");
				if let Some(tx) = self.events_tx.lock().as_ref() {
					// No subscribers is fine; events are fire-and-forget.
					let _ = tx.send(event);
				}
				Ok(())
			}
			Message::Unknown(value) => {
				tracing::debug!(
					"Unknown message type (forward-compatible, ignored): {}",
					serde_json::to_string(&value).unwrap_or_else(|_| "<serialization failed>".to_string())
				);
				Ok(())
			}
		}
	}
}

/// Converts an [`ErrorPayload`] into [`Error::Remote`].
fn parse_protocol_error(method: &str, error: ErrorPayload) -> Error {
	let message = match error.data {
		Some(data) if !data.is_empty() => format!("{}: {}", error.message, data),
		_ => error.message,
	};
	Error::Remote {
		method: method.to_string(),
		code: error.code,
		message,
	}
}
