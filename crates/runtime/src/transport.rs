//! WebSocket transport for the DevTools protocol.
//!
//! Each protocol message is one WebSocket text frame holding a JSON object.
//! The transport is split into a sending half, driven by the connection's
//! writer task, and a receiving half that forwards every decoded frame into an
//! unbounded channel until the socket closes.


use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

/// Boxed future used at the object-safe transport seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Sending half of a transport.
pub trait Transport: Send {
	/// Serializes and writes one message.
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>>;
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads until the peer closes or the message channel is dropped.
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Everything a [`Connection`](crate::Connection) needs from a transport.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// DevTools transport over a WebSocket stream.
pub struct WebSocketTransport<S> {
	stream: WebSocketStream<S>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
	/// Connects to a `ws://` DevTools endpoint.
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		let (stream, _response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		tracing::debug!(target = "hr", url, "DevTools websocket connected");
		Ok(Self::new(stream))
	}
}

impl<S> WebSocketTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	/// Wraps an established WebSocket stream.
	pub fn new(stream: WebSocketStream<S>) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(Self { stream, message_tx }, message_rx)
	}

	/// Splits into independently owned halves.
	pub fn into_parts(self) -> (WebSocketTransportSender<S>, WebSocketTransportReceiver<S>) {
		let (sink, stream) = self.stream.split();
		(
			WebSocketTransportSender { sink },
			WebSocketTransportReceiver {
				stream,
				message_tx: self.message_tx,
			},
		)
	}

	/// Splits and boxes the halves for [`Connection::new`](crate::Connection::new).
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

/// Writing half of a [`WebSocketTransport`].
pub struct WebSocketTransportSender<S> {
	sink: SplitSink<WebSocketStream<S>, Frame>,
}

impl<S> WebSocketTransportSender<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	pub async fn send(&mut self, message: Value) -> Result<()> {
		let text = serde_json::to_string(&message)?;
		self.sink
			.send(Frame::Text(text))
			.await
			.map_err(|e| Error::TransportError(format!("Failed to send frame: {e}")))
	}
}

impl<S> Transport for WebSocketTransportSender<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>> {
		Box::pin(WebSocketTransportSender::send(self, message))
	}
}

/// Reading half of a [`WebSocketTransport`].
pub struct WebSocketTransportReceiver<S> {
	stream: SplitStream<WebSocketStream<S>>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<S> WebSocketTransportReceiver<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	/// Forwards decoded frames until the socket or the consumer goes away.
	///
	/// A clean close (or dropped consumer) is `Ok`; socket failures are errors.
	pub async fn run(mut self) -> Result<()> {
		while let Some(frame) = self.stream.next().await {
			let frame = frame.map_err(|e| Error::TransportError(format!("Failed to read frame: {e}")))?;
			let decoded = match frame {
				Frame::Text(text) => serde_json::from_str::<Value>(&text),
				Frame::Binary(data) => serde_json::from_slice::<Value>(&data),
				Frame::Close(reason) => {
					tracing::debug!(target = "hr", ?reason, "DevTools websocket closed by peer");
					return Ok(());
				}
				_ => continue,
			};

			match decoded {
				Ok(value) => {
					if self.message_tx.send(value).is_err() {
						return Ok(());
					}
				}
				Err(e) => tracing::warn!(target = "hr", error = %e, "Dropping undecodable frame"),
			}
		}
		Ok(())
	}
}

impl<S> TransportReceiver for WebSocketTransportReceiver<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(WebSocketTransportReceiver::run(*self))
	}
}
