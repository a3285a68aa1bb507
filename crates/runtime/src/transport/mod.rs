//! WebSocket dialing and frame decoding.
//!
//! The transport layer knows nothing about generations or routing. It turns a
//! worker URL into a split sink/stream pair and converts WebSocket messages
//! into [`Frame`]s the read loop can act on.

use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

/// Parses a worker URL, mapping `http`/`https` onto `ws`/`wss`.
pub fn normalize_url(raw: &str) -> Result<Url> {
	let invalid = |reason: String| Error::InvalidUrl {
		url: raw.to_string(),
		reason,
	};

	let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
	let scheme = match url.scheme() {
		"ws" | "wss" => return Ok(url),
		"http" => "ws",
		"https" => "wss",
		other => return Err(invalid(format!("unsupported scheme '{other}'"))),
	};
	url.set_scheme(scheme)
		.map_err(|()| invalid(format!("cannot switch scheme to '{scheme}'")))?;
	Ok(url)
}

/// Opens a WebSocket to the worker, bounded by `handshake_timeout`.
pub(crate) async fn dial(url: &Url, handshake_timeout: Duration) -> Result<(WsSink, WsSource)> {
	debug!(target = "devdrive", url = %url, "dialing worker");

	let connecting = tokio_tungstenite::connect_async(url.as_str());
	let (stream, _response) = tokio::time::timeout(handshake_timeout, connecting)
		.await
		.map_err(|_| Error::HandshakeTimeout(handshake_timeout))?
		.map_err(|e| Error::ConnectionFailed(e.to_string()))?;

	Ok(stream.split())
}

/// What the read loop should do with one WebSocket message.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
	/// Application payload, text or binary.
	Data(Vec<u8>),
	/// Peer closed the socket.
	Closed,
	/// Protocol-level ping/pong, answered by tungstenite itself.
	Skip,
}

impl From<Message> for Frame {
	fn from(message: Message) -> Self {
		match message {
			Message::Text(text) => Frame::Data(text.into_bytes()),
			Message::Binary(bytes) => Frame::Data(bytes),
			Message::Close(_) => Frame::Closed,
			Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Frame::Skip,
		}
	}
}
