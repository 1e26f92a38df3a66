//! Duplex text transports.
//!
//! A [`Connector`] yields a [`LinkChannel`]: an outbound queue of text frames
//! and an inbound receiver that closes when the peer goes away. The WebSocket
//! implementation pumps both directions on a background task.

use crate::{LinkError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as TungsteniteMessage};
use tracing::{debug, error, info, trace};

const CHANNEL_CAPACITY: usize = 64;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const DEAD_AFTER: Duration = Duration::from_secs(120);

/// One live connection. Dropping `outbound` closes the connection.
#[derive(Debug)]
pub struct LinkChannel {
	pub outbound: mpsc::Sender<String>,
	pub inbound: mpsc::Receiver<String>,
}

impl LinkChannel {
	/// Build a channel plus the far ends, for in-memory peers.
	#[must_use]
	pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<String>, mpsc::Sender<String>) {
		let (out_tx, out_rx) = mpsc::channel(capacity);
		let (in_tx, in_rx) = mpsc::channel(capacity);
		(
			Self {
				outbound: out_tx,
				inbound: in_rx,
			},
			out_rx,
			in_tx,
		)
	}
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
	async fn connect(&self) -> Result<LinkChannel>;
}

/// Connects to a `ws://` endpoint
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
	url: String,
}

impl WebSocketConnector {
	pub fn new(url: impl Into<String>) -> Self {
		Self { url: url.into() }
	}

	#[must_use]
	pub fn url(&self) -> &str {
		&self.url
	}
}

#[async_trait]
impl Connector for WebSocketConnector {
	async fn connect(&self) -> Result<LinkChannel> {
		let (ws_stream, _) = connect_async(self.url.as_str()).await.map_err(LinkError::WebSocket)?;
		info!(url = %self.url, "websocket connected");

		let (channel, mut out_rx, in_tx) = LinkChannel::pair(CHANNEL_CAPACITY);
		let (mut sink, mut stream) = ws_stream.split();
		let url = self.url.clone();

		tokio::spawn(async move {
			let mut last_activity = Instant::now();
			let mut ping_interval = tokio::time::interval(PING_INTERVAL);
			ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

			loop {
				tokio::select! {
					msg = stream.next() => {
						match msg {
							Some(Ok(TungsteniteMessage::Text(text))) => {
								last_activity = Instant::now();
								trace!(len = text.len(), "frame received");
								if in_tx.send(text.to_string()).await.is_err() {
									debug!("inbound receiver dropped, closing");
									break;
								}
							}
							Some(Ok(TungsteniteMessage::Ping(payload))) => {
								last_activity = Instant::now();
								let _ = sink.send(TungsteniteMessage::Pong(payload)).await;
							}
							Some(Ok(TungsteniteMessage::Pong(_))) => {
								last_activity = Instant::now();
							}
							Some(Ok(TungsteniteMessage::Close(_))) => {
								info!(%url, "websocket close frame received");
								break;
							}
							Some(Err(e)) => {
								error!(%url, "websocket error: {}", e);
								break;
							}
							None => {
								info!(%url, "websocket stream ended");
								break;
							}
							_ => {}
						}
					}
					out = out_rx.recv() => {
						match out {
							Some(text) => {
								if let Err(e) = sink.send(TungsteniteMessage::Text(text.into())).await {
									error!(%url, "failed to send frame: {}", e);
									break;
								}
							}
							None => {
								let _ = sink.send(TungsteniteMessage::Close(None)).await;
								break;
							}
						}
					}
					_ = ping_interval.tick() => {
						if last_activity.elapsed() > DEAD_AFTER {
							error!(%url, "connection appears dead (no activity for {:?}), breaking", DEAD_AFTER);
							break;
						}
						if sink.send(TungsteniteMessage::Ping(Vec::new().into())).await.is_err() {
							error!(%url, "failed to send ping, connection likely dead");
							break;
						}
					}
				}
			}
		});

		Ok(channel)
	}
}
