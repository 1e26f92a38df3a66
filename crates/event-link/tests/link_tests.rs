use async_trait::async_trait;
use event_link::{Connector, DeviceEvent, EventLink, LinkChannel, LinkError, Result, RetryConfig};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Far end of an in-memory connection
struct Peer {
	sent: mpsc::Receiver<String>,
	events: mpsc::Sender<String>,
}

fn peer() -> (LinkChannel, Peer) {
	let (channel, sent, events) = LinkChannel::pair(16);
	(channel, Peer { sent, events })
}

/// Hands out prepared channels in order, then refuses
struct ScriptedConnector {
	channels: Mutex<VecDeque<LinkChannel>>,
	attempts: mpsc::UnboundedSender<Instant>,
}

impl ScriptedConnector {
	fn new(channels: Vec<LinkChannel>) -> (Self, mpsc::UnboundedReceiver<Instant>) {
		let (attempts, attempt_rx) = mpsc::unbounded_channel();
		(
			Self {
				channels: Mutex::new(channels.into()),
				attempts,
			},
			attempt_rx,
		)
	}
}

#[async_trait]
impl Connector for ScriptedConnector {
	async fn connect(&self) -> Result<LinkChannel> {
		let _ = self.attempts.send(Instant::now());
		let next = self.channels.lock().unwrap().pop_front();
		next.ok_or_else(|| LinkError::Connect("device unreachable".to_string()))
	}
}

fn frame(kind: &str, seq: u64, payload: Value) -> String {
	json!({ "type": kind, "v": 1, "seq": seq, "device_id": "dev-1", "ts": 1_700_000_000_000_i64, "payload": payload }).to_string()
}

async fn recv_json(rx: &mut mpsc::Receiver<String>) -> Value {
	let text = rx.recv().await.expect("link closed before sending");
	serde_json::from_str(&text).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_resume_request_carries_last_seq_after_reconnect() {
	let (first, mut peer1) = peer();
	let (second, mut peer2) = peer();
	let (connector, _attempts) = ScriptedConnector::new(vec![first, second]);
	let token = CancellationToken::new();
	let (link, handle) = EventLink::new(connector, RetryConfig::default(), &token);
	let task = link.spawn();

	assert_eq!(recv_json(&mut peer1.sent).await, json!({ "type": "sync_request", "last_seq": 0 }));

	peer1.events.send(frame("heartbeat", 5, json!({}))).await.unwrap();
	handle.watch_session().wait_for(|s| s.last_seq == 5).await.unwrap();

	drop(peer1);

	assert_eq!(recv_json(&mut peer2.sent).await, json!({ "type": "sync_request", "last_seq": 5 }));

	let session = handle.session().await.unwrap();
	assert!(session.connected);
	assert_eq!(session.last_seq, 5);
	assert_eq!(session.reconnect_attempts, 0);

	handle.shutdown();
	task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_and_malformed_frames() {
	let (channel, mut peer) = peer();
	let (connector, _attempts) = ScriptedConnector::new(vec![channel]);
	let token = CancellationToken::new();
	let (link, handle) = EventLink::new(connector, RetryConfig::default(), &token);
	let task = link.spawn();

	recv_json(&mut peer.sent).await;

	for seq in [7, 3, 9, 9] {
		peer.events.send(frame("heartbeat", seq, json!({}))).await.unwrap();
	}
	handle.watch_session().wait_for(|s| s.last_seq == 9).await.unwrap();

	peer.events.send("{not json".to_string()).await.unwrap();
	peer.events.send(r#"{"seq": 100}"#.to_string()).await.unwrap();
	peer.events.send(frame("heartbeat", 2, json!({}))).await.unwrap();
	peer.events.send(frame("heartbeat", 10, json!({}))).await.unwrap();
	handle.watch_session().wait_for(|s| s.last_seq == 10).await.unwrap();

	let session = handle.session().await.unwrap();
	assert!(session.connected);
	assert_eq!(session.last_seq, 10);
	assert_eq!(session.reconnect_attempts, 0);
	assert!(peer.sent.try_recv().is_err(), "no second resume request expected");

	token.cancel();
	task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_events_are_dispatched_to_subscribers() {
	let (channel, mut peer) = peer();
	let (connector, _attempts) = ScriptedConnector::new(vec![channel]);
	let token = CancellationToken::new();
	let (link, handle) = EventLink::new(connector, RetryConfig::default(), &token);
	let mut events = handle.subscribe();
	let task = link.spawn();

	recv_json(&mut peer.sent).await;

	peer.events.send(frame("mystery.event", 1, json!({ "x": 1 }))).await.unwrap();
	peer.events
		.send(frame("input.signal_changed", 2, json!({ "input": "cam-1", "has_signal": true })))
		.await
		.unwrap();

	let unknown = events.recv().await.unwrap();
	assert_eq!(unknown.event, DeviceEvent::Unknown { kind: "mystery.event".to_string() });

	let signal = events.recv().await.unwrap();
	assert_eq!(signal.seq, Some(2));
	assert_eq!(
		signal.event,
		DeviceEvent::SignalChanged {
			input: "cam-1".to_string(),
			has_signal: true,
			resolution: None,
		}
	);

	token.cancel();
	task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempts_back_off_exponentially() {
	let (connector, mut attempts) = ScriptedConnector::new(Vec::new());
	let token = CancellationToken::new();
	let (link, handle) = EventLink::new(connector, RetryConfig::default(), &token);
	let task = link.spawn();

	let mut instants = Vec::new();
	for _ in 0..5 {
		instants.push(attempts.recv().await.unwrap());
	}

	let gaps: Vec<Duration> = instants.windows(2).map(|w| w[1] - w[0]).collect();
	assert_eq!(gaps, vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]);

	let session = handle.session().await.unwrap();
	assert!(!session.connected);
	assert!(session.reconnect_attempts >= 4);

	handle.shutdown();
	task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_now_skips_backoff() {
	let (connector, mut attempts) = ScriptedConnector::new(Vec::new());
	let token = CancellationToken::new();
	let (link, handle) = EventLink::new(connector, RetryConfig::default(), &token);
	let task = link.spawn();

	let first = attempts.recv().await.unwrap();
	handle.reconnect_now();
	let second = attempts.recv().await.unwrap();

	assert!(second - first < Duration::from_secs(1));

	handle.shutdown();
	task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_outbound_messages_only_flow_while_connected() {
	let (channel, mut peer) = peer();
	let (connector, _attempts) = ScriptedConnector::new(vec![channel]);
	let token = CancellationToken::new();
	let (link, handle) = EventLink::new(connector, RetryConfig::default(), &token);
	let task = link.spawn();

	recv_json(&mut peer.sent).await;

	handle.send("tally", json!({ "on_air": true }));
	assert_eq!(recv_json(&mut peer.sent).await, json!({ "type": "tally", "payload": { "on_air": true } }));

	drop(peer.events);
	handle.watch_session().wait_for(|s| !s.connected).await.unwrap();

	// Disconnected: accepted without error, never delivered.
	handle.send("tally", json!({ "on_air": false }));
	let session = handle.session().await.unwrap();
	assert!(!session.connected);

	token.cancel();
	task.await.unwrap();
}
