#![forbid(unsafe_code)]

//! Scripted in-memory transport for subscription tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::transport::{ChannelConnection, ChannelRequest, ChannelSignal, ChannelStatus, RealtimeTransport, TransportError};

/// One scripted channel lifetime: the signals to play back, then either hold
/// the stream open or end it.
#[derive(Debug, Clone)]
pub struct MockScript {
	pub signals: Vec<ChannelSignal>,
	pub hold_open: bool,
}

impl MockScript {
	pub fn subscribed_and_hold() -> Self {
		Self {
			signals: vec![ChannelSignal::Status(ChannelStatus::Subscribed)],
			hold_open: true,
		}
	}

	pub fn error(detail: &str) -> Self {
		Self {
			signals: vec![ChannelSignal::Status(ChannelStatus::ChannelError(Some(detail.to_string())))],
			hold_open: false,
		}
	}
}

#[derive(Default)]
struct MockState {
	scripts: HashMap<String, VecDeque<MockScript>>,
	opened: Vec<ChannelRequest>,
	broadcasts: Vec<(String, serde_json::Value)>,
	removed: Vec<String>,
	fail_broadcasts_on: HashSet<String>,
	fail_remove_on: HashSet<String>,
}

/// Transport double that plays back per-channel scripts.
///
/// Channels without a script default to subscribe-and-hold.
#[derive(Default)]
pub struct MockTransport {
	state: Arc<Mutex<MockState>>,
}

impl MockTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queue a script for the next open of `channel`. Scripts are consumed in
	/// order, one per open.
	pub fn script(&self, channel: &str, script: MockScript) {
		self.state.lock().scripts.entry(channel.to_string()).or_default().push_back(script);
	}

	pub fn fail_broadcasts_on(&self, channel: &str) {
		self.state.lock().fail_broadcasts_on.insert(channel.to_string());
	}

	pub fn fail_remove_on(&self, channel: &str) {
		self.state.lock().fail_remove_on.insert(channel.to_string());
	}

	pub fn opened(&self) -> Vec<ChannelRequest> {
		self.state.lock().opened.clone()
	}

	pub fn open_count(&self, channel: &str) -> usize {
		self.state.lock().opened.iter().filter(|r| r.channel == channel).count()
	}

	pub fn broadcasts(&self) -> Vec<(String, serde_json::Value)> {
		self.state.lock().broadcasts.clone()
	}

	pub fn removed(&self) -> Vec<String> {
		self.state.lock().removed.clone()
	}
}

#[async_trait]
impl RealtimeTransport for MockTransport {
	async fn open_channel(&self, request: ChannelRequest) -> Result<ChannelConnection, TransportError> {
		let script = {
			let mut state = self.state.lock();
			state.opened.push(request.clone());
			state
				.scripts
				.get_mut(&request.channel)
				.and_then(VecDeque::pop_front)
				.unwrap_or_else(MockScript::subscribed_and_hold)
		};

		let (tx, rx) = mpsc::channel(16);
		tokio::spawn(async move {
			for signal in script.signals {
				if tx.send(signal).await.is_err() {
					return;
				}
			}
			if script.hold_open {
				// Keep the stream alive until the receiver is dropped.
				tx.closed().await;
			}
		});

		Ok(ChannelConnection { signals: rx })
	}

	async fn send_broadcast(&self, channel: &str, payload: serde_json::Value) -> Result<(), TransportError> {
		let mut state = self.state.lock();
		if state.fail_broadcasts_on.contains(channel) {
			return Err(TransportError::Send("broadcast rejected".to_string()));
		}
		state.broadcasts.push((channel.to_string(), payload));
		Ok(())
	}

	async fn remove_channel(&self, channel: &str) -> Result<(), TransportError> {
		let mut state = self.state.lock();
		state.removed.push(channel.to_string());
		if state.fail_remove_on.contains(channel) {
			return Err(TransportError::Teardown("remove rejected".to_string()));
		}
		Ok(())
	}
}
