#![forbid(unsafe_code)]

//! Transport seam: a persistent publish/subscribe connection offering
//! row-change notifications filtered by a server-evaluated predicate and
//! ad-hoc broadcast channels for ephemeral events.
//!
//! The transport itself is an external collaborator; this crate only drives
//! it through the trait below.

use async_trait::async_trait;
use coachly_domain::{Message, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Raw status signals consumed from the transport's status callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
	Subscribed,
	ChannelError(Option<String>),
	TimedOut,
	Closed,
	/// Unrecognized-status fallback.
	Unknown(String),
}

/// Signals pushed on an open channel.
#[derive(Debug, Clone)]
pub enum ChannelSignal {
	Status(ChannelStatus),
	RowInserted(Message),
	Broadcast(serde_json::Value),
}

/// Transport operation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
	#[error("channel connect failed: {0}")]
	Connect(String),
	#[error("broadcast send failed: {0}")]
	Send(String),
	#[error("channel teardown failed: {0}")]
	Teardown(String),
}

/// Request to open a named channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
	pub channel: String,
	/// Server-evaluated row-insert predicate (messages channels only).
	pub insert_filter: Option<String>,
}

impl ChannelRequest {
	/// Messages channel with a row-insert filter.
	pub fn messages(channel: String, filter: String) -> Self {
		debug_assert!(filter_is_well_formed(&filter), "malformed realtime filter: {filter}");
		Self {
			channel,
			insert_filter: Some(filter),
		}
	}

	/// Ephemeral broadcast channel, no persistence and no filter.
	pub fn broadcast(channel: String) -> Self {
		Self {
			channel,
			insert_filter: None,
		}
	}
}

/// An open channel: a stream of signals until the transport closes it or the
/// channel is removed.
#[derive(Debug)]
pub struct ChannelConnection {
	pub signals: mpsc::Receiver<ChannelSignal>,
}

/// The persistent pub/sub connection the chat core runs on.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
	/// Open a channel and start its signal stream.
	async fn open_channel(&self, request: ChannelRequest) -> Result<ChannelConnection, TransportError>;

	/// Publish an ephemeral broadcast payload on a channel.
	async fn send_broadcast(&self, channel: &str, payload: serde_json::Value) -> Result<(), TransportError>;

	/// Tear down a channel subscription.
	async fn remove_channel(&self, channel: &str) -> Result<(), TransportError>;
}

/// Typing broadcast wire payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
	#[serde(rename = "userId")]
	pub user_id: String,
	#[serde(rename = "isTyping")]
	pub is_typing: bool,
}

/// Build the row-insert predicate for a message subscription.
///
/// Each side listens for inserts where `sender_id = other AND
/// receiver_id = self`. The literal `.and.` token is part of the transport's
/// filter grammar; a bare comma is the bug class the development-mode
/// assertion below catches.
pub fn insert_filter(self_id: &UserId, other_id: &UserId) -> String {
	let filter = format!(
		"sender_id=eq.{}.and.receiver_id=eq.{}",
		other_id.as_str(),
		self_id.as_str()
	);
	debug_assert!(filter_is_well_formed(&filter), "malformed realtime filter: {filter}");
	filter
}

/// Two equality conditions joined by an explicit `.and.` conjunction.
pub fn filter_is_well_formed(filter: &str) -> bool {
	!filter.contains(',') && filter.contains(".and.") && filter.matches("=eq.").count() == 2
}
