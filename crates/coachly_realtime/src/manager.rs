#![forbid(unsafe_code)]

//! Per-conversation realtime subscriptions.
//!
//! Each subscription runs as one background task that owns the channel's
//! state machine: it opens the transport channel, pumps its signal stream,
//! and on failure schedules exponential-backoff retries up to the attempt
//! cap. The task is the only writer of the subscription's status; retries
//! are serialized by the task loop, so at most one is pending per channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use coachly_domain::{ChatTopic, Message, TypingTopic, UserId};
use coachly_telemetry::{ChatErrorKind, ChatLogger, ChatMetrics};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::status::{
	BASE_RECONNECT_DELAY, ChannelState, ConnectionStatus, MAX_RECONNECT_ATTEMPTS, TransportErrorKind, backoff_delay,
	terminal_message, user_facing_message,
};
use crate::transport::{
	ChannelConnection, ChannelRequest, ChannelSignal, ChannelStatus, RealtimeTransport, TypingPayload, insert_filter,
};

/// Reconnection policy for a subscription.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
	pub base_delay: Duration,
	pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			base_delay: BASE_RECONNECT_DELAY,
			max_attempts: MAX_RECONNECT_ATTEMPTS,
		}
	}
}

/// Subscription manager configuration.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
	pub reconnect: ReconnectPolicy,

	/// Maximum queued events per subscriber.
	pub event_queue_capacity: usize,
}

impl Default for SubscriptionConfig {
	fn default() -> Self {
		Self {
			reconnect: ReconnectPolicy::default(),
			event_queue_capacity: 1_024,
		}
	}
}

/// Owns subscriptions over one transport and one metrics/logging context.
pub struct SubscriptionManager {
	transport: Arc<dyn RealtimeTransport>,
	metrics: Arc<ChatMetrics>,
	logger: ChatLogger,
	cfg: SubscriptionConfig,
}

/// A live message subscription: the inbound row stream plus live status.
pub struct MessageSubscription {
	pub messages: mpsc::Receiver<Message>,
	pub status: watch::Receiver<ConnectionStatus>,
	pub handle: SubscriptionHandle,
}

/// A live typing subscription: `true`/`false` typing signals from the peer.
pub struct TypingSubscription {
	pub events: mpsc::Receiver<bool>,
	pub handle: SubscriptionHandle,
}

/// Handle for tearing a subscription down.
///
/// `unsubscribe` is best-effort and idempotent: teardown failures are logged
/// by the worker and never surface here. Dropping the handle unsubscribes
/// too.
#[derive(Debug)]
pub struct SubscriptionHandle {
	channel: String,
	stop_tx: mpsc::Sender<()>,
}

impl SubscriptionHandle {
	pub fn channel(&self) -> &str {
		&self.channel
	}

	/// Request teardown. Safe to call any number of times.
	pub fn unsubscribe(&self) {
		let _ = self.stop_tx.try_send(());
	}
}

impl Drop for SubscriptionHandle {
	fn drop(&mut self) {
		let _ = self.stop_tx.try_send(());
	}
}

impl SubscriptionManager {
	pub fn new(transport: Arc<dyn RealtimeTransport>, metrics: Arc<ChatMetrics>, logger: ChatLogger) -> Self {
		Self::with_config(transport, metrics, logger, SubscriptionConfig::default())
	}

	pub fn with_config(
		transport: Arc<dyn RealtimeTransport>,
		metrics: Arc<ChatMetrics>,
		logger: ChatLogger,
		cfg: SubscriptionConfig,
	) -> Self {
		Self {
			transport,
			metrics,
			logger,
			cfg,
		}
	}

	/// Subscribe to new messages addressed from `other_id` to `self_id`.
	///
	/// The channel name is direction-specific, so the two participants of one
	/// logical conversation hold independent handles. Every inbound row is
	/// counted as delivered (keyed by the row's own ids) before it is
	/// forwarded on the stream. Rows arrive in transport order, not
	/// necessarily `created_at` order.
	pub fn subscribe_to_messages(&self, self_id: &UserId, other_id: &UserId) -> MessageSubscription {
		let channel = ChatTopic::format(self_id, other_id);
		let request = ChannelRequest::messages(channel.clone(), insert_filter(self_id, other_id));

		let (messages_tx, messages_rx) = mpsc::channel(self.cfg.event_queue_capacity);
		let (handle, status_rx) = self.spawn_worker(channel, request, self_id, other_id, Delivery::Messages(messages_tx));

		MessageSubscription {
			messages: messages_rx,
			status: status_rx,
			handle,
		}
	}

	/// Subscribe to the peer's typing signals on the ephemeral broadcast
	/// channel named for `(self_id, other_id)`.
	pub fn subscribe_to_typing(&self, self_id: &UserId, other_id: &UserId) -> TypingSubscription {
		let channel = TypingTopic::format(self_id, other_id);
		let request = ChannelRequest::broadcast(channel.clone());

		let (events_tx, events_rx) = mpsc::channel(self.cfg.event_queue_capacity);
		let (handle, _status_rx) = self.spawn_worker(channel, request, self_id, other_id, Delivery::Typing(events_tx));

		TypingSubscription {
			events: events_rx,
			handle,
		}
	}

	/// Broadcast a typing indicator to `other_id`.
	///
	/// Publishes on the recipient's channel naming order so it reaches their
	/// listener. Best-effort: failures are logged and swallowed, never
	/// returned.
	pub async fn send_typing_event(&self, self_id: &UserId, other_id: &UserId, is_typing: bool) {
		// The peer listens on typing:<other>:<self>.
		let channel = TypingTopic::format(other_id, self_id);
		let payload = serde_json::json!({
			"userId": self_id.as_str(),
			"isTyping": is_typing,
		});

		self.metrics.record_typing_event(self_id.as_str(), other_id.as_str());

		if let Err(err) = self.transport.send_broadcast(&channel, payload).await {
			self.logger.log_error(
				ChatErrorKind::Network,
				"typing broadcast failed; dropping",
				Some(&err),
				&[("channel", &channel)],
			);
		}
	}

	fn spawn_worker(
		&self,
		channel: String,
		request: ChannelRequest,
		self_id: &UserId,
		other_id: &UserId,
		delivery: Delivery,
	) -> (SubscriptionHandle, watch::Receiver<ConnectionStatus>) {
		let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
		let (stop_tx, stop_rx) = mpsc::channel(1);

		let logger = self.logger.child(&[
			("user_id", self_id.as_str()),
			("other_user_id", other_id.as_str()),
			("channel", &channel),
		]);
		logger.log_event("subscription_started", "opening realtime channel", &[]);

		let worker = ChannelWorker {
			transport: Arc::clone(&self.transport),
			metrics: Arc::clone(&self.metrics),
			logger,
			policy: self.cfg.reconnect.clone(),
			request,
			delivery,
			status_tx,
			stop_rx,
			status: ConnectionStatus::default(),
			state: ChannelState::Idle,
			attempts: 0,
		};
		tokio::spawn(worker.run());

		(SubscriptionHandle { channel, stop_tx }, status_rx)
	}
}

enum Delivery {
	Messages(mpsc::Sender<Message>),
	Typing(mpsc::Sender<bool>),
}

/// Outcome of pumping one open channel connection.
enum Pump {
	/// Clean stop: explicit unsubscribe, transport close, or consumer gone.
	Done,
	/// Failure to recover from, with its categorized kind.
	Retry(TransportErrorKind, String),
}

struct ChannelWorker {
	transport: Arc<dyn RealtimeTransport>,
	metrics: Arc<ChatMetrics>,
	logger: ChatLogger,
	policy: ReconnectPolicy,
	request: ChannelRequest,
	delivery: Delivery,
	status_tx: watch::Sender<ConnectionStatus>,
	stop_rx: mpsc::Receiver<()>,
	status: ConnectionStatus,
	state: ChannelState,
	attempts: u32,
}

impl ChannelWorker {
	async fn run(mut self) {
		loop {
			self.state = if self.attempts == 0 {
				ChannelState::Connecting
			} else {
				ChannelState::Reconnecting
			};

			let (kind, detail) = match self.transport.open_channel(self.request.clone()).await {
				Ok(connection) => match self.pump(connection).await {
					Pump::Done => return,
					Pump::Retry(kind, detail) => (kind, detail),
				},
				Err(err) => (TransportErrorKind::categorize(&err.to_string()), err.to_string()),
			};

			// A drop of an established channel closes that connection before
			// it counts as a failure, so the active gauge and the duration
			// histogram stay balanced across reconnect cycles.
			if self.status.connected {
				self.metrics.record_connection_closed(&self.request.channel);
				self.status.connected = false;
			}
			self.metrics
				.record_connection_failed(&self.request.channel, kind.as_chat_error().as_str());

			self.attempts += 1;
			self.state = self.state.on_status(
				&ChannelStatus::ChannelError(Some(detail.clone())),
				self.attempts,
				self.policy.max_attempts,
			);

			if self.attempts > self.policy.max_attempts {
				self.state = ChannelState::GivenUp;
				self.status.connected = false;
				self.status.reconnecting = false;
				self.status.error = Some(terminal_message());
				self.status.error_kind = Some(kind);
				self.status.reconnect_attempts = self.attempts;
				self.publish_status();

				self.logger.log_error(
					kind.as_chat_error(),
					"realtime channel gave up after maximum reconnection attempts",
					Some(&detail),
					&[("attempts", &self.attempts.to_string())],
				);
				return;
			}

			self.metrics.record_reconnect_attempt(&self.request.channel, self.attempts);

			self.status.connected = false;
			self.status.reconnecting = true;
			self.status.error = Some(user_facing_message(kind, self.attempts));
			self.status.error_kind = Some(kind);
			self.status.reconnect_attempts = self.attempts;
			self.publish_status();

			let delay = backoff_delay(self.policy.base_delay, self.attempts);
			debug!(
				channel = %self.request.channel,
				attempt = self.attempts,
				delay_ms = delay.as_millis() as u64,
				detail = %detail,
				"scheduling reconnect"
			);

			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = self.stop_rx.recv() => {
					self.teardown().await;
					return;
				}
			}
		}
	}

	async fn pump(&mut self, mut connection: ChannelConnection) -> Pump {
		loop {
			tokio::select! {
				_ = self.stop_rx.recv() => {
					self.teardown().await;
					return Pump::Done;
				}
				signal = connection.signals.recv() => {
					let Some(signal) = signal else {
						return Pump::Retry(TransportErrorKind::Unknown, "signal stream ended".to_string());
					};
					match signal {
						ChannelSignal::Status(status) => {
							if let Some(outcome) = self.on_transport_status(status) {
								return outcome;
							}
						}
						ChannelSignal::RowInserted(message) => {
							if !self.forward_message(message).await {
								self.teardown().await;
								return Pump::Done;
							}
						}
						ChannelSignal::Broadcast(value) => self.forward_broadcast(value).await,
					}
				}
			}
		}
	}

	/// Handle one status signal; `Some` ends the pump loop.
	fn on_transport_status(&mut self, status: ChannelStatus) -> Option<Pump> {
		self.state = self.state.on_status(&status, self.attempts, self.policy.max_attempts);

		match status {
			ChannelStatus::Subscribed => {
				// A successful subscribe resets the backoff; any pending
				// retry was already consumed by reaching this connection.
				self.attempts = 0;
				self.metrics.record_connection_established(&self.request.channel);

				self.status.connected = true;
				self.status.reconnecting = false;
				self.status.error = None;
				self.status.error_kind = None;
				self.status.last_connected = Some(Utc::now());
				self.status.reconnect_attempts = 0;
				self.publish_status();

				self.logger.log_event("channel_subscribed", "realtime channel connected", &[]);
				None
			}
			ChannelStatus::ChannelError(detail) => {
				let detail = detail.unwrap_or_else(|| "channel error".to_string());
				Some(Pump::Retry(TransportErrorKind::categorize(&detail), detail))
			}
			ChannelStatus::TimedOut => Some(Pump::Retry(TransportErrorKind::Timeout, "subscribe timed out".to_string())),
			ChannelStatus::Closed => {
				// Explicit close is not an error: no retry is scheduled. A
				// close before any subscribe has no connection to account for.
				if self.status.connected {
					self.metrics.record_connection_closed(&self.request.channel);
				}

				self.status.connected = false;
				self.status.reconnecting = false;
				self.publish_status();

				self.logger.log_event("channel_closed", "realtime channel closed", &[]);
				Some(Pump::Done)
			}
			ChannelStatus::Unknown(raw) => {
				debug!(channel = %self.request.channel, status = %raw, "unrecognized channel status");
				None
			}
		}
	}

	/// Deliver a row to the subscriber. Returns `false` once the consumer is
	/// gone.
	async fn forward_message(&self, message: Message) -> bool {
		// Delivery is recorded with the row's own ids, before the consumer
		// sees it.
		self.metrics.record_message_delivered(
			message.id.as_str(),
			message.sender_id.as_str(),
			message.receiver_id.as_str(),
		);

		match &self.delivery {
			Delivery::Messages(tx) => tx.send(message).await.is_ok(),
			Delivery::Typing(_) => true,
		}
	}

	async fn forward_broadcast(&self, value: serde_json::Value) {
		let Delivery::Typing(tx) = &self.delivery else {
			return;
		};
		match serde_json::from_value::<TypingPayload>(value) {
			Ok(payload) => {
				let _ = tx.send(payload.is_typing).await;
			}
			Err(err) => {
				debug!(channel = %self.request.channel, error = %err, "undecodable typing broadcast");
			}
		}
	}

	/// Best-effort transport teardown: failures are logged, never re-thrown,
	/// because cleanup must not crash call sites.
	async fn teardown(&mut self) {
		self.state = ChannelState::Closed;
		if self.status.connected {
			self.metrics.record_connection_closed(&self.request.channel);
		}
		self.status.connected = false;
		self.status.reconnecting = false;
		self.publish_status();

		if let Err(err) = self.transport.remove_channel(&self.request.channel).await {
			warn!(channel = %self.request.channel, error = %err, "channel teardown failed; ignoring");
		}
		self.logger.log_event("subscription_stopped", "realtime channel unsubscribed", &[]);
	}

	fn publish_status(&self) {
		let _ = self.status_tx.send(self.status.clone());
	}
}
