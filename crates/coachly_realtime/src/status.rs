#![forbid(unsafe_code)]

//! Per-channel connection status and the reconnection state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use coachly_telemetry::ChatErrorKind;

use crate::transport::ChannelStatus;

/// Default backoff base: the first retry waits this long.
pub const BASE_RECONNECT_DELAY: Duration = Duration::from_millis(1_000);

/// Maximum automatic reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Categorized transport failure, derived from raw status/error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
	Network,
	Auth,
	Server,
	Timeout,
	Unknown,
}

impl TransportErrorKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			TransportErrorKind::Network => "network",
			TransportErrorKind::Auth => "auth",
			TransportErrorKind::Server => "server",
			TransportErrorKind::Timeout => "timeout",
			TransportErrorKind::Unknown => "unknown",
		}
	}

	/// Best-effort categorization of raw error text.
	pub fn categorize(detail: &str) -> Self {
		let lowered = detail.to_lowercase();
		if ["auth", "jwt", "token", "401", "403", "unauthorized"]
			.iter()
			.any(|s| lowered.contains(s))
		{
			TransportErrorKind::Auth
		} else if lowered.contains("timeout") || lowered.contains("timed out") || lowered.contains("timed_out") {
			TransportErrorKind::Timeout
		} else if ["network", "fetch", "dns", "socket", "offline"].iter().any(|s| lowered.contains(s)) {
			TransportErrorKind::Network
		} else if ["server", "internal", "500", "502", "503"].iter().any(|s| lowered.contains(s)) {
			TransportErrorKind::Server
		} else {
			TransportErrorKind::Unknown
		}
	}

	/// Mapping into the chat error taxonomy for logging/metrics.
	pub const fn as_chat_error(self) -> ChatErrorKind {
		match self {
			TransportErrorKind::Network => ChatErrorKind::Network,
			TransportErrorKind::Auth => ChatErrorKind::Authentication,
			TransportErrorKind::Server => ChatErrorKind::Server,
			TransportErrorKind::Timeout => ChatErrorKind::Timeout,
			TransportErrorKind::Unknown => ChatErrorKind::Connection,
		}
	}
}

/// Transient per-subscription status, published on a watch channel.
///
/// Created at subscribe time with neutral defaults, mutated only by the
/// channel worker, discarded with the subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionStatus {
	pub connected: bool,
	pub reconnecting: bool,
	pub error: Option<String>,
	pub error_kind: Option<TransportErrorKind>,
	pub last_connected: Option<DateTime<Utc>>,
	pub reconnect_attempts: u32,
}

/// Explicit channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	Idle,
	Connecting,
	Connected,
	Reconnecting,
	GivenUp,
	Closed,
}

impl ChannelState {
	/// Transition on a transport status signal. Total over every
	/// (state, signal) pair.
	pub fn on_status(self, status: &ChannelStatus, attempts: u32, max_attempts: u32) -> ChannelState {
		if self.is_terminal() {
			return self;
		}
		match status {
			ChannelStatus::Subscribed => ChannelState::Connected,
			ChannelStatus::Closed => ChannelState::Closed,
			ChannelStatus::ChannelError(_) | ChannelStatus::TimedOut => {
				if attempts >= max_attempts {
					ChannelState::GivenUp
				} else {
					ChannelState::Reconnecting
				}
			}
			ChannelStatus::Unknown(_) => self,
		}
	}

	pub const fn is_terminal(self) -> bool {
		matches!(self, ChannelState::GivenUp | ChannelState::Closed)
	}
}

/// Exponential backoff: `base * 2^(attempt-1)`, attempts counted from 1.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
	base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// User-facing status text, escalating with attempt count.
pub fn user_facing_message(kind: TransportErrorKind, attempt: u32) -> String {
	let base = match kind {
		TransportErrorKind::Auth => "Authentication problem with the live connection",
		TransportErrorKind::Timeout => "Connection timed out",
		TransportErrorKind::Network => "Network connection lost",
		TransportErrorKind::Server => "Chat service error",
		TransportErrorKind::Unknown => "Connection interrupted",
	};

	match attempt {
		0 | 1 => format!("{base}. Reconnecting..."),
		2 | 3 => format!("{base}. Still reconnecting, check your internet connection."),
		_ => format!("{base}. Connection problems persist, you may need to refresh the page."),
	}
}

/// Terminal status text once the attempt cap is exceeded.
pub fn terminal_message() -> String {
	"Could not connect. Please refresh the page.".to_string()
}
