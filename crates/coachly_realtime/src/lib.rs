#![forbid(unsafe_code)]

//! Realtime chat delivery: per-conversation subscriptions over a pluggable
//! transport, with automatic reconnection, typing indicators and request
//! retries.

pub mod manager;
pub mod retry;
pub mod status;
pub mod transport;

#[cfg(test)]
mod mock;



pub use manager::{
	MessageSubscription, ReconnectPolicy, SubscriptionConfig, SubscriptionHandle, SubscriptionManager, TypingSubscription,
};
pub use retry::{RequestDesc, RequestError, RetryPolicy, with_retry};
pub use status::{
	BASE_RECONNECT_DELAY, ChannelState, ConnectionStatus, MAX_RECONNECT_ATTEMPTS, TransportErrorKind, backoff_delay,
	terminal_message, user_facing_message,
};
pub use transport::{
	ChannelConnection, ChannelRequest, ChannelSignal, ChannelStatus, RealtimeTransport, TransportError, TypingPayload,
	insert_filter,
};
