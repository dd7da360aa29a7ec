#![forbid(unsafe_code)]

pub mod validation;

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for constructing domain identifiers and models.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
	#[error("empty value")]
	Empty,
	#[error("sender and receiver must differ")]
	SameParticipants,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Participant identifier (client, coach or curator account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
	/// Create a non-empty `UserId`.
	pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(DomainError::Empty);
		}
		Ok(Self(id))
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for UserId {
	type Err = DomainError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		UserId::new(s.to_string())
	}
}

/// Opaque message row identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
	/// Create a non-empty `MessageId`.
	pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(DomainError::Empty);
		}
		Ok(Self(id))
	}

	/// Mint a fresh random id (fixtures and locally created rows).
	pub fn new_v4() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// One chat message row.
///
/// `content` is immutable once created except for soft deletion; deleted
/// messages are excluded from conversation loads but never physically removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	pub id: MessageId,
	pub sender_id: UserId,
	pub receiver_id: UserId,
	pub content: String,
	pub created_at: DateTime<Utc>,
	pub read_at: Option<DateTime<Utc>>,
	pub is_deleted: bool,
}

impl Message {
	/// Create a message row. Enforces `sender_id != receiver_id`.
	pub fn new(
		id: MessageId,
		sender_id: UserId,
		receiver_id: UserId,
		content: impl Into<String>,
		created_at: DateTime<Utc>,
	) -> Result<Self, DomainError> {
		if sender_id == receiver_id {
			return Err(DomainError::SameParticipants);
		}
		Ok(Self {
			id,
			sender_id,
			receiver_id,
			content: content.into(),
			created_at,
			read_at: None,
			is_deleted: false,
		})
	}

	/// Unread means `read_at` is null.
	pub fn is_unread(&self) -> bool {
		self.read_at.is_none()
	}

	/// Mark as read at the given instant. No-op if already read.
	pub fn mark_read(&mut self, at: DateTime<Utc>) {
		if self.read_at.is_none() {
			self.read_at = Some(at);
		}
	}

	/// Soft-delete: the row stays, content stays, loads skip it.
	pub fn soft_delete(&mut self) {
		self.is_deleted = true;
	}

	/// Whether this row belongs to the given conversation (either direction).
	pub fn belongs_to(&self, key: &ConversationKey) -> bool {
		key.contains(&self.sender_id) && key.contains(&self.receiver_id)
	}
}

/// Unordered participant pair identifying a conversation.
///
/// Not a stored entity; the pair is normalized so `(a, b)` and `(b, a)`
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
	first: UserId,
	second: UserId,
}

impl ConversationKey {
	/// Build a conversation key from two distinct participants.
	pub fn new(a: UserId, b: UserId) -> Result<Self, DomainError> {
		if a == b {
			return Err(DomainError::SameParticipants);
		}
		if a.as_str() <= b.as_str() {
			Ok(Self { first: a, second: b })
		} else {
			Ok(Self { first: b, second: a })
		}
	}

	pub fn contains(&self, user: &UserId) -> bool {
		&self.first == user || &self.second == user
	}

	/// The peer of `user`, if `user` participates at all.
	pub fn other(&self, user: &UserId) -> Option<&UserId> {
		if &self.first == user {
			Some(&self.second)
		} else if &self.second == user {
			Some(&self.first)
		} else {
			None
		}
	}
}

impl fmt::Display for ConversationKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}<->{}", self.first, self.second)
	}
}

/// Filter a message set down to one conversation.
///
/// Keeps non-deleted rows matching the pair in either direction, sorted
/// ascending by `created_at`. Ties keep arrival order.
pub fn conversation_messages(messages: impl IntoIterator<Item = Message>, key: &ConversationKey) -> Vec<Message> {
	let mut out: Vec<Message> = messages
		.into_iter()
		.filter(|m| !m.is_deleted && m.belongs_to(key))
		.collect();
	out.sort_by_key(|m| m.created_at);
	out
}

/// Count unread messages addressed to `receiver` within one conversation.
pub fn unread_count<'a>(messages: impl IntoIterator<Item = &'a Message>, key: &ConversationKey, receiver: &UserId) -> usize {
	messages
		.into_iter()
		.filter(|m| !m.is_deleted && m.belongs_to(key) && &m.receiver_id == receiver && m.is_unread())
		.count()
}

/// Topic helpers for per-direction message channels.
///
/// Channel names are wire-visible: two participants of one logical
/// conversation hold two differently-named channels (swapped argument order).
pub struct ChatTopic;

impl ChatTopic {
	/// Prefix for message channels.
	pub const PREFIX: &'static str = "chat:";

	/// Format a message channel name (e.g. `chat:alice:bob`).
	pub fn format(self_id: &UserId, other_id: &UserId) -> String {
		format!("{}{}:{}", Self::PREFIX, self_id.as_str(), other_id.as_str())
	}

	/// Parse a channel name of the form `chat:<self>:<other>`.
	pub fn parse(s: &str) -> Result<(UserId, UserId), DomainError> {
		parse_pair_topic(s, Self::PREFIX, "chat:<self>:<other>")
	}
}

/// Topic helpers for ephemeral typing broadcast channels.
pub struct TypingTopic;

impl TypingTopic {
	/// Prefix for typing channels.
	pub const PREFIX: &'static str = "typing:";

	/// Format a typing channel name (e.g. `typing:alice:bob`).
	pub fn format(self_id: &UserId, other_id: &UserId) -> String {
		format!("{}{}:{}", Self::PREFIX, self_id.as_str(), other_id.as_str())
	}

	/// Parse a channel name of the form `typing:<self>:<other>`.
	pub fn parse(s: &str) -> Result<(UserId, UserId), DomainError> {
		parse_pair_topic(s, Self::PREFIX, "typing:<self>:<other>")
	}
}

fn parse_pair_topic(s: &str, prefix: &str, expected: &str) -> Result<(UserId, UserId), DomainError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(DomainError::Empty);
	}

	let rest = s
		.strip_prefix(prefix)
		.ok_or_else(|| DomainError::InvalidFormat(format!("expected {expected}")))?;

	let (self_s, other_s) = rest
		.split_once(':')
		.ok_or_else(|| DomainError::InvalidFormat(format!("expected {expected}")))?;

	let self_id = UserId::new(self_s.to_string())?;
	let other_id = UserId::new(other_s.to_string())?;
	Ok((self_id, other_id))
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;

	use super::*;

	fn user(s: &str) -> UserId {
		UserId::new(s).expect("valid UserId")
	}

	fn at(secs: i64) -> DateTime<Utc> {
		Utc.timestamp_opt(secs, 0).unwrap()
	}

	fn msg(id: &str, from: &str, to: &str, secs: i64) -> Message {
		Message::new(
			MessageId::new(id).unwrap(),
			user(from),
			user(to),
			format!("m-{id}"),
			at(secs),
		)
		.unwrap()
	}

	#[test]
	fn rejects_empty_ids() {
		assert!(UserId::new("").is_err());
		assert!(UserId::new("   ").is_err());
		assert!(MessageId::new("").is_err());
	}

	#[test]
	fn rejects_self_conversation() {
		assert_eq!(
			Message::new(MessageId::new_v4(), user("a"), user("a"), "hi", at(0)),
			Err(DomainError::SameParticipants),
		);
		assert!(ConversationKey::new(user("a"), user("a")).is_err());
	}

	#[test]
	fn conversation_key_is_unordered() {
		let ab = ConversationKey::new(user("a"), user("b")).unwrap();
		let ba = ConversationKey::new(user("b"), user("a")).unwrap();
		assert_eq!(ab, ba);
		assert_eq!(ab.other(&user("a")), Some(&user("b")));
		assert_eq!(ab.other(&user("c")), None);
	}

	#[test]
	fn conversation_load_excludes_soft_deletes_and_foreign_pairs() {
		let key = ConversationKey::new(user("a"), user("b")).unwrap();

		let mut deleted = msg("3", "a", "b", 30);
		deleted.soft_delete();
		assert_eq!(deleted.content, "m-3");

		let rows = vec![
			msg("2", "b", "a", 20),
			deleted,
			msg("4", "a", "c", 5),
			msg("1", "a", "b", 10),
		];

		let loaded = conversation_messages(rows, &key);
		let ids: Vec<&str> = loaded.iter().map(|m| m.id.as_str()).collect();
		assert_eq!(ids, vec!["1", "2"]);
	}

	#[test]
	fn unread_counting_is_receiver_scoped() {
		let key = ConversationKey::new(user("a"), user("b")).unwrap();

		let mut read = msg("1", "b", "a", 10);
		read.mark_read(at(11));
		assert!(!read.is_unread());

		let rows = vec![read, msg("2", "b", "a", 20), msg("3", "a", "b", 30)];
		assert_eq!(unread_count(rows.iter(), &key, &user("a")), 1);
		assert_eq!(unread_count(rows.iter(), &key, &user("b")), 1);
	}

	#[test]
	fn chat_topic_roundtrip() {
		let name = ChatTopic::format(&user("alice"), &user("bob"));
		assert_eq!(name, "chat:alice:bob");
		let (s, o) = ChatTopic::parse(&name).unwrap();
		assert_eq!(s.as_str(), "alice");
		assert_eq!(o.as_str(), "bob");
	}

	#[test]
	fn typing_topic_roundtrip() {
		let name = TypingTopic::format(&user("bob"), &user("alice"));
		assert_eq!(name, "typing:bob:alice");
		assert!(TypingTopic::parse("chat:a:b").is_err());
		assert!(TypingTopic::parse("typing:a").is_err());
	}

	#[test]
	fn topics_differ_per_direction() {
		assert_ne!(
			ChatTopic::format(&user("a"), &user("b")),
			ChatTopic::format(&user("b"), &user("a")),
		);
	}
}
