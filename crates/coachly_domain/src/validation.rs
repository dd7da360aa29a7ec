#![forbid(unsafe_code)]

//! Message body validation and spam heuristics.
//!
//! Validation runs before a message is persisted and before the send metric
//! is recorded. Failures are values, never panics: callers branch on the
//! returned `Result`.

use core::fmt;

use thiserror::Error;

/// Default upper bound on message length, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 5000;

/// Default case-insensitive forbidden substrings.
pub const DEFAULT_FORBIDDEN_WORDS: [&str; 3] = ["spam", "scam", "phishing"];

/// Reason a message body was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
	TooLong,
	Empty,
	ForbiddenContent,
	InvalidCharacters,
}

impl RejectionKind {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			RejectionKind::TooLong => "too_long",
			RejectionKind::Empty => "empty",
			RejectionKind::ForbiddenContent => "forbidden_content",
			RejectionKind::InvalidCharacters => "invalid_characters",
		}
	}
}

impl fmt::Display for RejectionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A rejected message body, with a user-presentable reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct MessageRejected {
	pub kind: RejectionKind,
	pub message: String,
}

impl MessageRejected {
	fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}
}

/// Validation options. All fields have sensible defaults.
#[derive(Debug, Clone)]
pub struct MessageRules {
	/// Maximum length in characters, checked against the untrimmed body.
	pub max_length: usize,
	/// Accept bodies whose trimmed form is empty.
	pub allow_empty: bool,
	/// Case-insensitive substrings that reject the body outright.
	pub forbidden_words: Vec<String>,
	/// Optional per-character allowlist. `None` accepts everything.
	pub allowed_chars: Option<fn(char) -> bool>,
}

impl Default for MessageRules {
	fn default() -> Self {
		Self {
			max_length: DEFAULT_MAX_LENGTH,
			allow_empty: false,
			forbidden_words: DEFAULT_FORBIDDEN_WORDS.iter().map(|w| w.to_string()).collect(),
			allowed_chars: None,
		}
	}
}

/// Validate a candidate message body against `rules`.
///
/// Checks run in a fixed order; the length check uses the untrimmed body, so
/// an over-long run of pure whitespace reports `too_long`, not `empty`.
pub fn validate_message(content: &str, rules: &MessageRules) -> Result<(), MessageRejected> {
	if content.chars().count() > rules.max_length {
		return Err(MessageRejected::new(
			RejectionKind::TooLong,
			format!("Message is too long (maximum {} characters)", rules.max_length),
		));
	}

	if !rules.allow_empty && content.trim().is_empty() {
		return Err(MessageRejected::new(RejectionKind::Empty, "Message cannot be empty"));
	}

	let lowered = content.to_lowercase();
	for word in &rules.forbidden_words {
		if !word.is_empty() && lowered.contains(&word.to_lowercase()) {
			return Err(MessageRejected::new(
				RejectionKind::ForbiddenContent,
				"Message contains forbidden content",
			));
		}
	}

	if let Some(allowed) = rules.allowed_chars
		&& !content.chars().all(allowed)
	{
		return Err(MessageRejected::new(
			RejectionKind::InvalidCharacters,
			"Message contains invalid characters",
		));
	}

	Ok(())
}

/// Normalize a message body for storage.
///
/// Collapses whitespace runs to a single space, strips C0/C1 control
/// characters and trims. Total and idempotent.
pub fn sanitize_message(content: &str) -> String {
	let mut out = String::with_capacity(content.len());
	let mut pending_space = false;

	for c in content.chars() {
		if c.is_whitespace() {
			pending_space = true;
			continue;
		}
		if is_control(c) {
			continue;
		}
		if pending_space && !out.is_empty() {
			out.push(' ');
		}
		pending_space = false;
		out.push(c);
	}

	out
}

/// C0 and C1 control ranges (U+0000–U+001F, U+007F–U+009F).
fn is_control(c: char) -> bool {
	matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}

/// Spam heuristics: any one triggering classifies the body as spam.
pub fn is_spam_message(content: &str) -> bool {
	let total_chars = content.chars().count();

	// Word repetition: >5 words with <30% unique.
	let words: Vec<&str> = content.split_whitespace().collect();
	if words.len() > 5 {
		let unique: std::collections::HashSet<&str> = words.iter().copied().collect();
		if (unique.len() as f64) / (words.len() as f64) < 0.3 {
			return true;
		}
	}

	// Excessive caps: >70% uppercase letters on bodies longer than 10 chars.
	if total_chars > 10 {
		let uppercase = content.chars().filter(|c| c.is_uppercase()).count();
		if (uppercase as f64) > (total_chars as f64) * 0.7 {
			return true;
		}
	}

	// Excessive punctuation: >30% of `!?.,;:` on bodies longer than 20 chars.
	if total_chars > 20 {
		let punctuation = content.chars().filter(|c| "!?.,;:".contains(*c)).count();
		if (punctuation as f64) > (total_chars as f64) * 0.3 {
			return true;
		}
	}

	false
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn accepts_body_at_exact_max_length() {
		let rules = MessageRules {
			max_length: 16,
			..MessageRules::default()
		};
		let body = "x".repeat(16);
		assert!(validate_message(&body, &rules).is_ok());
	}

	#[test]
	fn length_check_precedes_emptiness() {
		let rules = MessageRules {
			max_length: 8,
			..MessageRules::default()
		};

		// Pure whitespace past the limit is too_long, not empty.
		let body = " ".repeat(9);
		let err = validate_message(&body, &rules).unwrap_err();
		assert_eq!(err.kind, RejectionKind::TooLong);

		let body = " ".repeat(8);
		let err = validate_message(&body, &rules).unwrap_err();
		assert_eq!(err.kind, RejectionKind::Empty);
	}

	#[test]
	fn rejects_empty_unless_allowed() {
		let rules = MessageRules::default();
		assert_eq!(validate_message("   \t ", &rules).unwrap_err().kind, RejectionKind::Empty);

		let rules = MessageRules {
			allow_empty: true,
			..MessageRules::default()
		};
		assert!(validate_message("", &rules).is_ok());
	}

	#[test]
	fn forbidden_words_match_case_insensitively_anywhere() {
		let rules = MessageRules::default();
		for body in ["check this SpAm offer", "SCAM", "a phIshinG link", "prefixspamsuffix"] {
			let err = validate_message(body, &rules).unwrap_err();
			assert_eq!(err.kind, RejectionKind::ForbiddenContent, "body: {body}");
		}
		assert!(validate_message("a perfectly fine meal log", &rules).is_ok());
	}

	#[test]
	fn allowed_characters_gate_runs_last() {
		let rules = MessageRules {
			allowed_chars: Some(|c| c.is_ascii_alphanumeric() || c == ' '),
			..MessageRules::default()
		};
		assert!(validate_message("plain words only", &rules).is_ok());
		let err = validate_message("héllo", &rules).unwrap_err();
		assert_eq!(err.kind, RejectionKind::InvalidCharacters);
	}

	#[test]
	fn sanitize_strips_controls_and_collapses_whitespace() {
		assert_eq!(sanitize_message("  a\t\tb \u{0007}c  "), "a b c");
		assert_eq!(sanitize_message("a\u{0000}b"), "ab");
		assert_eq!(sanitize_message("\u{009F}"), "");
	}

	#[test]
	fn spam_repetition_and_uniqueness() {
		assert!(is_spam_message("buy buy buy buy buy buy"));
		assert!(!is_spam_message("three distinct words here now"));
	}

	#[test]
	fn spam_caps_and_punctuation() {
		assert!(is_spam_message("THISISALLCAPSYELLING"));
		assert!(!is_spam_message("CAPS ok"));
		assert!(is_spam_message("what?!?!?! no way!!! ....."));
		assert!(!is_spam_message("a normal sentence, with punctuation."));
	}

	proptest! {
		#[test]
		fn sanitize_is_idempotent(body in ".{0,200}") {
			let once = sanitize_message(&body);
			prop_assert_eq!(sanitize_message(&once), once.clone());
			prop_assert_eq!(once.trim(), once.as_str());
			prop_assert!(!once.contains("  "));
			prop_assert!(once.chars().all(|c| !is_control(c)));
		}
	}
}
