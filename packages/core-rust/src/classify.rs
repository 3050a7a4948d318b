//! Sender classification: an ordered table of substring rules.
//!
//! Each rule names the handler that owns a newsletter source and whether that
//! handler runs in-line or on the background queue. Rules are evaluated in
//! registration order and the first rule whose substring set hits the sender
//! wins. The table is immutable once built and safe to share across threads.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Strategy / HandlerId
// ---------------------------------------------------------------------------

/// How a classified notification is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Run the handler in the request's own task and return its result.
    #[serde(alias = "sync")]
    Synchronous,
    /// Submit the payload to the broker and return a task id.
    #[serde(alias = "async")]
    Asynchronous,
}

impl Strategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synchronous => "synchronous",
            Self::Asynchronous => "asynchronous",
        }
    }
}

/// Identifier of a registered notification handler (e.g. `"creativity-daily"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(String);

impl HandlerId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for HandlerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for HandlerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// ClassificationRule
// ---------------------------------------------------------------------------

/// One `(pattern-set, strategy, handler)` entry of the classification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Literal, case-sensitive substrings; any hit selects this rule.
    pub match_substrings: Vec<String>,
    pub strategy: Strategy,
    pub handler_id: HandlerId,
}

impl ClassificationRule {
    #[must_use]
    pub fn new<I, S>(handler_id: impl Into<HandlerId>, strategy: Strategy, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            match_substrings: substrings.into_iter().map(Into::into).collect(),
            strategy,
            handler_id: handler_id.into(),
        }
    }

    /// Whether the sender contains any of this rule's substrings verbatim.
    #[must_use]
    pub fn matches(&self, sender: &str) -> bool {
        self.match_substrings
            .iter()
            .any(|needle| sender.contains(needle.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Classification failure for a well-formed notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationError {
    /// No rule matched the sender. Permanent for this input.
    #[error("Unknown newsletter source: {sender}")]
    UnknownSource { sender: String },
}

impl ClassificationError {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownSource { .. } => "unknown_source",
        }
    }
}

/// Errors raised while building a classification table.
#[derive(Debug, thiserror::Error)]
pub enum RuleTableError {
    #[error("classification table has no rules")]
    NoRules,
    #[error("rule for handler '{handler_id}' has no match substrings")]
    NoSubstrings { handler_id: HandlerId },
    #[error("rule for handler '{handler_id}' contains an empty match substring")]
    EmptySubstring { handler_id: HandlerId },
    #[error("handler '{handler_id}' appears in more than one rule")]
    DuplicateHandler { handler_id: HandlerId },
    #[error("invalid rules document: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// ClassificationTable
// ---------------------------------------------------------------------------

/// On-disk layout of a rules file: `{ "rules": [ ... ] }`.
#[derive(Debug, Deserialize)]
struct RulesDocument {
    rules: Vec<ClassificationRule>,
}

/// Ordered, validated list of classification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationTable {
    rules: Vec<ClassificationRule>,
}

impl ClassificationTable {
    /// Build a table, preserving rule order exactly.
    ///
    /// # Errors
    ///
    /// Returns `RuleTableError` if the table is empty, a rule has no
    /// substrings or an empty substring, or a handler id is used twice.
    pub fn new(rules: Vec<ClassificationRule>) -> Result<Self, RuleTableError> {
        if rules.is_empty() {
            return Err(RuleTableError::NoRules);
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.match_substrings.is_empty() {
                return Err(RuleTableError::NoSubstrings {
                    handler_id: rule.handler_id.clone(),
                });
            }
            if rule.match_substrings.iter().any(String::is_empty) {
                return Err(RuleTableError::EmptySubstring {
                    handler_id: rule.handler_id.clone(),
                });
            }
            if !seen.insert(&rule.handler_id) {
                return Err(RuleTableError::DuplicateHandler {
                    handler_id: rule.handler_id.clone(),
                });
            }
        }

        Ok(Self { rules })
    }

    /// Parse and validate a JSON rules document.
    ///
    /// # Errors
    ///
    /// Returns `RuleTableError::Parse` for malformed JSON and any validation
    /// error from [`ClassificationTable::new`].
    pub fn from_json(document: &str) -> Result<Self, RuleTableError> {
        let parsed: RulesDocument = serde_json::from_str(document)?;
        Self::new(parsed.rules)
    }

    /// The built-in newsletter routing table.
    #[must_use]
    pub fn default_newsletters() -> Self {
        Self {
            rules: vec![
                ClassificationRule::new(
                    "creativity-daily",
                    Strategy::Synchronous,
                    ["adage@e.crainalerts.com"],
                ),
                ClassificationRule::new(
                    "ads-of-the-world",
                    Strategy::Asynchronous,
                    ["newsletter@adsoftheworld.com"],
                ),
                ClassificationRule::new(
                    "creative-bloq",
                    Strategy::Synchronous,
                    ["creativebloq@smartbrief.com"],
                ),
                ClassificationRule::new(
                    "campaign-brief",
                    Strategy::Asynchronous,
                    ["no-reply@campaignbrief.com", "no-reply@campaignbrief.co.nz"],
                ),
            ],
        }
    }

    /// Find the first rule whose substrings hit `sender`.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::UnknownSource` when no rule matches.
    pub fn classify(&self, sender: &str) -> Result<&ClassificationRule, ClassificationError> {
        self.rules
            .iter()
            .find(|rule| rule.matches(sender))
            .ok_or_else(|| ClassificationError::UnknownSource {
                sender: sender.to_string(),
            })
    }

    #[must_use]
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Handler ids in rule order.
    pub fn handler_ids(&self) -> impl Iterator<Item = &HandlerId> {
        self.rules.iter().map(|rule| &rule.handler_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for ClassificationTable {
    fn default() -> Self {
        Self::default_newsletters()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
