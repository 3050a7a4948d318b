//! Inbound notification payloads and shape validation.
//!
//! A notification is an arbitrary JSON document produced by the email parser.
//! The only structure the router relies on is `metadata.sender`; everything
//! else is carried through untouched to the owning handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// NotificationPayload
// ---------------------------------------------------------------------------

/// Opaque notification document.
///
/// Wraps the decoded JSON value so the router can pass it around by value
/// without ever mutating it. Serializes transparently as the inner document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPayload(Value);

impl NotificationPayload {
    /// Wraps an already-decoded document without validating it.
    #[must_use]
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    /// Borrow the underlying document.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the payload and return the underlying document.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Returns `metadata.sender` when present as a string.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.0.get("metadata")?.get("sender")?.as_str()
    }

    /// Returns a top-level field of the document.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

impl From<Value> for NotificationPayload {
    fn from(document: Value) -> Self {
        Self(document)
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Shape violations detected before classification is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The body is empty, is not JSON, or is not a non-empty JSON object.
    #[error("{0}")]
    MalformedInput(String),
    /// A required field is absent.
    #[error("Missing '{0}' field")]
    MissingField(&'static str),
}

impl ValidationError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::MissingField(_) => "missing_field",
        }
    }
}

// ---------------------------------------------------------------------------
// ValidatedNotification
// ---------------------------------------------------------------------------

/// A payload that passed shape validation, paired with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedNotification {
    sender: String,
    payload: NotificationPayload,
}

impl ValidatedNotification {
    /// The non-empty `metadata.sender` string.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn payload(&self) -> &NotificationPayload {
        &self.payload
    }

    /// Split into `(sender, payload)`.
    #[must_use]
    pub fn into_parts(self) -> (String, NotificationPayload) {
        (self.sender, self.payload)
    }
}

/// Validate a raw request body.
///
/// Checks, in order: the body decodes as JSON, the document is a non-empty
/// object, `metadata` is present, and `metadata.sender` is a non-empty string.
///
/// # Errors
///
/// - `ValidationError::MalformedInput` for empty bodies, invalid JSON,
///   non-object documents, and empty objects
/// - `ValidationError::MissingField("metadata")` when `metadata` is absent or null
/// - `ValidationError::MissingField("sender")` when the sender is absent,
///   not a string, or empty
pub fn validate_body(body: &[u8]) -> Result<ValidatedNotification, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::MalformedInput(
            "No JSON data received".to_string(),
        ));
    }
    let document: Value = serde_json::from_slice(body)
        .map_err(|e| ValidationError::MalformedInput(format!("Invalid JSON format: {e}")))?;
    validate_document(document)
}

/// Validate an already-decoded document.
///
/// # Errors
///
/// Same as [`validate_body`], minus the JSON decoding step.
pub fn validate_document(document: Value) -> Result<ValidatedNotification, ValidationError> {
    let sender = {
        let Value::Object(fields) = &document else {
            return Err(ValidationError::MalformedInput(
                "Expected a JSON object".to_string(),
            ));
        };
        if fields.is_empty() {
            return Err(ValidationError::MalformedInput(
                "No JSON data received".to_string(),
            ));
        }

        let metadata = match fields.get("metadata") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("metadata")),
            Some(metadata) => metadata,
        };

        metadata
            .get("sender")
            .and_then(Value::as_str)
            .filter(|sender| !sender.is_empty())
            .ok_or(ValidationError::MissingField("sender"))?
            .to_string()
    };

    Ok(ValidatedNotification {
        sender,
        payload: NotificationPayload(document),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
