use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Keys owned by [`Message`] itself; extras may not shadow them.
const RESERVED_KEYS: [&str; 2] = ["role", "content"];

/// Opaque attributes attached to a message and forwarded to the provider.
pub type MessageExtra = Map<String, Value>;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the conversation log.
///
/// `extra` is flattened into the serialized form, so attributes such as
/// `name` reach the provider next to `role` and `content`.
///
/// ```
/// use gears::{Message, Role};
/// use serde_json::json;
///
/// let message = Message::user("hi").with_extra_field("name", json!("alice"));
/// assert_eq!(message.role, Role::User);
/// assert_eq!(
///     serde_json::to_value(&message).unwrap(),
///     json!({"role": "user", "content": "hi", "name": "alice"})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(flatten)]
    pub extra: MessageExtra,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            extra: MessageExtra::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Replaces the extra attributes. `role` and `content` keys are dropped.
    pub fn with_extra(mut self, extra: MessageExtra) -> Self {
        self.extra = extra
            .into_iter()
            .filter(|(key, _)| accept_extra(key))
            .collect();
        self
    }

    /// Adds a single extra attribute unless `key` is `role` or `content`.
    pub fn with_extra_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if accept_extra(&key) {
            self.extra.insert(key, value);
        }
        self
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

fn accept_extra(key: &str) -> bool {
    if is_reserved(key) {
        warn!(key, "Dropping message extra that would shadow a message field");
        return false;
    }
    true
}

// Written by hand so reserved keys inserted straight into `extra` never
// reach the wire as duplicates.
impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("role", &self.role)?;
        map.serialize_entry("content", &self.content)?;
        for (key, value) in self.extra.iter().filter(|(key, _)| !is_reserved(key)) {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
