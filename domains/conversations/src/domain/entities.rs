//! Domain entities for the Conversations domain
//!
//! Conversation snapshots are read-only copies of what the store holds. The
//! engine never creates them outside of decoding feed records, and never
//! mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque conversation identity.
///
/// The store may hand out numeric or textual ids; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawConversationId", into = "String")]
pub struct ConversationId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawConversationId {
    Text(String),
    Number(i64),
}

impl From<RawConversationId> for ConversationId {
    fn from(raw: RawConversationId) -> Self {
        match raw {
            RawConversationId::Text(s) => Self(s),
            RawConversationId::Number(n) => Self(n.to_string()),
        }
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    Customer,
    Agent,
}

impl std::fmt::Display for MessageOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageOrigin::Customer => write!(f, "customer"),
            MessageOrigin::Agent => write!(f, "agent"),
        }
    }
}

/// How a closed conversation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Sale,
    Cancelled,
    Transferred,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Sale => write!(f, "sale"),
            Resolution::Cancelled => write!(f, "cancelled"),
            Resolution::Transferred => write!(f, "transferred"),
        }
    }
}

/// Message entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub origin: MessageOrigin,
}

impl Message {
    pub fn customer(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            timestamp,
            origin: MessageOrigin::Customer,
        }
    }

    pub fn agent(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            timestamp,
            origin: MessageOrigin::Agent,
        }
    }
}

/// Input that breaks a snapshot invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("conversation is open but has a close time")]
    OpenWithCloseTime,

    #[error("last customer message precedes the conversation start")]
    CustomerMessageBeforeStart,

    #[error("message {index} is older than the message before it")]
    MessagesOutOfOrder { index: usize },
}

/// Conversation snapshot as of the last feed update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub id: ConversationId,
    #[serde(rename = "customer")]
    pub customer_name: String,
    #[serde(default)]
    pub phone: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(rename = "last_customer_message_time", default)]
    pub last_customer_message_at: Option<DateTime<Utc>>,
    #[serde(rename = "last_agent_message_time", default)]
    pub last_agent_message_at: Option<DateTime<Utc>>,
    pub is_open: bool,
    #[serde(default)]
    pub attended_by: Option<String>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

impl ConversationSnapshot {
    /// An open conversation with no messages yet
    pub fn new(
        id: impl Into<ConversationId>,
        customer_name: impl Into<String>,
        phone: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            customer_name: customer_name.into(),
            phone: phone.into(),
            start_time,
            messages: Vec::new(),
            last_customer_message_at: None,
            last_agent_message_at: None,
            is_open: true,
            attended_by: None,
            closed_at: None,
            resolution: None,
        }
    }

    /// Append a message and advance the matching last-message time.
    pub fn with_message(mut self, message: Message) -> Self {
        let slot = match message.origin {
            MessageOrigin::Customer => &mut self.last_customer_message_at,
            MessageOrigin::Agent => &mut self.last_agent_message_at,
        };
        *slot = Some(slot.map_or(message.timestamp, |t| t.max(message.timestamp)));
        self.messages.push(message);
        self
    }

    pub fn attended_by(mut self, handler: impl Into<String>) -> Self {
        self.attended_by = Some(handler.into());
        self
    }

    pub fn closed(mut self, closed_at: DateTime<Utc>, resolution: Option<Resolution>) -> Self {
        self.is_open = false;
        self.closed_at = Some(closed_at);
        self.resolution = resolution;
        self
    }

    /// Most recent message, if any
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Check the snapshot invariants, reporting the first one broken.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.is_open && self.closed_at.is_some() {
            return Err(ContractViolation::OpenWithCloseTime);
        }

        if matches!(self.last_customer_message_at, Some(t) if t < self.start_time) {
            return Err(ContractViolation::CustomerMessageBeforeStart);
        }

        if let Some(index) = self
            .messages
            .windows(2)
            .position(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(ContractViolation::MessagesOutOfOrder { index: index + 1 });
        }

        Ok(())
    }
}
