//! Operational status classification
//!
//! Rules are evaluated in a fixed precedence, first match wins:
//!
//! 1. not open → `Closed`
//! 2. last message is the customer's and contains a closing keyword → `Closed`
//! 3. no agent reply yet and the customer has waited past the threshold → `Unresponded`
//! 4. last message is the customer's and they waited past the threshold → `Unresponded`
//! 5. last message is the agent's and within the threshold → `Waiting`
//! 6. otherwise → `Active`
//!
//! Every comparison uses the single `now` passed in by the caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{ContractViolation, ConversationSnapshot, MessageOrigin};

/// Default wait, in seconds, before a customer counts as unresponded.
pub const DEFAULT_UNRESPONDED_AFTER_SECS: i64 = 5 * 60;

/// Sign-offs that end a conversation when the customer sends them last.
pub const DEFAULT_CLOSING_KEYWORDS: &[&str] = &["obrigado", "obrigada", "valeu", "tchau"];

/// Derived conversation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Closed,
    Waiting,
    Unresponded,
    Active,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Closed,
        Status::Waiting,
        Status::Unresponded,
        Status::Active,
    ];

    /// Label shown on the dashboard badge
    pub fn label(&self) -> &'static str {
        match self {
            Status::Closed => "Finalizado",
            Status::Waiting => "Aguardando",
            Status::Unresponded => "Sem Resposta",
            Status::Active => "Em Atendimento",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Closed => write!(f, "closed"),
            Status::Waiting => write!(f, "waiting"),
            Status::Unresponded => write!(f, "unresponded"),
            Status::Active => write!(f, "active"),
        }
    }
}

/// Tunable inputs of the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierPolicy {
    /// Shared by the "no agent yet" and "customer waiting" rules
    pub unresponded_after: Duration,
    closing_keywords: Vec<String>,
}

impl ClassifierPolicy {
    pub fn new<I, S>(unresponded_after: Duration, closing_keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let closing_keywords = closing_keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            unresponded_after,
            closing_keywords,
        }
    }

    pub fn closing_keywords(&self) -> &[String] {
        &self.closing_keywords
    }

    fn is_sign_off(&self, content: &str) -> bool {
        let content = content.to_lowercase();
        self.closing_keywords
            .iter()
            .any(|keyword| content.contains(keyword.as_str()))
    }
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_UNRESPONDED_AFTER_SECS),
            DEFAULT_CLOSING_KEYWORDS,
        )
    }
}

/// Classifies conversation snapshots
#[derive(Debug, Clone, Default)]
pub struct StatusClassifier {
    policy: ClassifierPolicy,
}

impl StatusClassifier {
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    /// Classify a conversation, never failing.
    ///
    /// An open conversation that breaks a snapshot invariant is logged and
    /// reported as `Active`, so one bad record cannot blank the dashboard.
    pub fn classify(&self, conversation: &ConversationSnapshot, now: DateTime<Utc>) -> Status {
        match self.evaluate(conversation, now) {
            Ok(status) => status,
            Err(violation) => {
                tracing::warn!(
                    conversation_id = %conversation.id,
                    %violation,
                    "Conversation violates snapshot contract, classifying as active"
                );
                Status::Active
            }
        }
    }

    /// Classify a conversation, surfacing contract violations instead of defaulting.
    pub fn evaluate(
        &self,
        conversation: &ConversationSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Status, ContractViolation> {
        if !conversation.is_open {
            return Ok(Status::Closed);
        }

        conversation.validate()?;

        let last = conversation.last_message();
        let threshold = self.policy.unresponded_after;
        let customer_overdue = conversation
            .last_customer_message_at
            .is_some_and(|t| now - t > threshold);

        if let Some(message) = last {
            if message.origin == MessageOrigin::Customer && self.policy.is_sign_off(&message.content) {
                return Ok(Status::Closed);
            }
        }

        if conversation.last_agent_message_at.is_none() && customer_overdue {
            return Ok(Status::Unresponded);
        }

        match last.map(|m| m.origin) {
            Some(MessageOrigin::Customer) if customer_overdue => Ok(Status::Unresponded),
            Some(MessageOrigin::Agent)
                if conversation
                    .last_agent_message_at
                    .is_some_and(|t| now - t <= threshold) =>
            {
                Ok(Status::Waiting)
            }
            _ => Ok(Status::Active),
        }
    }
}

/// Whole minutes the customer has been waiting for a reply.
///
/// Zero for closed conversations, when the customer has not written, or when
/// an agent answered at or after the customer's last message.
pub fn wait_minutes(conversation: &ConversationSnapshot, now: DateTime<Utc>) -> i64 {
    if !conversation.is_open {
        return 0;
    }

    match (
        conversation.last_customer_message_at,
        conversation.last_agent_message_at,
    ) {
        (Some(customer), Some(agent)) if agent >= customer => 0,
        (Some(customer), _) => (now - customer).num_minutes().max(0),
        (None, _) => 0,
    }
}
