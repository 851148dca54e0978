//! Conversations domain: status classification, attendance metrics, change feed

pub mod adapter;
pub mod api;
pub mod domain;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{
    ContractViolation, ConversationId, ConversationSnapshot, Message, MessageOrigin, Resolution,
};
pub use domain::metrics::{AttendanceAggregator, MetricsWindow, WindowStats};
pub use domain::staleness::StalenessPolicy;
pub use domain::status::{
    wait_minutes, ClassifierPolicy, Status, StatusClassifier, DEFAULT_CLOSING_KEYWORDS,
};
pub use domain::view::{ConversationView, DashboardView, MonitorEngine, ViewCounts, WindowReport};

// Re-export adapter types
pub use adapter::{
    AdapterError, AdapterSettings, ApplyOutcome, Backoff, ChangeFeedAdapter, Clock, ManualClock,
    RetryConfig, SystemClock,
};

// Re-export API types
pub use api::routes;
pub use api::DashboardState;
