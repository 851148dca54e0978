//! Conversation model and the pure derivation layer over it

pub mod entities;
pub mod metrics;
pub mod staleness;
pub mod status;
pub mod view;
