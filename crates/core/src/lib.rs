//! Domain core of the outbound supplier-call engine: the serializable
//! call state, the node state machine that drives one conversation, the
//! escalation/fallback policy, and the dialogue scripts. Everything here
//! is deterministic and synchronous; model calls, persistence, and the
//! per-turn orchestration live in the `partline-agent` and
//! `partline-store` crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod nodes;
pub mod policy;

pub use config::{AppConfig, CallConfig, ConfigError, LlmConfig, LoadOptions, StoreConfig};
pub use domain::call::{
    CallId, CallInit, CallRecord, CallState, CallStatus, ConversationTurn, NextAction, Speaker,
};
pub use domain::part::PartRequest;
pub use domain::quote::{Availability, PartQuote};
pub use errors::DomainError;
pub use nodes::{dispatch, CallNode, NodeOutcome, TurnContext, TurnSignal};
