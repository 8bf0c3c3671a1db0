//! Turn orchestration for outbound supplier calls: the webhook event
//! processor, the model-backed turn classifier and quote extractor with
//! their deterministic fallbacks, and the completion client plumbing.
//! The state machine itself lives in `partline-core`; persistence in
//! `partline-store`.

pub mod classify;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod processor;

pub use classify::TurnClassifier;
pub use extract::QuoteExtractor;
pub use llm::{DisabledLlmClient, HttpLlmClient, LlmClient};
pub use logging::init_logging;
pub use processor::{CallEvent, EngineError, TurnProcessor, TurnReply};
