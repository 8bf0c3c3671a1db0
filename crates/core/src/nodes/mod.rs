pub mod handlers;
pub mod script;
pub mod states;

pub use handlers::{dispatch, enter_escalation, enter_voicemail};
pub use states::{CallNode, NodeOutcome, TurnContext, TurnSignal};
