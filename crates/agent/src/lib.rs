pub mod context;
pub mod conversation;
pub mod cost;
pub mod observation;
pub mod operator;
pub mod runtime;
pub mod state;

pub use conversation::{Conversation, Message};
pub use observation::Observation;
pub use operator::{LineOperator, Operator, OperatorMode};
pub use runtime::{AgentRuntime, LoopState, RuntimeSettings};
pub use state::SessionState;
