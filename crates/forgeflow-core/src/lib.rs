pub mod chat;
pub mod config;
pub mod discussion;
pub mod operation;
pub mod plan;

pub use chat::{CancellationToken, ChatMessage, TokenUsage};
pub use config::EngineConfig;
pub use discussion::{
    AgentStrategy, ConvergenceResult, DebateSession, DebateStrategy, DiscussionRound,
    Recommendation, ReviewSession, Role,
};
pub use operation::{EditBody, FileOperation, OperationKind};
pub use plan::{Plan, PlanError, PlanStep, StepStatus};
