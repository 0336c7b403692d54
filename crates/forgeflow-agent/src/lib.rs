pub mod collaborators;
pub mod convergence;
pub mod discussion;
pub mod engine;
pub mod error;
pub mod planner;
pub mod preflight;
pub mod suspend;

pub use collaborators::{Checkpoint, Executor, SearchContext};
pub use engine::{Engine, EngineEvent, EngineState};
pub use error::EngineError;
pub use planner::parse_plan;
pub use preflight::run_preflight;
pub use suspend::{DebateDecision, ReviewDecision, Suspender};
