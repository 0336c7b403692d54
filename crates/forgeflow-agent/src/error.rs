/// Fatal engine errors (§7 taxonomy items d/e). Everything else — LLM
/// failures and patcher refusals during execution — is recoverable and
/// surfaces as a failed step instead of one of these.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("step {step_id}: fix attempt cap exceeded: {message}")]
    FixCapExceeded { step_id: String, message: String },
    #[error("critical loop error: {message}")]
    CriticalLoopError { message: String },
    #[error("step {step_id}: llm call failed: {message}")]
    LlmFailure { step_id: String, message: String },
}
