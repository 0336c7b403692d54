use serde::{Deserialize, Serialize};

use crate::chat::CancellationToken;
use crate::discussion::{AgentStrategy, DebateStrategy};

/// Engine-wide configuration, constructed by the caller. There is no
/// persisted state layout — every run starts from a fresh `EngineConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_fix_attempts: u32,
    pub max_review_iterations: u32,
    pub max_debate_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<u64>,
    pub enable_multi_model_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critic_model: Option<String>,
    pub agent_strategy: AgentStrategy,
    pub plan_strategy: DebateStrategy,
    pub checkpoints_enabled: bool,
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: 3,
            max_review_iterations: 3,
            max_debate_iterations: 2,
            token_budget: None,
            enable_multi_model_review: false,
            reviewer_model: None,
            critic_model: None,
            agent_strategy: AgentStrategy::Review,
            plan_strategy: DebateStrategy::Debate,
            checkpoints_enabled: false,
            cancellation: CancellationToken::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_baselines() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_fix_attempts, 3);
        assert_eq!(cfg.max_review_iterations, 3);
        assert_eq!(cfg.max_debate_iterations, 2);
        assert!(!cfg.enable_multi_model_review);
        assert!(!cfg.checkpoints_enabled);
        assert!(!cfg.cancellation.is_cancelled());
    }
}
