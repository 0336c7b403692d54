use forgeflow_core::{DebateStrategy, DiscussionRound, Role};

/// Role for review round `n` (1-indexed): odd rounds critique, even rounds
/// rebuttal.
pub fn review_role_for_round(round: u32) -> Role {
    if round % 2 == 1 {
        Role::Critique
    } else {
        Role::Rebuttal
    }
}

/// Role for debate round `n` under the given strategy.
pub fn debate_role_for_round(round: u32, strategy: DebateStrategy) -> Role {
    match strategy {
        DebateStrategy::Debate => {
            if round % 2 == 1 {
                Role::Challenge
            } else {
                Role::Defense
            }
        }
        DebateStrategy::Perspectives => match round {
            1 => Role::RiskAnalysis,
            2 => Role::InnovationAnalysis,
            _ => Role::CrossReview,
        },
    }
}

/// Whether the given role should be dispatched with the critic/reviewer
/// model override rather than the engine's default model.
pub fn role_uses_critic_model(role: Role) -> bool {
    matches!(role, Role::Critique | Role::Challenge | Role::RiskAnalysis | Role::CrossReview)
}

/// Concatenates round contents as the synthesis fallback used when the
/// LLM synthesis call itself fails.
pub fn fallback_synthesis(rounds: &[DiscussionRound]) -> String {
    rounds
        .iter()
        .map(|r| format!("Round {} ({:?}): {}", r.round, r.role, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
