use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role assigned to a single discussion round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Critique,
    Rebuttal,
    Challenge,
    Defense,
    RiskAnalysis,
    InnovationAnalysis,
    CrossReview,
}

/// One round of a review or debate session. Rounds are numbered from 1 with
/// no gaps and no duplicates within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionRound {
    pub round: u32,
    pub role: Role,
    pub content: String,
}

impl DiscussionRound {
    pub fn new(round: u32, role: Role, content: impl Into<String>) -> Self {
        Self {
            round,
            role,
            content: content.into(),
        }
    }
}

/// Recommendation emitted by the Convergence Scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Continue,
    Converged,
    Stalled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceResult {
    pub overall_score: f64,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub subscores: BTreeMap<String, f64>,
}

impl ConvergenceResult {
    pub fn not_enough_rounds() -> Self {
        Self {
            overall_score: 0.0,
            recommendation: Recommendation::Continue,
            subscores: BTreeMap::new(),
        }
    }

    pub fn forced_stalled(overall_score: f64, subscores: BTreeMap<String, f64>) -> Self {
        Self {
            overall_score,
            recommendation: Recommendation::Stalled,
            subscores,
        }
    }
}

/// Strategy used when driving a debate session (§4.8 Debating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStrategy {
    Debate,
    Perspectives,
}

/// Strategy used when driving a review session. `Perspectives` is accepted
/// for forward-compatibility with `agentStrategy` but currently drives the
/// same critique/rebuttal round shape as `Review` — see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStrategy {
    Review,
    Perspectives,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSession {
    pub strategy: AgentStrategy,
    pub rounds: Vec<DiscussionRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<String>,
}

impl ReviewSession {
    pub fn new(strategy: AgentStrategy) -> Self {
        Self {
            strategy,
            rounds: Vec::new(),
            convergence: None,
            synthesis: None,
        }
    }

    pub fn push_round(&mut self, role: Role, content: impl Into<String>) -> u32 {
        let round = self.rounds.len() as u32 + 1;
        self.rounds.push(DiscussionRound::new(round, role, content));
        round
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    pub strategy: DebateStrategy,
    pub rounds: Vec<DiscussionRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<String>,
}

impl DebateSession {
    pub fn new(strategy: DebateStrategy) -> Self {
        Self {
            strategy,
            rounds: Vec::new(),
            convergence: None,
            synthesis: None,
        }
    }

    pub fn push_round(&mut self, role: Role, content: impl Into<String>) -> u32 {
        let round = self.rounds.len() as u32 + 1;
        self.rounds.push(DiscussionRound::new(round, role, content));
        round
    }
}
