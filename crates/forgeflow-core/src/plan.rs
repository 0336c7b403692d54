use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Status of a single [`PlanStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// One unit of work in a [`Plan`].
///
/// `depends_on` ids that do not resolve to any step in the owning plan are
/// treated as satisfied (non-fatal) — see [`Plan::is_step_executable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<BTreeSet<String>>,
    /// Opaque serialized operation, filled lazily when the step is first executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: StepStatus::Pending,
            depends_on: None,
            action: None,
            result: None,
        }
    }

    pub fn with_depends_on(mut self, depends_on: BTreeSet<String>) -> Self {
        self.depends_on = if depends_on.is_empty() {
            None
        } else {
            Some(depends_on)
        };
        self
    }
}

/// An ordered sequence of [`PlanStep`]. Step ids are unique within a plan —
/// callers that build a `Plan` by hand should route through
/// [`Plan::from_steps`], which enforces this invariant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),
}

impl Plan {
    pub fn from_steps(steps: Vec<PlanStep>) -> Result<Self, PlanError> {
        let mut seen = BTreeSet::new();
        for step in &steps {
            if !seen.insert(step.id.clone()) {
                return Err(PlanError::DuplicateStepId(step.id.clone()));
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [PlanStep] {
        &mut self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// A step is executable iff it is `pending` and every resolvable
    /// dependency is `done`. A `dependsOn` id with no matching step in the
    /// plan is treated as satisfied.
    pub fn is_step_executable(&self, id: &str) -> bool {
        let Some(step) = self.step(id) else {
            return false;
        };
        if step.status != StepStatus::Pending {
            return false;
        }
        let Some(deps) = &step.depends_on else {
            return true;
        };
        deps.iter().all(|dep_id| match self.step(dep_id) {
            Some(dep) => dep.status == StepStatus::Done,
            None => true,
        })
    }

    /// First executable step, scanning in plan order (§3 selection rule).
    pub fn first_executable(&self) -> Option<&PlanStep> {
        self.steps.iter().find(|s| self.is_step_executable(&s.id))
    }

    pub fn all_done(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Done)
    }

    pub fn any_not_done(&self) -> bool {
        self.steps.iter().any(|s| s.status != StepStatus::Done)
    }
}
