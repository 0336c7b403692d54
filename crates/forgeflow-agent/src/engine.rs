use std::path::PathBuf;

use forgeflow_core::{
    ChatMessage, ConvergenceResult, DebateSession, EngineConfig, FileOperation, OperationKind,
    Plan, PlanStep, Recommendation, ReviewSession, StepStatus,
};
use forgeflow_diff::{Patcher, extract_balanced_json, parse_operations};
use forgeflow_llm::{ChatRequest, LlmCollaborator, PromptMode, system_prompt};
use forgeflow_observe::Observer;

use crate::collaborators::{Checkpoint, Executor, SearchContext};
use crate::convergence;
use crate::discussion::{debate_role_for_round, fallback_synthesis, review_role_for_round, role_uses_critic_model};
use crate::error::EngineError;
use crate::planner::parse_plan;
use crate::preflight::run_preflight;
use crate::suspend::{DebateDecision, ReviewDecision, Suspender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Planning,
    Executing,
    Observing,
    Reflecting,
    Fixing,
    Reviewing,
    Debating,
    Synthesizing,
    WaitingForReviewDecision,
    WaitingForDebateDecision,
    Done,
    Error,
}

impl EngineState {
    fn is_terminal_or_waiting(self) -> bool {
        matches!(
            self,
            EngineState::Idle
                | EngineState::Done
                | EngineState::Error
                | EngineState::WaitingForReviewDecision
                | EngineState::WaitingForDebateDecision
        )
    }
}

/// Out-of-band notifications matching §5's named callbacks, collapsed into
/// one event type for a single dispatch closure.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged { from: EngineState, to: EngineState },
    PlanChanged(Plan),
    Message(String),
    CheckpointCreated(String),
    ReviewComplete { step_id: String, rounds: Vec<forgeflow_core::DiscussionRound>, convergence: ConvergenceResult },
    DebateComplete { rounds: Vec<forgeflow_core::DiscussionRound>, convergence: ConvergenceResult },
    SynthesisComplete(String),
}

const FIX_ESCALATION_THRESHOLD_2: u32 = 2;
const FIX_ESCALATION_THRESHOLD_3: u32 = 3;
const FIX_FILE_CONTENT_CAP: usize = 2000;

pub struct Engine {
    config: EngineConfig,
    workspace_root: PathBuf,
    state: EngineState,
    goal: String,
    plan: Plan,
    patcher: Patcher,
    fix_attempts: std::collections::HashMap<String, u32>,
    consecutive_mistakes: u32,
    reviewed_step_ids: std::collections::HashSet<String>,
    active_step_id: Option<String>,
    last_diagnostics: Vec<forgeflow_observe::Diagnostic>,
    review_session: Option<ReviewSession>,
    debate_session: Option<DebateSession>,
    review_suspender: Suspender<ReviewDecision>,
    debate_suspender: Suspender<DebateDecision>,
    last_error: Option<EngineError>,
    llm: Box<dyn LlmCollaborator>,
    search: Box<dyn SearchContext>,
    executor: Box<dyn Executor>,
    observer: Box<dyn Observer>,
    checkpoint: Option<Box<dyn Checkpoint>>,
    on_event: Option<Box<dyn FnMut(EngineEvent)>>,
}

impl Engine {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        config: EngineConfig,
        llm: Box<dyn LlmCollaborator>,
        search: Box<dyn SearchContext>,
        executor: Box<dyn Executor>,
        observer: Box<dyn Observer>,
        checkpoint: Option<Box<dyn Checkpoint>>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            patcher: Patcher::new(workspace_root.clone()),
            workspace_root,
            config,
            state: EngineState::Idle,
            goal: String::new(),
            plan: Plan::default(),
            fix_attempts: std::collections::HashMap::new(),
            consecutive_mistakes: 0,
            reviewed_step_ids: std::collections::HashSet::new(),
            active_step_id: None,
            last_diagnostics: Vec::new(),
            review_session: None,
            debate_session: None,
            review_suspender: Suspender::new(),
            debate_suspender: Suspender::new(),
            last_error: None,
            llm,
            search,
            executor,
            observer,
            checkpoint,
        }
    }

    pub fn on_event(&mut self, cb: Box<dyn FnMut(EngineEvent)>) {
        self.on_event = Some(cb);
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    fn emit(&mut self, event: EngineEvent) {
        if let Some(cb) = self.on_event.as_mut() {
            cb(event);
        }
    }

    fn set_state(&mut self, next: EngineState) {
        if next != self.state {
            self.emit(EngineEvent::StateChanged { from: self.state, to: next });
        }
        self.state = next;
    }

    /// Starts a run from Idle with a fresh goal. No-op (idempotent) if the
    /// engine is already past Idle.
    pub fn start(&mut self, goal: impl Into<String>) {
        if self.state != EngineState::Idle {
            return;
        }
        self.goal = goal.into();
        self.set_state(EngineState::Planning);
    }

    /// Runs the cooperative loop until it reaches a terminal or suspended
    /// state. Idempotent for Done/Error.
    pub fn run(&mut self) -> EngineState {
        loop {
            if self.state.is_terminal_or_waiting() {
                return self.state;
            }
            let next = self.dispatch();
            self.set_state(next);
        }
    }

    pub fn resolve_review_decision(&mut self, decision: ReviewDecision) {
        self.review_suspender.resolve(decision);
    }

    pub fn resolve_debate_decision(&mut self, decision: DebateDecision) {
        self.debate_suspender.resolve(decision);
    }

    /// Forcibly returns to Idle, clears all runtime state, and fulfills any
    /// pending decision handle with its safe default.
    pub fn reset(&mut self) {
        self.review_suspender.reset(ReviewDecision::Skip);
        self.debate_suspender.reset(DebateDecision::Accept);
        self.plan = Plan::default();
        self.fix_attempts.clear();
        self.consecutive_mistakes = 0;
        self.reviewed_step_ids.clear();
        self.active_step_id = None;
        self.last_diagnostics.clear();
        self.review_session = None;
        self.debate_session = None;
        self.last_error = None;
        self.state = EngineState::Idle;
    }

    fn dispatch(&mut self) -> EngineState {
        match self.state {
            EngineState::Planning => self.handle_planning(),
            EngineState::Executing => self.handle_executing(),
            EngineState::Observing => self.handle_observing(),
            EngineState::Reflecting => self.handle_reflecting(),
            EngineState::Fixing => self.handle_fixing(),
            EngineState::Reviewing => self.handle_reviewing(),
            EngineState::Debating => self.handle_debating(),
            EngineState::Synthesizing => self.handle_synthesizing(),
            EngineState::Idle
            | EngineState::Done
            | EngineState::Error
            | EngineState::WaitingForReviewDecision
            | EngineState::WaitingForDebateDecision => self.state,
        }
    }

    // ── Planning ──

    fn handle_planning(&mut self) -> EngineState {
        let paths = self.search.search_relevant_files(&self.goal);
        let budget = self.config.token_budget.unwrap_or(4000) as usize;
        let context = self.search.assemble_context(&paths, budget);
        let prompt = format!("Goal: {}\n\nRelevant context:\n{context}", self.goal);

        let response = match self.call_llm(PromptMode::Planning, None, &prompt) {
            Ok(text) => text,
            Err(e) => {
                self.last_error = Some(EngineError::LlmFailure { step_id: "planning".into(), message: e });
                return EngineState::Error;
            }
        };

        let mut plan = parse_plan(&response);
        if plan.is_empty() && !response.trim().is_empty() {
            let stricter = format!("{prompt}\n\nRespond ONLY with the checklist, no other text.");
            if let Ok(retry) = self.call_llm(PromptMode::Planning, None, &stricter) {
                plan = parse_plan(&retry);
            }
        }

        if plan.is_empty() {
            return EngineState::Done;
        }

        self.plan = plan;
        self.emit(EngineEvent::PlanChanged(self.plan.clone()));

        if self.config.critic_model.is_some() {
            EngineState::Debating
        } else {
            EngineState::Executing
        }
    }

    // ── Executing ──

    fn handle_executing(&mut self) -> EngineState {
        let Some(step) = self.plan.first_executable().cloned() else {
            return if self.plan.all_done() { EngineState::Done } else { EngineState::Idle };
        };

        self.active_step_id = Some(step.id.clone());
        self.plan.step_mut(&step.id).unwrap().status = StepStatus::Running;

        if self.config.checkpoints_enabled {
            if let Some(cp) = &self.checkpoint {
                let id = cp.create(&self.plan);
                self.emit(EngineEvent::CheckpointCreated(id));
            }
        }

        let raw_action = match &step.action {
            Some(a) => a.clone(),
            None => match self.request_action_for_step(&step) {
                Ok(a) => a,
                Err(e) => {
                    self.fail_step(&step.id, format!("[LLM failure] {e}"));
                    return EngineState::Fixing;
                }
            },
        };

        let op = match self.parse_action(&raw_action) {
            Ok(op) => op,
            Err(msg) => {
                self.fail_step(&step.id, msg);
                return EngineState::Fixing;
            }
        };

        let workspace_root = self.workspace_root.clone();
        let read_file = move |path: &str| std::fs::read_to_string(workspace_root.join(path)).ok();
        let op = run_preflight(op, &read_file, self.llm.as_ref(), &self.config.cancellation);

        match self.execute_operation(&op) {
            Ok(result) => {
                let s = self.plan.step_mut(&step.id).unwrap();
                s.status = StepStatus::Done;
                s.result = Some(result);
                s.action = Some(raw_action);
                self.consecutive_mistakes = 0;
                EngineState::Observing
            }
            Err(msg) => {
                self.consecutive_mistakes += 1;
                self.fail_step(&step.id, msg);
                EngineState::Fixing
            }
        }
    }

    fn fail_step(&mut self, step_id: &str, message: String) {
        if let Some(step) = self.plan.step_mut(step_id) {
            step.status = StepStatus::Failed;
            step.result = Some(message);
        }
    }

    fn request_action_for_step(&mut self, step: &PlanStep) -> Result<String, String> {
        let file_hint = self.file_path_mentioned_in(&step.description);
        let mut prompt = format!("Step: {}\n\nRespond with a single JSON file operation.", step.description);
        if let Some(path) = file_hint {
            if let Ok(content) = self.executor.read_file(&path) {
                prompt.push_str(&format!("\n\nCurrent content of {path}:\n{content}"));
            }
        }
        self.call_llm(PromptMode::Action, None, &prompt)
    }

    fn file_path_mentioned_in(&self, description: &str) -> Option<String> {
        description
            .split_whitespace()
            .find(|w| w.contains('.') && !w.starts_with('.'))
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '/' && c != '_' && c != '-').to_string())
    }

    /// Resolves a step's action from the raw LLM response. Tries the
    /// Operation Parser's multi-dialect scan first, since a model asked for
    /// strict single-JSON (§6's Action system prompt) will sometimes lapse
    /// into the framed-block or invoke-XML dialects it was trained on
    /// instead; a single recognized operation is used directly, multiple are
    /// folded into one atomic `multi_write` so the step's `action` field
    /// stays a single opaque string per §3. When the parser recognizes
    /// nothing (the common case — a compliant model's bare JSON object
    /// matches none of the three dialects), falls back to the Json-Text
    /// Extractor plus direct JSON decoding, per §4.8.
    fn parse_action(&self, raw: &str) -> Result<FileOperation, String> {
        let dialect_ops = parse_operations(raw);
        match dialect_ops.len() {
            0 => {
                let json = extract_balanced_json(raw).map_err(|_| "unparseable action".to_string())?;
                serde_json::from_str(json).map_err(|e| format!("unparseable action: {e}"))
            }
            1 => Ok(dialect_ops.into_iter().next().unwrap()),
            _ => Ok(FileOperation::new(
                "",
                OperationKind::MultiWrite { atomic: true, operations: dialect_ops },
            )),
        }
    }

    fn execute_operation(&mut self, op: &FileOperation) -> Result<String, String> {
        match &op.kind {
            OperationKind::Run { .. } | OperationKind::Read => self.executor.execute(op),
            _ => match self.patcher.apply(op) {
                Ok(_) => Ok(format!("successfully applied {} to {}", operation_label(op), op.path)),
                Err(e) => Err(e.to_string()),
            },
        }
    }

    fn call_llm(&self, mode: PromptMode, override_prompt: Option<&str>, user_prompt: &str) -> Result<String, String> {
        let system = system_prompt(mode, override_prompt);
        let request = ChatRequest::new(
            vec![
                ChatMessage::System { content: system },
                ChatMessage::User { content: user_prompt.to_string() },
            ],
            self.config.cancellation.clone(),
        );
        self.llm
            .stream_chat(request, &mut |_| {})
            .map(|resp| resp.text)
            .map_err(|e| e.to_string())
    }

    fn call_llm_with_model(&self, model: Option<&str>, mode: PromptMode, user_prompt: &str) -> Result<String, String> {
        let system = system_prompt(mode, None);
        let mut request = ChatRequest::new(
            vec![
                ChatMessage::System { content: system },
                ChatMessage::User { content: user_prompt.to_string() },
            ],
            self.config.cancellation.clone(),
        );
        if let Some(m) = model {
            request = request.with_model(m);
        }
        self.llm
            .stream_chat(request, &mut |_| {})
            .map(|resp| resp.text)
            .map_err(|e| e.to_string())
    }

    // ── Observing ──

    fn handle_observing(&mut self) -> EngineState {
        let diagnostics = self.observer.get_diagnostics();
        self.last_diagnostics = diagnostics.clone();
        let step_id = self.active_step_id.clone().expect("observing with no active step");

        if !diagnostics.is_empty() {
            let formatted = forgeflow_observe::format_diagnostics(&diagnostics);
            self.fail_step(&step_id, formatted);
            return EngineState::Fixing;
        }

        let result_text = self
            .plan
            .step(&step_id)
            .and_then(|s| s.result.clone())
            .unwrap_or_default();
        let clean_success = is_clean_success(&result_text);

        if clean_success {
            if self.config.enable_multi_model_review && !self.reviewed_step_ids.contains(&step_id) {
                self.review_session = Some(ReviewSession::new(self.config.agent_strategy));
                EngineState::Reviewing
            } else {
                EngineState::Executing
            }
        } else {
            EngineState::Reflecting
        }
    }

    // ── Reflecting ──

    fn handle_reflecting(&mut self) -> EngineState {
        let step_id = self.active_step_id.clone().expect("reflecting with no active step");
        let result_text = self.plan.step(&step_id).and_then(|s| s.result.clone()).unwrap_or_default();

        let prompt = format!(
            "Step result: {result_text}\n\nClassify as exactly one of SUCCESS, RETRY, REPLAN with a one-line reason."
        );
        let classification = self.call_llm(PromptMode::Action, None, &prompt).unwrap_or_default();
        let upper = classification.to_uppercase();

        if upper.contains("REPLAN") {
            let context = format!("Previous attempt failed: {result_text}");
            if let Ok(replan_text) = self.call_llm(PromptMode::Planning, None, &context) {
                let plan = parse_plan(&replan_text);
                if !plan.is_empty() {
                    self.plan = plan;
                    self.emit(EngineEvent::PlanChanged(self.plan.clone()));
                }
            }
            EngineState::Executing
        } else if upper.contains("RETRY") {
            self.fail_step(&step_id, result_text);
            EngineState::Fixing
        } else {
            EngineState::Executing
        }
    }

    // ── Fixing ──

    fn handle_fixing(&mut self) -> EngineState {
        let step_id = self.active_step_id.clone().expect("fixing with no active step");
        let attempts = self.fix_attempts.entry(step_id.clone()).or_insert(0);

        if *attempts >= self.config.max_fix_attempts {
            self.last_error = Some(EngineError::FixCapExceeded {
                step_id: step_id.clone(),
                message: "maximum fix attempts exceeded".into(),
            });
            return EngineState::Error;
        }
        *attempts += 1;
        self.consecutive_mistakes += 1;

        let diagnostics_text = forgeflow_observe::format_diagnostics(&self.last_diagnostics);
        let failure_text = self.plan.step(&step_id).and_then(|s| s.result.clone()).unwrap_or_default();

        let mut prompt = format!("Fix required for step `{step_id}`.\nFailure: {failure_text}\nDiagnostics: {diagnostics_text}\n");
        if self.consecutive_mistakes >= FIX_ESCALATION_THRESHOLD_3 {
            prompt.push_str("\nThree or more consecutive mistakes: reconsider the approach entirely before responding.\n");
        } else if self.consecutive_mistakes >= FIX_ESCALATION_THRESHOLD_2 {
            prompt.push_str("\nTwo consecutive mistakes: be especially careful to match the exact existing text.\n");
        }
        if failure_text.to_lowercase().contains("search") {
            if let Some(path) = self.active_step_id.as_ref().and_then(|_| self.file_path_mentioned_in(&failure_text)) {
                if let Ok(content) = self.executor.read_file(&path) {
                    let truncated: String = content.chars().take(FIX_FILE_CONTENT_CAP).collect();
                    prompt.push_str(&format!("\nCurrent content of {path}:\n{truncated}\n"));
                }
            }
        }
        prompt.push_str("\nRespond with a corrected JSON file operation.");

        let raw_action = match self.call_llm(PromptMode::Action, None, &prompt) {
            Ok(text) => text,
            Err(e) => {
                self.last_error = Some(EngineError::FixCapExceeded { step_id, message: e });
                return EngineState::Error;
            }
        };

        let op = match self.parse_action(&raw_action) {
            Ok(op) => op,
            Err(msg) => {
                self.fail_step(&step_id, msg);
                return if *self.fix_attempts.get(&step_id).unwrap() >= self.config.max_fix_attempts {
                    EngineState::Error
                } else {
                    EngineState::Fixing
                };
            }
        };

        match self.execute_operation(&op) {
            Ok(result) => {
                let s = self.plan.step_mut(&step_id).unwrap();
                s.status = StepStatus::Done;
                s.result = Some(result);
                EngineState::Observing
            }
            Err(msg) => {
                self.fail_step(&step_id, format!("[Fix failed] {msg}"));
                EngineState::Observing
            }
        }
    }

    // ── Reviewing ──

    fn handle_reviewing(&mut self) -> EngineState {
        let step_id = self.active_step_id.clone().expect("reviewing with no active step");
        let mut session = self.review_session.take().expect("reviewing with no session");

        let round_number = session.rounds.len() as u32 + 1;
        let role = review_role_for_round(round_number);
        let model = if role_uses_critic_model(role) { self.config.reviewer_model.clone() } else { None };

        let step = self.plan.step(&step_id).cloned().unwrap_or_else(|| PlanStep::new(&step_id, ""));
        let history = render_rounds(&session.rounds);
        let prompt = format!(
            "Step: {}\nAction: {}\nResult: {}\n\nPrevious rounds:\n{history}\n\nProvide your {:?} as prose.",
            step.description,
            step.action.clone().unwrap_or_default(),
            step.result.clone().unwrap_or_default(),
            role,
        );

        let content = self.call_llm_with_model(model.as_deref(), PromptMode::Action, &prompt).unwrap_or_default();
        session.push_round(role, content);

        let convergence = convergence::score(&session.rounds);
        let forced = session.rounds.len() as u32 >= self.config.max_review_iterations;

        let final_result = if matches!(convergence.recommendation, Recommendation::Converged) {
            Some(convergence)
        } else if forced {
            Some(ConvergenceResult::forced_stalled(convergence.overall_score, convergence.subscores.clone()))
        } else {
            None
        };

        match final_result {
            Some(result) => {
                session.convergence = Some(result);
                self.review_session = Some(session);
                EngineState::Synthesizing
            }
            None => {
                self.review_session = Some(session);
                EngineState::Reviewing
            }
        }
    }

    // ── Debating ──

    fn handle_debating(&mut self) -> EngineState {
        let strategy = self.config.plan_strategy;
        let mut session = self
            .debate_session
            .take()
            .unwrap_or_else(|| DebateSession::new(strategy));

        let round_number = session.rounds.len() as u32 + 1;
        let role = debate_role_for_round(round_number, strategy);
        let model = if role_uses_critic_model(role) { self.config.critic_model.clone() } else { None };

        let history = render_rounds(&session.rounds);
        let prompt = format!(
            "Proposed plan:\n{}\n\nPrevious rounds:\n{history}\n\nProvide your {:?} as prose.",
            render_plan(&self.plan),
            role,
        );

        let content = self.call_llm_with_model(model.as_deref(), PromptMode::Action, &prompt).unwrap_or_default();
        session.push_round(role, content);

        let convergence = convergence::score(&session.rounds);
        let forced = session.rounds.len() as u32 >= self.config.max_debate_iterations;

        let final_result = if matches!(convergence.recommendation, Recommendation::Converged) {
            Some(convergence)
        } else if forced {
            Some(ConvergenceResult::forced_stalled(convergence.overall_score, convergence.subscores.clone()))
        } else {
            None
        };

        match final_result {
            Some(result) => {
                session.convergence = Some(result);
                self.debate_session = Some(session);
                EngineState::Synthesizing
            }
            None => {
                self.debate_session = Some(session);
                EngineState::Debating
            }
        }
    }

    // ── Synthesizing ──

    fn handle_synthesizing(&mut self) -> EngineState {
        if let Some(mut session) = self.review_session.take() {
            let history = render_rounds(&session.rounds);
            let synthesis = self
                .call_llm(PromptMode::Action, None, &format!("Summarize this review into one synthesis:\n{history}"))
                .unwrap_or_else(|_| fallback_synthesis(&session.rounds));
            session.synthesis = Some(synthesis.clone());
            self.emit(EngineEvent::SynthesisComplete(synthesis));
            self.emit(EngineEvent::ReviewComplete {
                step_id: self.active_step_id.clone().unwrap_or_default(),
                rounds: session.rounds.clone(),
                convergence: session.convergence.clone().unwrap_or_else(ConvergenceResult::not_enough_rounds),
            });
            self.review_session = Some(session);
            return EngineState::WaitingForReviewDecision;
        }

        if let Some(mut session) = self.debate_session.take() {
            let history = render_rounds(&session.rounds);
            let synthesis = self
                .call_llm(PromptMode::Action, None, &format!("Summarize this debate into one synthesis:\n{history}"))
                .unwrap_or_else(|_| fallback_synthesis(&session.rounds));
            session.synthesis = Some(synthesis.clone());
            self.emit(EngineEvent::SynthesisComplete(synthesis));
            self.emit(EngineEvent::DebateComplete {
                rounds: session.rounds.clone(),
                convergence: session.convergence.clone().unwrap_or_else(ConvergenceResult::not_enough_rounds),
            });
            self.debate_session = Some(session);
            return EngineState::WaitingForDebateDecision;
        }

        EngineState::Executing
    }

    // ── Waiting* resolution, invoked by dispatch() only indirectly: the
    // run() loop stops at Waiting* states, so resolution happens out of
    // band via resolve_*_decision plus an explicit resume call. ──

    pub fn resume_from_review(&mut self) -> EngineState {
        if self.state != EngineState::WaitingForReviewDecision {
            return self.state;
        }
        let decision = self.review_suspender.take().unwrap_or(ReviewDecision::Skip);
        let step_id = self.active_step_id.clone().unwrap_or_default();
        let session = self.review_session.take();

        let next = match decision {
            ReviewDecision::ApplyFix => {
                if let Some(session) = &session {
                    let issues = render_rounds(&session.rounds);
                    let synthesis = session.synthesis.clone().unwrap_or_default();
                    self.fail_step(&step_id, format!("{synthesis}\n\nIssues:\n{issues}"));
                }
                self.reviewed_step_ids.insert(step_id);
                EngineState::Fixing
            }
            ReviewDecision::Skip => EngineState::Executing,
        };

        self.set_state(next);
        self.run()
    }

    pub fn resume_from_debate(&mut self) -> EngineState {
        if self.state != EngineState::WaitingForDebateDecision {
            return self.state;
        }
        let decision = self.debate_suspender.take().unwrap_or(DebateDecision::Accept);
        let session = self.debate_session.take();

        let next = match decision {
            DebateDecision::Revise => {
                if let Some(session) = &session {
                    let synthesis = session.synthesis.clone().unwrap_or_default();
                    if let Ok(revised) = self.call_llm(PromptMode::Planning, None, &format!("Revise the plan given:\n{synthesis}")) {
                        let plan = parse_plan(&revised);
                        if !plan.is_empty() {
                            self.plan = plan;
                            self.emit(EngineEvent::PlanChanged(self.plan.clone()));
                        }
                    }
                }
                EngineState::Planning
            }
            DebateDecision::Accept => EngineState::Executing,
        };

        self.set_state(next);
        self.run()
    }
}

fn operation_label(op: &FileOperation) -> &'static str {
    match &op.kind {
        OperationKind::Create { .. } => "create",
        OperationKind::Edit(_) => "edit",
        OperationKind::Replace(_) => "replace",
        OperationKind::WriteFull { .. } => "write_full",
        OperationKind::Prepend { .. } => "prepend",
        OperationKind::Append { .. } => "append",
        OperationKind::Delete => "delete",
        OperationKind::Read => "read",
        OperationKind::MultiWrite { .. } => "multi_write",
        OperationKind::Run { .. } => "run",
    }
}

fn is_clean_success(result: &str) -> bool {
    let lower = result.to_lowercase();
    ["successfully", "success", "created", "updated", "wrote"]
        .iter()
        .any(|kw| lower.contains(kw))
}

fn render_rounds(rounds: &[forgeflow_core::DiscussionRound]) -> String {
    rounds
        .iter()
        .map(|r| format!("Round {} ({:?}): {}", r.round, r.role, r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_plan(plan: &Plan) -> String {
    plan.steps()
        .iter()
        .map(|s| format!("- [{:?}] {}", s.status, s.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Checkpoint, Executor, SearchContext};
    use forgeflow_llm::ChatResponse;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tempfile::tempdir;

    struct ScriptedLlm {
        responses: RefCell<VecDeque<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Self {
            Self { responses: RefCell::new(responses.into_iter().map(str::to_string).collect()) }
        }
    }

    impl LlmCollaborator for ScriptedLlm {
        fn stream_chat(
            &self,
            _request: ChatRequest,
            on_chunk: &mut dyn FnMut(&str),
        ) -> Result<ChatResponse, forgeflow_llm::LlmError> {
            let text = self.responses.borrow_mut().pop_front().unwrap_or_default();
            on_chunk(&text);
            Ok(ChatResponse { text, usage: None })
        }
    }

    struct NullSearch;
    impl SearchContext for NullSearch {
        fn search_relevant_files(&self, _query: &str) -> Vec<String> {
            Vec::new()
        }
        fn assemble_context(&self, _paths: &[String], _token_budget: usize) -> String {
            String::new()
        }
    }

    struct NullExecutor;
    impl Executor for NullExecutor {
        fn execute(&self, _op: &FileOperation) -> Result<String, String> {
            Ok("ran".to_string())
        }
        fn read_file(&self, _path: &str) -> Result<String, String> {
            Err("not found".to_string())
        }
    }

    struct NullObserver;
    impl Observer for NullObserver {
        fn get_diagnostics(&self) -> Vec<forgeflow_observe::Diagnostic> {
            Vec::new()
        }
    }

    struct NullCheckpoint;
    impl Checkpoint for NullCheckpoint {
        fn create(&self, _plan: &Plan) -> String {
            "checkpoint-1".to_string()
        }
    }

    fn engine_with(root: &std::path::Path, llm_responses: Vec<&str>) -> Engine {
        Engine::new(
            root,
            EngineConfig::default(),
            Box::new(ScriptedLlm::new(llm_responses)),
            Box::new(NullSearch),
            Box::new(NullExecutor),
            Box::new(NullObserver),
            Some(Box::new(NullCheckpoint)),
        )
    }

    #[test]
    fn happy_path_creates_files_and_reaches_done() {
        let dir = tempdir().unwrap();
        let plan_text = "- [ ] Create utils.ts\n- [ ] Use it in main.ts";
        let action_one = r#"{"path":"utils.ts","type":"create","content":"export const x = 1;"}"#;
        let action_two = r#"{"path":"main.ts","type":"create","content":"import { x } from './utils';"}"#;
        let mut engine = engine_with(dir.path(), vec![plan_text, action_one, action_two]);

        engine.start("build a feature");
        let state = engine.run();

        assert_eq!(state, EngineState::Done);
        assert!(engine.plan().all_done());
        assert!(dir.path().join("utils.ts").exists());
        assert!(dir.path().join("main.ts").exists());
    }

    #[test]
    fn framed_block_action_is_parsed_via_operation_parser() {
        let dir = tempdir().unwrap();
        let plan_text = "- [ ] Create utils.ts";
        let action = "<<<FILE_OPERATION>>>\nTYPE: create\nPATH: utils.ts\nCONTENT:\nexport const x = 1;\n<<<END_OPERATION>>>";
        let mut engine = engine_with(dir.path(), vec![plan_text, action]);

        engine.start("build a feature");
        let state = engine.run();

        assert_eq!(state, EngineState::Done);
        assert!(dir.path().join("utils.ts").exists());
    }

    #[test]
    fn search_mismatch_is_corrected_by_preflight_without_entering_fixing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "const foo = 1;").unwrap();
        let plan_text = "- [ ] Update a.ts";
        let action = r#"{"path":"a.ts","type":"edit","search":"nonexistent","replace":"bar"}"#;
        let correction = r#"{"path":"a.ts","type":"edit","search":"foo","replace":"renamed"}"#;
        let mut engine = engine_with(dir.path(), vec![plan_text, action, correction]);

        engine.start("rename foo");
        let state = engine.run();

        assert_eq!(state, EngineState::Done);
        let content = std::fs::read_to_string(dir.path().join("a.ts")).unwrap();
        assert!(content.contains("renamed"));
        assert!(engine.plan().steps()[0].status == StepStatus::Done);
    }

    #[test]
    fn destructive_write_full_is_refused_and_drives_fixing() {
        let dir = tempdir().unwrap();
        let existing = "x".repeat(500);
        std::fs::write(dir.path().join("a.ts"), &existing).unwrap();
        let plan_text = "- [ ] Rewrite a.ts";
        let bad_action = r#"{"path":"a.ts","type":"write_full","content":"short"}"#;
        let mut config = EngineConfig::default();
        config.max_fix_attempts = 1;
        let mut engine = Engine::new(
            dir.path(),
            config,
            Box::new(ScriptedLlm::new(vec![plan_text, bad_action, bad_action])),
            Box::new(NullSearch),
            Box::new(NullExecutor),
            Box::new(NullObserver),
            None,
        );

        engine.start("rewrite file");
        let state = engine.run();

        assert_eq!(state, EngineState::Error);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.ts")).unwrap(), existing);
    }

    #[test]
    fn fix_cap_exhaustion_reaches_error_state() {
        let dir = tempdir().unwrap();
        let plan_text = "- [ ] Do something";
        let unparseable = "not json at all";
        let mut config = EngineConfig::default();
        config.max_fix_attempts = 2;
        let mut engine = Engine::new(
            dir.path(),
            config,
            Box::new(ScriptedLlm::new(vec![plan_text, unparseable, unparseable, unparseable])),
            Box::new(NullSearch),
            Box::new(NullExecutor),
            Box::new(NullObserver),
            None,
        );

        engine.start("do something");
        let state = engine.run();

        assert_eq!(state, EngineState::Error);
        assert!(engine.last_error().is_some());
    }

    #[test]
    fn empty_plan_response_reaches_done() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with(dir.path(), vec![""]);
        engine.start("do nothing");
        let state = engine.run();
        assert_eq!(state, EngineState::Done);
    }

    #[test]
    fn review_converges_and_suspends_for_decision() {
        let dir = tempdir().unwrap();
        let plan_text = "- [ ] Create a.ts";
        let action = r#"{"path":"a.ts","type":"create","content":"export const x = 1;"}"#;
        let critique = "NEEDS_FIX the naming";
        let rebuttal = "Addressed. APPROVE, no blockers.";
        let synthesis = "Synthesis: approved after one fix.";
        let mut config = EngineConfig::default();
        config.enable_multi_model_review = true;
        let mut engine = Engine::new(
            dir.path(),
            config,
            Box::new(ScriptedLlm::new(vec![plan_text, action, critique, rebuttal, synthesis])),
            Box::new(NullSearch),
            Box::new(NullExecutor),
            Box::new(NullObserver),
            None,
        );

        engine.start("build feature with review");
        let state = engine.run();

        assert_eq!(state, EngineState::WaitingForReviewDecision);
        engine.resolve_review_decision(ReviewDecision::Skip);
        let state = engine.resume_from_review();
        assert_eq!(state, EngineState::Done);
    }

    #[test]
    fn reset_clears_state_and_fulfills_pending_decision() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with(dir.path(), vec![]);
        engine.reset();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.plan().is_empty());
    }

    #[test]
    fn run_is_idempotent_for_done_state() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with(dir.path(), vec![""]);
        engine.start("nothing");
        assert_eq!(engine.run(), EngineState::Done);
        assert_eq!(engine.run(), EngineState::Done);
    }
}
