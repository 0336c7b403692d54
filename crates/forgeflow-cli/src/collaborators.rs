use std::cell::RefCell;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use forgeflow_agent::{Checkpoint, Executor, SearchContext};
use forgeflow_core::{FileOperation, OperationKind, Plan};
use forgeflow_llm::{ChatRequest, ChatResponse, LlmCollaborator, LlmError};
use forgeflow_observe::{Diagnostic, Observer};

/// Prompts the human at the terminal for each LLM turn: prints the
/// assembled messages, then reads a response terminated by a line
/// containing only `END`. Stands in for a real model client, which is
/// deliberately out of scope for this crate.
pub struct InteractiveLlm;

impl LlmCollaborator for InteractiveLlm {
    fn stream_chat(
        &self,
        request: ChatRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<ChatResponse, LlmError> {
        println!("\n--- LLM turn ({} messages) ---", request.messages.len());
        for message in &request.messages {
            println!("[{}]", role_label(message));
            println!("{}", message.content());
        }
        println!("--- respond below, end with a line containing only END ---");

        let mut text = String::new();
        let stdin = io::stdin();
        loop {
            if request.cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            let mut line = String::new();
            let read = stdin
                .read_line(&mut line)
                .map_err(|e| LlmError::Stream(e.to_string()))?;
            if read == 0 || line.trim_end() == "END" {
                break;
            }
            text.push_str(&line);
        }

        let visible = text.trim_end().to_string();
        on_chunk(&visible);
        Ok(ChatResponse { text: visible, usage: None })
    }
}

fn role_label(message: &forgeflow_core::ChatMessage) -> &'static str {
    match message {
        forgeflow_core::ChatMessage::System { .. } => "system",
        forgeflow_core::ChatMessage::User { .. } => "user",
        forgeflow_core::ChatMessage::Assistant { .. } => "assistant",
    }
}

/// Lists workspace files whose name contains a query keyword, and
/// concatenates their content up to a rough character budget.
pub struct FsSearchContext {
    root: PathBuf,
}

impl FsSearchContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(&self, dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some("target") {
                continue;
            }
            if path.is_dir() {
                self.walk(&path, out);
            } else {
                out.push(path);
            }
        }
    }
}

impl SearchContext for FsSearchContext {
    fn search_relevant_files(&self, query: &str) -> Vec<String> {
        let keywords: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();
        let mut all = Vec::new();
        self.walk(&self.root, &mut all);

        all.into_iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(&self.root).ok()?.to_string_lossy().to_string();
                let lower = relative.to_lowercase();
                if keywords.iter().any(|k| !k.is_empty() && lower.contains(k.as_str())) {
                    Some(relative)
                } else {
                    None
                }
            })
            .collect()
    }

    fn assemble_context(&self, paths: &[String], token_budget: usize) -> String {
        let char_budget = token_budget.saturating_mul(4);
        let mut out = String::new();
        for path in paths {
            if out.len() >= char_budget {
                break;
            }
            if let Ok(content) = std::fs::read_to_string(self.root.join(path)) {
                out.push_str(&format!("\n--- {path} ---\n"));
                let remaining = char_budget.saturating_sub(out.len());
                out.push_str(&content.chars().take(remaining).collect::<String>());
            }
        }
        out
    }
}

/// Runs `run` operations as real shell commands and reads real files.
/// File-mutating operations are applied by the engine's own Patcher and
/// never reach this collaborator.
pub struct FsExecutor {
    root: PathBuf,
}

impl FsExecutor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Executor for FsExecutor {
    fn execute(&self, op: &FileOperation) -> Result<String, String> {
        match &op.kind {
            OperationKind::Run { command } => {
                let output = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .current_dir(&self.root)
                    .output()
                    .map_err(|e| e.to_string())?;
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() {
                    Ok(combined)
                } else {
                    Err(combined)
                }
            }
            OperationKind::Read => self.read_file(&op.path),
            other => Err(format!("FsExecutor does not handle {other:?} directly; the Patcher applies it")),
        }
    }

    fn read_file(&self, path: &str) -> Result<String, String> {
        std::fs::read_to_string(self.root.join(path)).map_err(|e| e.to_string())
    }
}

/// No diagnostics: this demo has no linter/compiler wired up.
pub struct NullObserver;

impl Observer for NullObserver {
    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        Vec::new()
    }
}

/// Prints a plan snapshot to stderr and hands back a monotonically
/// increasing id; a real implementation would snapshot the workspace.
pub struct PrintingCheckpoint {
    counter: RefCell<u64>,
}

impl PrintingCheckpoint {
    pub fn new() -> Self {
        Self { counter: RefCell::new(0) }
    }
}

impl Checkpoint for PrintingCheckpoint {
    fn create(&self, plan: &Plan) -> String {
        let mut counter = self.counter.borrow_mut();
        *counter += 1;
        let id = format!("checkpoint-{counter}");
        let _ = writeln!(io::stderr(), "[{id}] {} step(s) in plan", plan.steps().len());
        id
    }
}
