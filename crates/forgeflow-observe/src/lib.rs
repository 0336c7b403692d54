use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn error(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            severity: Severity::Error,
            message: message.into(),
            line: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// The collaborator the engine consults after each execution step for
/// compiler/linter-style feedback on the workspace.
pub trait Observer {
    fn get_diagnostics(&self) -> Vec<Diagnostic>;
}

/// Formats a diagnostics list as the human-readable text the Observing
/// handler folds into a failed step's `result` string.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return String::new();
    }
    diagnostics
        .iter()
        .map(|d| match d.line {
            Some(line) => format!("[{:?}] {}:{}: {}", d.severity, d.file, line, d.message),
            None => format!("[{:?}] {}: {}", d.severity, d.file, d.message),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
