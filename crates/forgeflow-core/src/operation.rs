use serde::{Deserialize, Serialize};

/// The raw SEARCH/REPLACE body of an edit-like operation. Either `content`
/// carries a framed diff (or a bare snippet for anchor-matching) or the
/// explicit `search`/`replace` pair is populated directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,
}

/// Tagged variant over the operation kinds the Patcher knows how to apply,
/// plus `read`/`run` which are delegated to external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Create { content: String },
    Edit(EditBody),
    Replace(EditBody),
    WriteFull { content: String },
    Prepend { content: String },
    Append { content: String },
    Delete,
    Read,
    MultiWrite { atomic: bool, operations: Vec<FileOperation> },
    Run { command: String },
}

/// A single file-level operation extracted from LLM output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileOperation {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: OperationKind,
}

impl FileOperation {
    pub fn new(path: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            path: path.into(),
            description: None,
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Identity tuple used for exact-duplicate removal (§4.2): (type, path,
    /// content, search, replace).
    pub fn dedup_key(&self) -> (&'static str, String, Option<String>, Option<String>, Option<String>) {
        match &self.kind {
            OperationKind::Create { content } => {
                ("create", self.path.clone(), Some(content.clone()), None, None)
            }
            OperationKind::Edit(body) => (
                "edit",
                self.path.clone(),
                body.content.clone(),
                body.search.clone(),
                body.replace.clone(),
            ),
            OperationKind::Replace(body) => (
                "replace",
                self.path.clone(),
                body.content.clone(),
                body.search.clone(),
                body.replace.clone(),
            ),
            OperationKind::WriteFull { content } => {
                ("write_full", self.path.clone(), Some(content.clone()), None, None)
            }
            OperationKind::Prepend { content } => {
                ("prepend", self.path.clone(), Some(content.clone()), None, None)
            }
            OperationKind::Append { content } => {
                ("append", self.path.clone(), Some(content.clone()), None, None)
            }
            OperationKind::Delete => ("delete", self.path.clone(), None, None, None),
            OperationKind::Read => ("read", self.path.clone(), None, None, None),
            OperationKind::MultiWrite { .. } => {
                ("multi_write", self.path.clone(), None, None, None)
            }
            OperationKind::Run { command } => {
                ("run", self.path.clone(), Some(command.clone()), None, None)
            }
        }
    }

    pub fn is_write_full(&self) -> bool {
        matches!(self.kind, OperationKind::WriteFull { .. })
    }

    pub fn is_edit_like(&self) -> bool {
        matches!(self.kind, OperationKind::Edit(_) | OperationKind::Replace(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_distinguishes_kind_and_path() {
        let a = FileOperation::new("a.rs", OperationKind::Create { content: "x".into() });
        let b = FileOperation::new("b.rs", OperationKind::Create { content: "x".into() });
        let c = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody {
                content: Some("x".into()),
                ..Default::default()
            }),
        );
        assert_ne!(a.dedup_key(), b.dedup_key());
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn dedup_key_equal_for_identical_edits() {
        let body = EditBody {
            search: Some("foo".into()),
            replace: Some("bar".into()),
            ..Default::default()
        };
        let a = FileOperation::new("a.rs", OperationKind::Edit(body.clone()));
        let b = FileOperation::new("a.rs", OperationKind::Edit(body));
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn is_write_full_and_edit_like_flags() {
        let write_full = FileOperation::new("a.rs", OperationKind::WriteFull { content: "x".into() });
        let edit = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody::default()),
        );
        let create = FileOperation::new("a.rs", OperationKind::Create { content: "x".into() });
        assert!(write_full.is_write_full());
        assert!(!write_full.is_edit_like());
        assert!(edit.is_edit_like());
        assert!(!edit.is_write_full());
        assert!(!create.is_write_full());
        assert!(!create.is_edit_like());
    }

    #[test]
    fn operation_kind_serializes_with_tagged_type_field() {
        let op = FileOperation::new("a.rs", OperationKind::Delete);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["path"], "a.rs");
    }

    #[test]
    fn with_description_sets_field() {
        let op = FileOperation::new("a.rs", OperationKind::Delete).with_description("cleanup");
        assert_eq!(op.description.as_deref(), Some("cleanup"));
    }
}
