use forgeflow_core::{FileOperation, Plan};

/// Finds and assembles the file context fed into planning/fix prompts.
pub trait SearchContext {
    fn search_relevant_files(&self, query: &str) -> Vec<String>;
    fn assemble_context(&self, paths: &[String], token_budget: usize) -> String;
}

/// Carries out approved operations and reads file content for prompts.
/// All paths are workspace-relative with forward slashes.
pub trait Executor {
    fn execute(&self, op: &FileOperation) -> Result<String, String>;
    fn read_file(&self, path: &str) -> Result<String, String>;
}

/// Opaque snapshot-and-restore over the workspace and a copy of the Plan.
pub trait Checkpoint {
    fn create(&self, plan: &Plan) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct InMemoryExecutor {
        files: std::cell::RefCell<HashMap<String, String>>,
    }

    impl Executor for InMemoryExecutor {
        fn execute(&self, op: &FileOperation) -> Result<String, String> {
            self.files.borrow_mut().insert(op.path.clone(), "written".into());
            Ok("created".into())
        }

        fn read_file(&self, path: &str) -> Result<String, String> {
            self.files
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| "not found".to_string())
        }
    }

    #[test]
    fn executor_trait_is_object_safe_and_stateful() {
        let executor = InMemoryExecutor {
            files: std::cell::RefCell::new(HashMap::new()),
        };
        let op = FileOperation::new("a.rs", forgeflow_core::OperationKind::Create { content: "x".into() });
        executor.execute(&op).unwrap();
        assert_eq!(executor.read_file("a.rs").unwrap(), "written");
    }
}
