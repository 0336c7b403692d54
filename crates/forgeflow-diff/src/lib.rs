pub mod json_extract;
pub mod parse;
pub mod patch;
pub mod sanitize;

pub use json_extract::{extract_balanced_json, ExtractError};
pub use parse::parse_operations;
pub use patch::{GuardRefusal, PatchError, PatchOutcome, Patcher};
pub use sanitize::sanitize;
