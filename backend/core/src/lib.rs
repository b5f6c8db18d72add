pub mod error;
pub mod reasoning;

pub use error::{classify_failure, FailureKind, LlmwsFailure};
pub use reasoning::strip_reasoning_tags;
