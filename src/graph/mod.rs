//! Workflow graph construction and validation.

mod builder;
mod validate;

pub use builder::WorkflowBuilder;
pub use validate::{ValidationError, ValidationWarning, validate, validate_virtual};
