pub mod cache;
pub mod collaborators;
pub mod guardrail;
pub mod pipeline;
pub mod plan;
