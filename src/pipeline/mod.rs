//! The staged request pipeline: orchestrator (C9) and the message types
//! that flow between it and the audio pipeline (C4).

pub mod coordinator;
pub mod messages;

pub use coordinator::PipelineOrchestrator;
