//! Control Protocol (C14): line-delimited JSON command/event/status wire
//! types (`protocol`) and the stdin/stdout bridge that drives them
//! against a [`crate::lifecycle::Lifecycle`] (`stdio`).

pub mod protocol;
pub mod stdio;
