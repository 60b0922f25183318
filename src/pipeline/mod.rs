/// Batch pipeline module
///
/// This module turns a batch message into published derivatives:
/// - Deterministic keys, URLs and the update query (naming.rs)
/// - The per-image fetch/transform stage (stage.rs)
/// - Fan-out, publishing, cleanup and persistence (orchestrator.rs)

pub mod naming;
pub mod orchestrator;
pub mod stage;

pub use orchestrator::{BatchReport, Orchestrator};
