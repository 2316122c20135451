//! Pipeline stages: preprocess, extract, structure.
//!
//! Each stage is a pure async function over its inputs plus the shared
//! [`crate::config::PipelineConfig`]. Stages never touch the job record; the
//! orchestrator in [`crate::process`] sequences them and owns all state.

pub mod extract;
pub mod preprocess;
pub mod structure;
