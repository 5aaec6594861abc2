// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod classify;
pub mod config;
pub mod dedup;
pub mod error;
pub mod feeds;
pub mod images;
pub mod pipeline;
pub mod publish;
pub mod rewrite;
pub mod validate;

// ---- Re-exports for stable public API ----
pub use crate::config::{PipelineConfig, RunOverrides};
pub use crate::pipeline::{run_once, PipelineDeps, RunSummary};
pub use crate::publish::{Admission, PublishScheduler, PublishableItem};
