//! covlens core library — execution records, class-file analysis, aggregation, and reports.
//!
//! The main entry point is [`pipeline::CoveragePipeline`], which runs the
//! Analyze → Aggregate → Render pipeline for one project. Callers that keep a
//! current result across runs use [`session::CoverageSession`].

pub mod analyze;
pub mod config;
pub mod discover;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod exec;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod session;
pub mod types;
