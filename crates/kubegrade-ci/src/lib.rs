//! kubegrade CI - the grading pipeline
//!
//! Drives one grading run end to end:
//! - applies the submission in order, retrying connectivity failures
//! - runs manifest-only checks synchronously
//! - polls live checks concurrently under a run deadline
//! - scores the outcomes and evaluates the pass gate

pub mod apply;
pub mod gate;
pub mod pipeline;
pub mod runner;
pub mod spec;

pub use apply::{apply_all, delete_all, ApplyRecord, ApplyResult};
pub use gate::{GateVerdict, GradeGate};
pub use pipeline::{GradingPipeline, GradingResult};
pub use runner::{LiveJob, LiveRunner, ProbeFn};
pub use spec::GradeSpec;
