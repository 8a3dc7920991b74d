//! Domain model for kubegrade.
//!
//! This module defines the grading vocabulary:
//! - `RubricItem` / `Rubric`: what is scored and how much it is worth
//! - `CheckVerdict` / `CheckOutcome`: what a check observed
//! - typed workload views parsed from raw manifests
//! - error taxonomy (`LoadError`, `GradeError`)

pub mod error;
pub mod outcome;
pub mod rubric;
pub mod workload;

pub use error::{GradeError, LoadError, Result};
pub use outcome::{CheckOutcome, CheckStatus, CheckVerdict};
pub use rubric::{CheckKind, Rubric, RubricItem, CONVENTIONAL_TOTAL};
