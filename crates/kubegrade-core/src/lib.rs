//! kubegrade core library
//!
//! Manifest loading, the rubric model, the individual checks, the poll
//! engine and the scorer. Nothing here talks to a cluster directly; live
//! checks receive pod snapshots from whoever drives them.

pub mod checks;
pub mod config;
pub mod domain;
pub mod manifest;
pub mod obs;
pub mod poll;
pub mod quantity;
pub mod scoring;
pub mod telemetry;

pub use checks::{evaluate_static, CheckContext};
pub use config::GradingConfig;
pub use domain::{
    CheckKind, CheckOutcome, CheckStatus, CheckVerdict, GradeError, LoadError, Result, Rubric,
    RubricItem, CONVENTIONAL_TOTAL,
};
pub use manifest::{ManifestLoader, Submission};
pub use poll::{poll_until, PollOutcome, PollPolicy, PollState};
pub use quantity::{Quantity, QuantityError};
pub use scoring::{score, ScoreReport, ScoreRow};
pub use telemetry::init_tracing;
