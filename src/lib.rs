//! Synheart Proctor - On-device proctoring session engine
//!
//! Proctor turns noisy per-frame perception signals and host focus events into
//! a bounded set of debounced violations, a session integrity score and a
//! reproducible report tied to quiz results:
//! perception → predicates → debouncing → violation ledger → risk scoring →
//! report.
//!
//! ## Modules
//!
//! - **Session**: the phase machine (`SessionController`) and its background
//!   capture/timer threads
//! - **Quiz**: question validation, parsing, generation fallback and scoring
//! - **Replay**: deterministic replays of recorded session logs

pub mod config;
pub mod debounce;
pub mod environment;
pub mod error;
pub mod ledger;
pub mod perception;
pub mod predicates;
pub mod quiz;
pub mod replay;
pub mod report;
pub mod risk;
pub mod session;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::ProctorConfig;
pub use error::ProctorError;
pub use quiz::{load_questions, QuestionGenerator, QuestionRequest, QuestionSet, QuizEngine};
pub use report::ReportBuilder;
pub use risk::RiskScorer;
pub use session::{MonitorHandle, SessionController, SessionState};
pub use types::{PerceptionSignal, Phase, Report, RiskLevel, ViolationEvent, ViolationKind};

/// Proctor version embedded in every report
pub const PROCTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "synheart-proctor";
