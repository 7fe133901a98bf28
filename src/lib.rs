//! Loan Document Pipeline
//!
//! A multi-stage document analysis pipeline for loan applications:
//! - Classifies uploaded documents and gates out anything that is not a
//!   readable, complete bank statement
//! - Extracts structured account data and transactions
//! - Scores risk with a deterministic, auditable compliance engine
//!   (the model never decides the outcome)
//!
//! PIPELINE:
//! START → CLASSIFY → (gate) → EXTRACT → VALIDATE → END

pub mod api;
pub mod compliance;
pub mod config;
pub mod error;
pub mod gemini;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod summary;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use pipeline::{CancelFlag, Pipeline};
