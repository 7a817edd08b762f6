//! Database entity models for the ledger's database backend.
//!
//! The primary entity in this module is `submission`, which represents the
//! table that completed submissions are appended to.

/// Submission entity model for Sea-ORM database interaction.
pub mod submission;
