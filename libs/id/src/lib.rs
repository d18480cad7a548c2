//! # panelist-id
//!
//! Typed identifiers for the panelist scheduling engine.
//!
//! ## ID Kinds
//!
//! - **Generated IDs** (`AssignmentId`, `RunId`) are ULID-based with a type
//!   prefix: `{prefix}_{ulid}`. They are sortable by creation time and are
//!   produced by the engine itself.
//! - **Configured IDs** (`InterviewerId`) come from the interviewer registry.
//!   They are short slugs chosen by an operator (`sa1`, `alex.chen`) and are
//!   compared lexicographically when ranking ties need a final tie-break.
//!
//! Examples:
//! - `asgn_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `run_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `alex.chen`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
