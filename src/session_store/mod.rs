//! SessionStore - Session and Audit Persistence
//!
//! ## Responsibilities
//!
//! - Session lifecycle rows (open / extend / close)
//! - Append-only motion audit log
//! - Retention purge of expired rows
//!
//! ## Design Principles
//!
//! - The "active session" fact is a row, not process memory
//! - Racing writers converge through conditional writes; the unique
//!   `active_key` index is the single-active-session witness

mod repository;
mod types;

pub use repository::{SessionHandle, SessionRepository};
pub use types::*;
