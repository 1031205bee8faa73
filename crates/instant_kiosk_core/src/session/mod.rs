//! Sync session control for opened documents.
//!
//! # Responsibility
//! - Keep the token-refresh decision logic (`machine`) separate from the
//!   async execution of its actions (`controller`).

pub mod controller;
pub mod machine;
