//! Persisted client configuration.

pub mod preferences;
