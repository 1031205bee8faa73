//! User-visible failure notices.
//!
//! Core code decides *whether* a notice is shown; rendering it is left to the
//! UI collaborator.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A one-shot message for the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// The catalog could not be fetched from the server.
    CatalogUnavailable,
    /// Annotation sync failed for a generic reason.
    SyncFailed,
    /// Sync failed because the token could not be renewed.
    AuthenticationFailed,
    /// The sync server is older than this client supports.
    OldServer,
}

impl Notice {
    pub fn message(self) -> &'static str {
        match self {
            Self::CatalogUnavailable => "Could not list documents from the server.",
            Self::SyncFailed => "Error while syncing annotations.",
            Self::AuthenticationFailed => {
                "Error while syncing annotations: authentication failed."
            }
            Self::OldServer => "The server is too old for this client. Update the server.",
        }
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}
