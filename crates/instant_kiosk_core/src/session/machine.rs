//! Token-refresh state machine of one open sync session.
//!
//! # Responsibility
//! - Decide how each sync engine callback is handled: token refresh, local
//!   storage wipe, session termination or a user notice.
//! - Own the "error already shown" flag of the session.
//!
//! # Invariants
//! - At most one token refresh is in flight: an auth failure that arrives
//!   while `Authenticating` produces no action.
//! - Only `ReauthSucceeded`/`ReauthFailed` leave `Authenticating`.
//! - A notice is emitted at most once until a success event resets the flag.
//! - Once closed, the machine ignores every event.
//! - The machine performs no I/O; the controller executes its actions.

use crate::model::descriptor::DocumentId;
use crate::model::notice::Notice;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Error codes reported by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorCode {
    /// The session token was rejected, typically because it expired.
    AuthenticationFailed,
    UserCancelled,
    AlreadySyncing,
    /// Client too old for the server; the engine shows its own dialog.
    OldClient,
    OldServer,
    /// Any other engine error code.
    Other(i32),
}

impl Display for SyncErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthenticationFailed => write!(f, "authentication_failed"),
            Self::UserCancelled => write!(f, "user_cancelled"),
            Self::AlreadySyncing => write!(f, "already_syncing"),
            Self::OldClient => write!(f, "old_client"),
            Self::OldServer => write!(f, "old_server"),
            Self::Other(code) => write!(f, "other_{code}"),
        }
    }
}

/// Lifecycle state of the session's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Authenticating,
    Synced,
    AuthExpired,
}

/// Inputs of the machine: engine callbacks plus refresh completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SyncStarted,
    SyncFinished,
    SyncError(SyncErrorCode),
    AuthenticationFinished,
    AuthenticationFailed(SyncErrorCode),
    Corrupted,
    Invalidated,
    ReauthSucceeded,
    ReauthFailed,
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Fetch a new token for the document and re-authenticate with it.
    RefreshToken { document_id: DocumentId },
    ShowNotice(Notice),
    /// Discard all local sync state of the document.
    RemoveLocalStorage { document_id: DocumentId },
    /// Terminate the viewing session.
    CloseSession,
}

/// Pure state machine for one document session.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    document_id: DocumentId,
    state: SessionState,
    error_shown: bool,
    closed: bool,
}

impl SessionMachine {
    pub fn new(document_id: impl Into<DocumentId>) -> Self {
        Self {
            document_id: document_id.into(),
            state: SessionState::Idle,
            error_shown: false,
            closed: false,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn error_shown(&self) -> bool {
        self.error_shown
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Applies one event and returns the actions to execute, in order.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        if self.closed {
            debug!(
                "event=session_event module=session status=ignored reason=closed document_id={}",
                self.document_id
            );
            return Vec::new();
        }

        match event {
            SessionEvent::SyncStarted => Vec::new(),
            SessionEvent::SyncFinished | SessionEvent::AuthenticationFinished => {
                if self.state == SessionState::Authenticating {
                    // Only the refresh outcome leaves `Authenticating`.
                    self.error_shown = false;
                } else {
                    self.mark_synced();
                }
                Vec::new()
            }
            SessionEvent::SyncError(SyncErrorCode::AuthenticationFailed) => self.begin_refresh(),
            SessionEvent::SyncError(code) => self.notify_sync_error(code).into_iter().collect(),
            SessionEvent::AuthenticationFailed(code) => {
                if self.state != SessionState::Authenticating {
                    self.state = SessionState::AuthExpired;
                }
                self.notify_sync_error(code).into_iter().collect()
            }
            SessionEvent::ReauthSucceeded => {
                info!(
                    "event=session_reauth module=session status=ok document_id={}",
                    self.document_id
                );
                self.mark_synced();
                Vec::new()
            }
            SessionEvent::ReauthFailed => {
                warn!(
                    "event=session_reauth module=session status=error document_id={}",
                    self.document_id
                );
                self.state = SessionState::AuthExpired;
                self.notify_once(Notice::AuthenticationFailed)
                    .into_iter()
                    .collect()
            }
            SessionEvent::Corrupted => {
                warn!(
                    "event=session_corrupted module=session status=error document_id={}",
                    self.document_id
                );
                vec![SessionAction::RemoveLocalStorage {
                    document_id: self.document_id.clone(),
                }]
            }
            SessionEvent::Invalidated => {
                info!(
                    "event=session_invalidated module=session status=closing document_id={}",
                    self.document_id
                );
                self.closed = true;
                vec![SessionAction::CloseSession]
            }
        }
    }

    fn begin_refresh(&mut self) -> Vec<SessionAction> {
        if self.state == SessionState::Authenticating {
            debug!(
                "event=session_reauth module=session status=ignored reason=in_flight document_id={}",
                self.document_id
            );
            return Vec::new();
        }

        info!(
            "event=session_reauth module=session status=start document_id={}",
            self.document_id
        );
        self.state = SessionState::Authenticating;
        vec![SessionAction::RefreshToken {
            document_id: self.document_id.clone(),
        }]
    }

    fn mark_synced(&mut self) {
        self.state = SessionState::Synced;
        self.error_shown = false;
    }

    fn notify_sync_error(&mut self, code: SyncErrorCode) -> Option<SessionAction> {
        if matches!(
            code,
            SyncErrorCode::UserCancelled | SyncErrorCode::AlreadySyncing
        ) {
            return None;
        }
        if self.error_shown {
            return None;
        }
        self.error_shown = true;

        warn!(
            "event=session_sync_error module=session status=error error_code={} document_id={}",
            code, self.document_id
        );
        match code {
            SyncErrorCode::OldClient => None,
            SyncErrorCode::OldServer => Some(SessionAction::ShowNotice(Notice::OldServer)),
            _ => Some(SessionAction::ShowNotice(Notice::SyncFailed)),
        }
    }

    fn notify_once(&mut self, notice: Notice) -> Option<SessionAction> {
        if self.error_shown {
            return None;
        }
        self.error_shown = true;
        Some(SessionAction::ShowNotice(notice))
    }
}
