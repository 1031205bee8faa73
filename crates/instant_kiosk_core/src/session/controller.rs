//! Async driver of one document's sync session.
//!
//! # Responsibility
//! - Feed sync engine callbacks into `SessionMachine` on one coordinating
//!   task and execute the resulting actions.
//! - Run token refresh + re-authentication on background tasks and post the
//!   outcome back as an event.
//! - Open the document and switch between its layers.
//!
//! # Invariants
//! - Machine state is only touched through `&mut self`, i.e. by the task that
//!   owns the controller.
//! - Background work is aborted when the controller is shut down or dropped.

use crate::api::catalog_client::{CatalogApi, CatalogError};
use crate::model::descriptor::{DocumentDescriptor, LayerDescriptor};
use crate::model::notice::Notice;
use crate::session::machine::{
    SessionAction, SessionEvent, SessionMachine, SessionState, SyncErrorCode,
};
use async_trait::async_trait;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub type SessionResult<T> = Result<T, SessionError>;

/// Failure reported by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: SyncErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn new(code: SyncErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sync engine error {}: {}", self.code, self.message)
    }
}

impl Error for EngineError {}

/// Errors surfaced by controller operations.
#[derive(Debug)]
pub enum SessionError {
    TokenFetch(CatalogError),
    Engine(EngineError),
    LayerNotFound(String),
    Closed,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenFetch(err) => write!(f, "token refresh failed: {err}"),
            Self::Engine(err) => write!(f, "{err}"),
            Self::LayerNotFound(name) => write!(f, "layer not found: `{name}`"),
            Self::Closed => write!(f, "session is closed"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TokenFetch(err) => Some(err),
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CatalogError> for SessionError {
    fn from(value: CatalogError) -> Self {
        Self::TokenFetch(value)
    }
}

impl From<EngineError> for SessionError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

/// Collaborative sync engine of one opened document.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    /// Opens (or reopens) the document with a layer token.
    async fn open_with_token(&self, token: &str) -> Result<(), EngineError>;
    /// Re-authenticates the open session with a fresh token.
    async fn reauthenticate_with_token(&self, token: &str) -> Result<(), EngineError>;
    /// Discards all local sync state of the document.
    fn remove_local_storage(&self);
}

/// UI surface of an open document.
pub trait SessionView: Send + Sync {
    fn show_notice(&self, notice: Notice);
    /// Terminates the viewing session.
    fn close_session(&self);
}

/// Cloneable handle for posting engine callbacks to the controller.
#[derive(Debug, Clone)]
pub struct SessionEventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionEventSender {
    /// Posts one event; returns `false` when the controller is gone.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Coordinates one opened document with its sync engine.
pub struct SyncSessionController {
    descriptor: DocumentDescriptor,
    current_layer: Option<String>,
    machine: SessionMachine,
    catalog: Arc<dyn CatalogApi>,
    engine: Arc<dyn SyncEngine>,
    view: Arc<dyn SessionView>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    background: JoinSet<()>,
}

impl SyncSessionController {
    pub fn new(
        descriptor: DocumentDescriptor,
        catalog: Arc<dyn CatalogApi>,
        engine: Arc<dyn SyncEngine>,
        view: Arc<dyn SessionView>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            machine: SessionMachine::new(descriptor.document_id.clone()),
            descriptor,
            current_layer: None,
            catalog,
            engine,
            view,
            events_tx,
            events_rx,
            background: JoinSet::new(),
        }
    }

    pub fn event_sender(&self) -> SessionEventSender {
        SessionEventSender {
            tx: self.events_tx.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn is_closed(&self) -> bool {
        self.machine.is_closed()
    }

    pub fn descriptor(&self) -> &DocumentDescriptor {
        &self.descriptor
    }

    /// Layers the user can switch between.
    pub fn layers(&self) -> &[LayerDescriptor] {
        self.descriptor.layers()
    }

    /// Name of the layer currently open; `None` for the default layer.
    pub fn current_layer(&self) -> Option<&str> {
        self.current_layer.as_deref()
    }

    /// Opens the document on its default layer.
    pub async fn open(&mut self) -> SessionResult<()> {
        self.switch_layer(None).await
    }

    /// Reopens the document on `layer_name` (`None` = default layer).
    pub async fn switch_layer(&mut self, layer_name: Option<&str>) -> SessionResult<()> {
        if self.machine.is_closed() {
            return Err(SessionError::Closed);
        }
        let layer = self
            .descriptor
            .layer(layer_name)
            .ok_or_else(|| SessionError::LayerNotFound(layer_name.unwrap_or_default().to_string()))?;

        self.engine.open_with_token(&layer.token).await?;
        self.current_layer = layer.layer_name.clone();
        info!(
            "event=session_open module=session status=ok document_id={} layer={}",
            self.descriptor.document_id,
            layer.layer_name.as_deref().unwrap_or("default")
        );
        Ok(())
    }

    /// Applies one event synchronously on the calling task.
    pub fn handle_event(&mut self, event: SessionEvent) {
        self.reap_finished();
        for action in self.machine.handle(event) {
            self.execute(action);
        }
    }

    /// Waits for the next posted event and applies it.
    ///
    /// Returns `false` once the session is closed.
    pub async fn process_next(&mut self) -> bool {
        if self.machine.is_closed() {
            return false;
        }
        // `self` keeps a sender alive, so the channel never reports closed.
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
        !self.machine.is_closed()
    }

    /// Processes posted events until the session is closed, then stops all
    /// background work.
    pub async fn run(mut self) {
        while self.process_next().await {}
        self.shutdown().await;
    }

    /// Aborts in-flight refreshes and waits for them to unwind.
    pub async fn shutdown(&mut self) {
        self.background.shutdown().await;
    }

    fn execute(&mut self, action: SessionAction) {
        match action {
            SessionAction::RefreshToken { document_id } => {
                let catalog = Arc::clone(&self.catalog);
                let engine = Arc::clone(&self.engine);
                let events = self.events_tx.clone();
                self.background.spawn(async move {
                    let event = match refresh_and_reauthenticate(
                        catalog.as_ref(),
                        engine.as_ref(),
                        &document_id,
                    )
                    .await
                    {
                        Ok(()) => SessionEvent::ReauthSucceeded,
                        Err(err) => {
                            warn!(
                                "event=session_reauth module=session status=error document_id={} error={}",
                                document_id, err
                            );
                            SessionEvent::ReauthFailed
                        }
                    };
                    let _ = events.send(event);
                });
            }
            SessionAction::ShowNotice(notice) => self.view.show_notice(notice),
            SessionAction::RemoveLocalStorage { .. } => self.engine.remove_local_storage(),
            SessionAction::CloseSession => {
                self.background.abort_all();
                self.view.close_session();
            }
        }
    }

    fn reap_finished(&mut self) {
        while self.background.try_join_next().is_some() {}
    }
}

/// Fetches a fresh token for `document_id` and re-authenticates with it.
pub async fn refresh_and_reauthenticate(
    catalog: &dyn CatalogApi,
    engine: &dyn SyncEngine,
    document_id: &str,
) -> SessionResult<()> {
    let token = catalog.fetch_token(document_id).await?;
    engine.reauthenticate_with_token(&token).await?;
    Ok(())
}
