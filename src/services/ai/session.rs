//! One completion at a time against the active conversation.
//!
//! `Idle -> Requesting -> Streaming -> {Completed | Cancelled | Failed} -> Idle`
//!
//! The target conversation is pinned by id when the session starts. Every
//! delta re-resolves it through the store, so switching or deleting
//! conversations mid-stream never writes into the wrong one.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::plugins::store::{lock_store, Role, SharedStore};
use crate::services::composer::{compose_message, Attachment};
use crate::services::config::SettingsStore;
use crate::services::render::{RenderEvent, Renderer};

use super::decoder::{DecodeEvent, StreamDecoder};
use super::request_options::request_headers;
use super::transport::{CompletionRequest, CompletionTransport, TransportError};
use super::types::{ChatMessage, ChatRequest, ChatRequestOptions};

pub const STATUS_STREAMING: &str = "Streaming...";
pub const STATUS_DONE: &str = "Done.";
pub const STATUS_STOPPED: &str = "Stopped.";
pub const STATUS_MISSING_KEY: &str = "Add API key in Settings.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    Failed(TransportError),
}

/// Reasons a send is rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionError {
    #[error("A response is already streaming")]
    Busy,
    #[error("{message}")]
    MissingCredential { message: String },
    #[error("Nothing to send")]
    EmptyInput,
    #[error("Transport: {message}")]
    Transport { message: String },
    #[error("Store: {message}")]
    Store { message: String },
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<crate::plugins::store::StoreError> for SessionError {
    fn from(err: crate::plugins::store::StoreError) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }
}

/// Resolves once the cancel flag is set. Never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct SessionController {
    store: SharedStore,
    settings: Arc<SettingsStore>,
    transport: Arc<dyn CompletionTransport>,
    renderer: Arc<dyn Renderer>,
    request_options: ChatRequestOptions,
    // NOTE: std::sync::Mutex since neither lock is held across .await.
    state: Mutex<SessionState>,
    cancel_tx: Mutex<Option<watch::Sender<bool>>>,
}

/// Returns the controller to `Idle` however the session future ends,
/// including when it is dropped mid-stream.
struct ActiveSession<'a> {
    controller: &'a SessionController,
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.controller.set_state(SessionState::Idle);
        self.controller
            .cancel_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.controller
            .renderer
            .render(&RenderEvent::StreamingChanged { streaming: false });
    }
}

impl SessionController {
    pub fn new(
        store: SharedStore,
        settings: Arc<SettingsStore>,
        transport: Arc<dyn CompletionTransport>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            store,
            settings,
            transport,
            renderer,
            request_options: ChatRequestOptions::default(),
            state: Mutex::new(SessionState::Idle),
            cancel_tx: Mutex::new(None),
        }
    }

    pub fn with_request_options(mut self, request_options: ChatRequestOptions) -> Self {
        self.request_options = request_options;
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_busy(&self) -> bool {
        self.state() != SessionState::Idle
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        log::debug!("Session {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Request cancellation of the in-flight session. Returns `false` when
    /// nothing is running.
    pub fn cancel(&self) -> bool {
        let guard = self.cancel_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    fn status(&self, message: &str) {
        self.renderer.render(&RenderEvent::status(message));
    }

    /// Claim the controller. Fails with `Busy` unless idle.
    fn begin(&self) -> Result<(ActiveSession<'_>, watch::Receiver<bool>), SessionError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SessionState::Idle {
            return Err(SessionError::Busy);
        }
        *state = SessionState::Requesting;
        drop(state);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.cancel_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel_tx);
        Ok((ActiveSession { controller: self }, cancel_rx))
    }

    /// Send a user turn built from `text` and `attachments`, then stream the
    /// reply into a fresh assistant message of the active conversation.
    ///
    /// Rejections leave the store untouched. Once the request is under way
    /// every ending is reported as a [`SessionOutcome`].
    pub async fn submit(
        &self,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<SessionOutcome, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let content = compose_message(text, attachments).ok_or(SessionError::EmptyInput)?;

        let settings = self.settings.snapshot();
        if !settings.has_api_key() {
            self.renderer.render(&RenderEvent::error(STATUS_MISSING_KEY));
            return Err(SessionError::MissingCredential {
                message: STATUS_MISSING_KEY.to_string(),
            });
        }
        let headers = request_headers(&settings.referer, &settings.app_title, &self.request_options)?;

        let (_active, cancel_rx) = self.begin()?;

        let (conversation_id, messages) = {
            let mut store = lock_store(&self.store)?;
            let conversation_id = store.append_message(Role::User, &content);

            let mut messages = Vec::new();
            let system_prompt = settings.system_prompt.trim();
            if !system_prompt.is_empty() {
                messages.push(ChatMessage::system(system_prompt));
            }
            if let Some(conversation) = store.conversation(&conversation_id) {
                messages.extend(conversation.messages.iter().map(ChatMessage::from));
            }

            store.append_message_to(&conversation_id, Role::Assistant, "")?;
            (conversation_id, messages)
        };

        let request = CompletionRequest {
            url: settings.endpoint.clone(),
            api_key: settings.api_key.trim().to_string(),
            headers,
            body: ChatRequest {
                model: settings.model.clone(),
                messages,
                stream: true,
            },
        };

        self.renderer
            .render(&RenderEvent::StreamingChanged { streaming: true });
        self.status(STATUS_STREAMING);
        log::info!(
            "Streaming completion for {} (model={})",
            conversation_id,
            settings.model
        );

        let outcome = match self.run_stream(&conversation_id, request, cancel_rx).await {
            Ok(()) => {
                self.status(STATUS_DONE);
                SessionOutcome::Completed
            }
            Err(err) if err.is_aborted() => {
                log::info!("Completion for {} stopped by user", conversation_id);
                self.status(STATUS_STOPPED);
                SessionOutcome::Cancelled
            }
            Err(err) => {
                log::warn!("Completion for {} failed: {}", conversation_id, err);
                self.renderer.render(&RenderEvent::error(err.to_string()));
                SessionOutcome::Failed(err)
            }
        };
        Ok(outcome)
    }

    async fn run_stream(
        &self,
        conversation_id: &str,
        request: CompletionRequest,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        let mut stream = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => return Err(TransportError::Aborted),
            opened = self.transport.open(request) => opened?,
        };
        self.set_state(SessionState::Streaming);

        let mut decoder = StreamDecoder::new();
        loop {
            let events = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => return Err(TransportError::Aborted),
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => decoder.feed(&bytes),
                    Some(Err(err)) => return Err(err),
                    None => decoder.close(),
                },
            };

            for event in events {
                match event {
                    DecodeEvent::Delta(delta) => self.apply_delta(conversation_id, &delta),
                    DecodeEvent::Done => return Ok(()),
                }
            }
        }
    }

    fn apply_delta(&self, conversation_id: &str, delta: &str) {
        let mut store = match lock_store(&self.store) {
            Ok(store) => store,
            Err(err) => {
                log::error!("Dropping delta: {}", err);
                return;
            }
        };
        if let Err(err) = store.append_to_last_assistant(conversation_id, delta) {
            log::debug!("Dropping delta for {}: {}", conversation_id, err);
            return;
        }
        drop(store);
        self.renderer.render(&RenderEvent::MessageDelta {
            conversation_id: conversation_id.to_string(),
            delta: delta.to_string(),
        });
    }
}
