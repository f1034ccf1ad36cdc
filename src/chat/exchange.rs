//! The message exchange loop of one open chat view.
//!
//! Sends are optimistic and keep the user's message on failure, followed by
//! an error bubble. Edits and deletes are optimistic too but roll back on
//! failure. State sits behind a short-lived mutex so the view can be
//! rendered while a request is in flight.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::api::ChatApi;
use crate::api::types::AskResponse;
use crate::chat::reconcile::Reconciled;
use crate::chat::{ConversationThread, Message, suggestions};
use crate::error::{ApiError, ChatError};
use crate::workflow::WorkflowRole;

#[derive(Debug, Default)]
struct ChatState {
    messages: Vec<Message>,
    suggestions: Vec<String>,
    pending: bool,
    last_error: Option<String>,
}

struct Inner {
    api: Arc<dyn ChatApi>,
    thread: ConversationThread,
    workflow: WorkflowRole,
    suggestion_limit: usize,
    state: Mutex<ChatState>,
    lifetime: CancellationToken,
}

/// A chat view bound to one resolved thread. Cheap to clone.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("thread", &self.inner.thread.id)
            .field("workflow", &self.inner.workflow)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Clears the pending flag however the send ends.
struct PendingGuard<'a> {
    session: &'a ChatSession,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.session.state().pending = false;
    }
}

impl ChatSession {
    pub fn new(
        api: Arc<dyn ChatApi>,
        thread: ConversationThread,
        suggestions: Vec<String>,
        workflow: WorkflowRole,
        suggestion_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                thread,
                workflow,
                suggestion_limit,
                state: Mutex::new(ChatState {
                    suggestions,
                    ..ChatState::default()
                }),
                lifetime: CancellationToken::new(),
            }),
        }
    }

    /// Bind to a reconciled thread and load its history.
    pub async fn open(
        api: Arc<dyn ChatApi>,
        reconciled: Reconciled,
        workflow: WorkflowRole,
        suggestion_limit: usize,
    ) -> Result<Self, ChatError> {
        let session = Self::new(
            api,
            reconciled.thread,
            reconciled.suggestions,
            workflow,
            suggestion_limit,
        );
        session.reload().await?;
        Ok(session)
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn thread(&self) -> &ConversationThread {
        &self.inner.thread
    }

    pub fn workflow(&self) -> WorkflowRole {
        self.inner.workflow
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.state().suggestions.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state().pending
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lifetime.is_cancelled()
    }

    /// Close the view. Responses still in flight are dropped unseen.
    pub fn close(&self) {
        if !self.inner.lifetime.is_cancelled() {
            tracing::debug!("Closing chat view for thread {}", self.inner.thread.id);
            self.inner.lifetime.cancel();
        }
    }

    /// Await `call` unless the view closes first.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ChatError> {
        tokio::select! {
            biased;
            _ = self.inner.lifetime.cancelled() => Err(ChatError::Closed),
            result = call => {
                if self.is_closed() {
                    return Err(ChatError::Closed);
                }
                result.map_err(ChatError::from)
            }
        }
    }

    fn ensure_open(&self) -> Result<(), ChatError> {
        if self.is_closed() {
            return Err(ChatError::Closed);
        }
        Ok(())
    }

    /// Replace the local history with the backend's.
    pub async fn reload(&self) -> Result<(), ChatError> {
        self.ensure_open()?;
        let thread_id = self.inner.thread.id.as_str();
        match self.guarded(self.inner.api.list_messages(thread_id)).await {
            Ok(records) => {
                let mut state = self.state();
                state.messages = records.into_iter().map(Message::from).collect();
                state.last_error = None;
                tracing::debug!(
                    "Loaded {} messages for thread {}",
                    state.messages.len(),
                    thread_id
                );
                Ok(())
            }
            Err(ChatError::Closed) => Err(ChatError::Closed),
            Err(e) => {
                self.state().last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Send a question. Blank input is ignored.
    ///
    /// Returns the AI reply. On failure the user's message stays in the
    /// history and a single error bubble is appended after it.
    pub async fn send(&self, content: &str) -> Result<Option<Message>, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        self.ensure_open()?;

        let temp_id = {
            let mut state = self.state();
            if state.pending {
                return Err(ChatError::SendPending);
            }
            state.pending = true;
            state.last_error = None;
            let optimistic = Message::local_user(content);
            let id = optimistic.id.clone();
            state.messages.push(optimistic);
            id
        };
        let _pending = PendingGuard { session: self };

        let thread_id = self.inner.thread.id.as_str();
        match self.guarded(self.inner.api.ask(thread_id, content)).await {
            Ok(response) => Ok(Some(self.apply_reply(&temp_id, response))),
            Err(ChatError::Closed) => {
                tracing::debug!("Discarding reply for closed thread {}", thread_id);
                Err(ChatError::Closed)
            }
            Err(e) => {
                tracing::warn!("Send failed on thread {}: {}", thread_id, e);
                let reason = e.user_message();
                let mut state = self.state();
                state.messages.push(Message::error(format!(
                    "Désolé, votre message n'a pas pu être traité : {reason}"
                )));
                state.last_error = Some(reason);
                Err(e)
            }
        }
    }

    fn apply_reply(&self, temp_id: &str, response: AskResponse) -> Message {
        let AskResponse {
            user_message,
            ai_message,
            suggested_questions,
        } = response;
        let next_suggestions = suggestions::after_reply(
            suggested_questions,
            self.inner.workflow,
            self.inner.suggestion_limit,
            &mut rand::thread_rng(),
        );
        let reply = Message::from(ai_message);

        let mut state = self.state();
        let saved = Message::from(user_message);
        match state.messages.iter().position(|m| m.id == temp_id) {
            Some(idx) => state.messages[idx] = saved,
            None => state.messages.push(saved),
        }
        state.messages.push(reply.clone());
        state.suggestions = next_suggestions;
        reply
    }

    /// Edit a saved message. The previous content comes back if the backend
    /// rejects the change.
    pub async fn edit(&self, message_id: &str, content: &str) -> Result<Message, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyContent);
        }
        self.ensure_open()?;

        let previous = {
            let mut state = self.state();
            let message = state
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;
            if message.is_local() {
                return Err(ChatError::UnsavedMessage(message_id.to_string()));
            }
            let previous = message.clone();
            message.content = content.to_string();
            message.updated_at = Some(Utc::now());
            previous
        };

        let thread_id = self.inner.thread.id.as_str();
        let result = self
            .guarded(self.inner.api.edit_message(thread_id, message_id, content))
            .await;

        match result {
            Ok(record) => {
                let saved = Message::from(record);
                let mut state = self.state();
                if let Some(slot) = state.messages.iter_mut().find(|m| m.id == message_id) {
                    *slot = saved.clone();
                }
                Ok(saved)
            }
            Err(ChatError::Closed) => Err(ChatError::Closed),
            Err(e) => {
                tracing::warn!("Edit of message {} failed: {}", message_id, e);
                let mut state = self.state();
                if let Some(slot) = state.messages.iter_mut().find(|m| m.id == message_id) {
                    *slot = previous;
                }
                state.last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Delete a message. It returns to its old position if the backend
    /// refuses. Local error and system notices are simply dismissed.
    pub async fn delete(&self, message_id: &str) -> Result<(), ChatError> {
        self.ensure_open()?;

        let (index, removed) = {
            let mut state = self.state();
            let index = state
                .messages
                .iter()
                .position(|m| m.id == message_id)
                .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;
            let message = &state.messages[index];
            if message.is_local() {
                if message.is_error || message.is_system {
                    state.messages.remove(index);
                    return Ok(());
                }
                return Err(ChatError::UnsavedMessage(message_id.to_string()));
            }
            (index, state.messages.remove(index))
        };

        let thread_id = self.inner.thread.id.as_str();
        match self
            .guarded(self.inner.api.delete_message(thread_id, message_id))
            .await
        {
            Ok(()) => Ok(()),
            Err(ChatError::Closed) => Err(ChatError::Closed),
            Err(e) => {
                tracing::warn!("Delete of message {} failed: {}", message_id, e);
                let mut state = self.state();
                let index = index.min(state.messages.len());
                state.messages.insert(index, removed);
                state.last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Append a local notice. Ignored once the view is closed.
    pub fn push_system_message(&self, text: impl Into<String>) {
        if self.is_closed() {
            return;
        }
        self.state().messages.push(Message::system(text));
    }
}
