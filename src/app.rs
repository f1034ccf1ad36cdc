//! One client instance: configuration, HTTP adapter and session, wired
//! together so every request reads the same credential.

use std::sync::Arc;

use crate::api::{ApiClient, ChatApi, DocumentApi};
use crate::chat::{ChatSession, ConversationTarget, find_or_create};
use crate::config::Config;
use crate::documents::{DocumentOwner, DocumentPanel};
use crate::error::{ApiError, ChatError};
use crate::guard::{self, Area, GuardState};
use crate::notify::Notifier;
use crate::session::{FileTokenStore, SessionHandle, SessionStore, TokenStore};
use crate::workflow::WorkflowRole;

#[derive(Debug, Clone)]
pub struct App {
    config: Config,
    client: ApiClient,
    session: SessionStore,
}

impl App {
    /// Wire a client around an explicit token store.
    pub fn new(
        config: Config,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApiError> {
        let handle = SessionHandle::new(tokens, notifier);
        let client = ApiClient::new(
            &config.api,
            Arc::new(handle.clone()),
            Arc::new(handle.clone()),
        )?;
        let session = SessionStore::new(handle, Arc::new(client.clone()));
        Ok(Self {
            config,
            client,
            session,
        })
    }

    /// Wire a client that keeps its token in the configured file.
    pub fn with_token_file(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self, ApiError> {
        let tokens = Arc::new(FileTokenStore::new(&config.session.token_path));
        Self::new(config, tokens, notifier)
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Chat workflow of the signed-in user, or why there is none.
    pub fn workflow(&self) -> Result<WorkflowRole, ChatError> {
        let view = self.session.snapshot();
        let Some(workflow) = view
            .session
            .as_ref()
            .and_then(|s| WorkflowRole::for_role(s.role))
        else {
            return Err(ChatError::Denied(guard::evaluate(Area::Client, &view)));
        };
        let state = guard::evaluate(workflow.area(), &view);
        if !state.renders_outlet() {
            return Err(ChatError::Denied(state));
        }
        Ok(workflow)
    }

    /// Resolve the thread for `target` and open a chat view on it.
    pub async fn open_chat(&self, target: &ConversationTarget) -> Result<ChatSession, ChatError> {
        let workflow = self.workflow()?;
        if !workflow.allows(target.kind) {
            return Err(ChatError::Denied(GuardState::Unauthorized {
                redirect: workflow.home(),
            }));
        }

        let limit = self.config.chat.suggestion_limit;
        let api: Arc<dyn ChatApi> = Arc::new(self.client.clone());
        let reconciled = find_or_create(api.as_ref(), target, workflow, limit).await?;
        ChatSession::open(api, reconciled, workflow, limit).await
    }

    pub fn documents(&self, owner: DocumentOwner) -> DocumentPanel {
        let api: Arc<dyn DocumentApi> = Arc::new(self.client.clone());
        DocumentPanel::new(api, owner, self.config.upload.clone())
    }
}
