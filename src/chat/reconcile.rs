//! Find-or-create of the single thread attached to an entity.

use crate::api::ChatApi;
use crate::chat::{ConversationTarget, ConversationThread, ThreadOwner, suggestions};
use crate::error::ChatError;
use crate::workflow::WorkflowRole;

/// Outcome of opening a chat view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub thread: ConversationThread,
    pub suggestions: Vec<String>,
    /// Whether this call had to create the thread.
    pub created: bool,
}

/// Title given to a thread created for `owner`.
pub fn default_title(owner: &ThreadOwner, owner_title: Option<&str>) -> String {
    match owner {
        ThreadOwner::Project(id) => match owner_title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => format!("Dossier {title}"),
            None => format!("Dossier #{id}"),
        },
        ThreadOwner::LegalRequest(id) => format!("Demande juridique #{id}"),
        ThreadOwner::Standalone => "Nouvelle conversation".to_string(),
    }
}

/// Return the first thread the backend lists for the target's owner,
/// creating one if there is none.
///
/// Targets missing their owner id are rejected before any request.
pub async fn find_or_create(
    api: &dyn ChatApi,
    target: &ConversationTarget,
    workflow: WorkflowRole,
    suggestion_limit: usize,
) -> Result<Reconciled, ChatError> {
    let owner = target.owner()?;

    let existing = api
        .list_threads(&owner)
        .await
        .map_err(ChatError::Reconcile)?;

    let (record, created) = match existing.into_iter().next() {
        Some(record) => (record, false),
        None => {
            let title = default_title(&owner, target.owner_title.as_deref());
            let record = api
                .create_thread(&owner, &title)
                .await
                .map_err(ChatError::Reconcile)?;
            tracing::info!("Created thread {} for {}", record.id, owner);
            (record, true)
        }
    };

    let thread = ConversationThread::from_record(record, &owner);
    let suggestions =
        suggestions::initial(&thread.last_suggested_questions, workflow, suggestion_limit);
    tracing::debug!("Reconciled {} to thread {}", owner, thread.id);
    Ok(Reconciled {
        thread,
        suggestions,
        created,
    })
}
