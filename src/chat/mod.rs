//! Conversation threads and messages.

pub mod exchange;
pub mod reconcile;
pub mod suggestions;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::types::{MessageRecord, ThreadRecord};
use crate::error::ChatError;

pub use exchange::ChatSession;
pub use reconcile::{Reconciled, default_title, find_or_create};

/// Prefix of ids assigned to messages the backend has not stored yet.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// What a thread hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThreadOwner {
    Project(String),
    LegalRequest(String),
    Standalone,
}

impl ThreadOwner {
    pub fn kind(&self) -> OwnerKind {
        match self {
            Self::Project(_) => OwnerKind::Project,
            Self::LegalRequest(_) => OwnerKind::LegalRequest,
            Self::Standalone => OwnerKind::Standalone,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Project(id) | Self::LegalRequest(id) => Some(id),
            Self::Standalone => None,
        }
    }
}

impl std::fmt::Display for ThreadOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project(id) => write!(f, "project {id}"),
            Self::LegalRequest(id) => write!(f, "legal request {id}"),
            Self::Standalone => f.write_str("standalone"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    Project,
    LegalRequest,
    Standalone,
}

impl OwnerKind {
    /// French noun used in user-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Project => "dossier",
            Self::LegalRequest => "demande juridique",
            Self::Standalone => "conversation",
        }
    }
}

/// The entity a chat view was opened for, as handed over by navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTarget {
    pub kind: OwnerKind,
    pub owner_id: Option<String>,
    /// Display title of the project, when known.
    pub owner_title: Option<String>,
}

impl ConversationTarget {
    pub fn project(id: impl Into<String>, title: Option<String>) -> Self {
        Self {
            kind: OwnerKind::Project,
            owner_id: Some(id.into()),
            owner_title: title,
        }
    }

    pub fn legal_request(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::LegalRequest,
            owner_id: Some(id.into()),
            owner_title: None,
        }
    }

    pub fn standalone() -> Self {
        Self {
            kind: OwnerKind::Standalone,
            owner_id: None,
            owner_title: None,
        }
    }

    /// Fails when a project or legal-request target carries no id.
    pub fn owner(&self) -> Result<ThreadOwner, ChatError> {
        let id = self
            .owner_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        match (self.kind, id) {
            (OwnerKind::Standalone, _) => Ok(ThreadOwner::Standalone),
            (OwnerKind::Project, Some(id)) => Ok(ThreadOwner::Project(id.to_string())),
            (OwnerKind::LegalRequest, Some(id)) => Ok(ThreadOwner::LegalRequest(id.to_string())),
            (kind, None) => Err(ChatError::MissingOwner { kind: kind.label() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationThread {
    pub id: String,
    pub owner: ThreadOwner,
    pub title: String,
    pub last_suggested_questions: Vec<String>,
}

impl ConversationThread {
    /// The record's own owner fields win; `fallback` covers endpoints that omit them.
    pub(crate) fn from_record(record: ThreadRecord, fallback: &ThreadOwner) -> Self {
        let owner = match (record.project_id, record.legal_request_id) {
            (Some(id), _) => ThreadOwner::Project(id),
            (None, Some(id)) => ThreadOwner::LegalRequest(id),
            (None, None) => fallback.clone(),
        };
        Self {
            id: record.id,
            owner,
            title: record.title,
            last_suggested_questions: record.last_suggested_questions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// AI bubble standing in for a failed exchange.
    pub is_error: bool,
    /// Local notice, such as an upload confirmation.
    pub is_system: bool,
}

impl Message {
    fn local(sender: Sender, content: String) -> Self {
        Self {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            sender,
            content,
            timestamp: Utc::now(),
            updated_at: None,
            is_error: false,
            is_system: false,
        }
    }

    pub fn local_user(content: impl Into<String>) -> Self {
        Self::local(Sender::User, content.into())
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::local(Sender::Ai, content.into())
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            is_system: true,
            ..Self::local(Sender::Ai, content.into())
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            sender: record.sender,
            content: record.content,
            timestamp: record.timestamp,
            updated_at: record.updated_at,
            is_error: false,
            is_system: false,
        }
    }
}
