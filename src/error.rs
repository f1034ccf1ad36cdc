//! Error types for lexdesk.
//!
//! Every error here is recoverable: the view that triggered it shows
//! [`user_message`](ApiError::user_message) inline and stays interactive.

use std::path::PathBuf;

use crate::guard::GuardState;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read settings file {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse settings file {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Errors produced by the HTTP client adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The request never got a response.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 401. The session has already been torn down when this is returned.
    #[error("Unauthorized")]
    Unauthorized,

    /// Any other non-success status, with the message the backend sent.
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Text suitable for an inline alert or a notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "Impossible de joindre le serveur. Vérifiez votre connexion.".to_string()
            }
            Self::Unauthorized => "Votre session a expiré. Veuillez vous reconnecter.".to_string(),
            Self::Status { message, .. } if !message.trim().is_empty() => message.clone(),
            Self::Status { status, .. } => format!("Erreur du serveur ({status})."),
            Self::Decode(_) => "Réponse inattendue du serveur.".to_string(),
            Self::InvalidRequest(reason) => reason.clone(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Token storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Token storage I/O failed at {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Refusing to use token file {path:?} with insecure mode {mode:o} (expected 600)")]
    InsecurePermissions { path: PathBuf, mode: u32 },
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Not signed in")]
    NotAuthenticated,
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(reason) => reason.clone(),
            Self::Api(err) => err.user_message(),
            Self::Storage(_) => "Impossible d'enregistrer la session localement.".to_string(),
            Self::NotAuthenticated => "Veuillez vous connecter.".to_string(),
        }
    }
}

/// Conversation and message errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message content is empty")]
    EmptyContent,

    #[error("A {kind} conversation needs a {kind} id")]
    MissingOwner { kind: &'static str },

    #[error("Could not open the conversation: {0}")]
    Reconcile(ApiError),

    #[error("A message is already being sent")]
    SendPending,

    #[error("Message {0} not found")]
    MessageNotFound(String),

    #[error("Message {0} has not been saved yet")]
    UnsavedMessage(String),

    #[error("The conversation view has been closed")]
    Closed,

    #[error("Chat is not available here: {0:?}")]
    Denied(GuardState),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ChatError {
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyContent => "Le message est vide.".to_string(),
            Self::MissingOwner { kind } => {
                format!("Aucun identifiant de {kind} fourni pour cette conversation.")
            }
            Self::Reconcile(err) => format!(
                "Impossible d'ouvrir la conversation : {}",
                err.user_message()
            ),
            Self::SendPending => "Un message est déjà en cours d'envoi.".to_string(),
            Self::MessageNotFound(_) => "Message introuvable.".to_string(),
            Self::UnsavedMessage(_) => {
                "Ce message n'a pas encore été enregistré.".to_string()
            }
            Self::Closed => "La conversation a été fermée.".to_string(),
            Self::Denied(GuardState::Unauthorized { redirect }) => format!(
                "Cet espace n'est pas accessible avec votre profil. Rendez-vous sur {redirect}."
            ),
            Self::Denied(GuardState::Checking) => {
                "Vérification de la session en cours.".to_string()
            }
            Self::Denied(_) => "Veuillez vous connecter.".to_string(),
            Self::Api(err) => err.user_message(),
        }
    }
}

/// Document attachment errors.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file selected")]
    NoFileSelected,

    #[error("Cannot read {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Cannot write {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("The uploaded PDF could not be processed: {0}")]
    CorruptPdf(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl UploadError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NoFileSelected => "Veuillez sélectionner un fichier.".to_string(),
            Self::Read { .. } => "Impossible de lire le fichier sélectionné.".to_string(),
            Self::Write { .. } => "Impossible d'enregistrer le fichier.".to_string(),
            Self::CorruptPdf(_) => "Le fichier PDF semble corrompu ou illisible. \
                 Essayez de l'exporter à nouveau avant de le téléverser."
                .to_string(),
            Self::Api(err) => err.user_message(),
        }
    }
}
