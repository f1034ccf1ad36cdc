//! Authenticated session: current user, bearer token, and their lifecycle.
//!
//! ```text
//! SessionStore
//! ├── handle: SessionHandle (shared with ApiClient)
//! │   ├── state: RwLock<SessionState>   token + user + loading/error
//! │   ├── tokens: dyn TokenStore        durable copy of the token
//! │   └── notifier: dyn Notifier        transient toasts
//! └── auth: dyn AuthApi                 /auth/* and /users/* calls
//! ```
//!
//! The handle is the only writer of the token and the only credential
//! source for outgoing requests. It is also the 401 hook: any
//! authenticated call that comes back 401 logs the user out.

pub mod storage;
pub mod token;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::api::types::{ProfileUpdate, RegisterRequest, UserProfile};
use crate::api::{AuthApi, CredentialProvider, UnauthorizedHandler};
use crate::error::{ApiError, SessionError};
use crate::notify::{Notification, Notifier};

pub use storage::{FileTokenStore, MemoryTokenStore, TokenStore};

/// Platform roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Lawyer,
    Support,
    Manager,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Lawyer => "lawyer",
            Self::Support => "support",
            Self::Manager => "manager",
        }
    }

    /// Support and managers run the admin area.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Support | Self::Manager)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signed-in user as the rest of the client sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub token_expiry: Option<DateTime<Utc>>,
}

impl Session {
    fn from_profile(profile: &UserProfile, token_expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            user_id: profile.id.clone(),
            display_name: profile.display_name(),
            email: profile.email.clone(),
            role: profile.role,
            token_expiry,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<SecretString>,
    session: Option<Session>,
    profile: Option<UserProfile>,
    loading: bool,
    error: Option<String>,
}

/// Read-only copy of the session state for rendering and route guards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub session: Option<Session>,
    pub loading: bool,
    pub error: Option<String>,
}

struct HandleInner {
    state: RwLock<SessionState>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
}

/// Shared session state. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("view", &self.view())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// A handle in the `loading` state, waiting for [`SessionStore::restore`].
    pub fn new(tokens: Arc<dyn TokenStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                state: RwLock::new(SessionState {
                    loading: true,
                    ..SessionState::default()
                }),
                tokens,
                notifier,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn notify(&self, notification: Notification) {
        self.inner.notifier.notify(notification);
    }

    pub fn view(&self) -> SessionView {
        let state = self.read();
        SessionView {
            session: state.session.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.read().session.clone()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.read().profile.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    pub fn is_authenticated(&self) -> bool {
        let state = self.read();
        state.session.is_some() && state.token.is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.read().session.as_ref().is_some_and(|s| s.role == role)
    }

    pub fn is_admin(&self) -> bool {
        self.read().session.as_ref().is_some_and(|s| s.role.is_admin())
    }

    pub fn is_manager(&self) -> bool {
        self.has_role(Role::Manager)
    }

    pub fn is_lawyer(&self) -> bool {
        self.has_role(Role::Lawyer)
    }

    pub fn is_client(&self) -> bool {
        self.has_role(Role::Client)
    }

    fn set_loading(&self, loading: bool) {
        self.write().loading = loading;
    }

    fn set_error(&self, error: Option<String>) {
        self.write().error = error;
    }

    /// Persist `token` and install the session in one step.
    fn establish(
        &self,
        token: SecretString,
        profile: UserProfile,
        token_expiry: Option<DateTime<Utc>>,
    ) -> Result<Session, SessionError> {
        self.inner.tokens.save(&token)?;
        let session = Session::from_profile(&profile, token_expiry);
        let mut state = self.write();
        state.token = Some(token);
        state.session = Some(session.clone());
        state.profile = Some(profile);
        state.loading = false;
        state.error = None;
        Ok(session)
    }

    /// Drop the session and the stored token.
    fn clear(&self) {
        if let Err(e) = self.inner.tokens.clear() {
            tracing::warn!("Failed to clear stored session token: {}", e);
        }
        let mut state = self.write();
        state.token = None;
        state.session = None;
        state.profile = None;
        state.loading = false;
    }
}

impl CredentialProvider for SessionHandle {
    fn bearer_token(&self) -> Option<SecretString> {
        self.read().token.clone()
    }
}

impl UnauthorizedHandler for SessionHandle {
    fn on_unauthorized(&self) {
        let was_signed_in = self.read().session.is_some();
        self.clear();
        self.set_error(Some("Session expirée".to_string()));
        if was_signed_in {
            tracing::info!("Session ended by the backend (401)");
        }
        self.notify(Notification::warning(
            "Votre session a expiré. Veuillez vous reconnecter.",
        ));
    }
}

/// Minimum password length accepted before calling the backend.
pub const MIN_PASSWORD_LEN: usize = 8;

fn validate_email(email: &str) -> Result<(), SessionError> {
    let email = email.trim();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(SessionError::Validation(
            "Adresse e-mail invalide.".to_string(),
        ))
    }
}

fn validate_new_password(password: &str) -> Result<(), SessionError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SessionError::Validation(format!(
            "Le mot de passe doit contenir au moins {MIN_PASSWORD_LEN} caractères."
        )));
    }
    Ok(())
}

fn failure_notice(action: &str, err: &ApiError) -> Notification {
    Notification::error(format!("{action} : {}", err.user_message()))
}

/// Session operations over an [`AuthApi`].
#[derive(Clone)]
pub struct SessionStore {
    handle: SessionHandle,
    auth: Arc<dyn AuthApi>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(handle: SessionHandle, auth: Arc<dyn AuthApi>) -> Self {
        Self { handle, auth }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Load the persisted token and, if it is still valid, the current user.
    ///
    /// An expired or unreadable token is discarded without any network call.
    pub async fn restore(&self) -> Option<Session> {
        self.handle.set_loading(true);

        let stored = match self.handle.inner.tokens.load() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Ignoring stored session token: {}", e);
                None
            }
        };
        let Some(token) = stored else {
            self.handle.set_loading(false);
            return None;
        };

        let expiry = match token::decode_expiry(token.expose_secret()) {
            Ok(expiry) if !token::is_expired(expiry, Utc::now()) => expiry,
            Ok(_) => {
                tracing::info!("Stored session token has expired");
                self.handle.clear();
                return None;
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable session token: {}", e);
                self.handle.clear();
                return None;
            }
        };

        self.handle.write().token = Some(token);
        match self.auth.current_user().await {
            Ok(profile) => {
                let session = Session::from_profile(&profile, expiry);
                let mut state = self.handle.write();
                // Logged out while the profile was in flight.
                if state.token.is_none() {
                    state.loading = false;
                    return None;
                }
                state.session = Some(session.clone());
                state.profile = Some(profile);
                state.loading = false;
                state.error = None;
                tracing::info!(user_id = %session.user_id, role = %session.role, "Session restored");
                Some(session)
            }
            Err(ApiError::Unauthorized) => None,
            Err(e) => {
                // Leave the stored token alone; the backend may just be unreachable.
                tracing::warn!("Could not load the current user: {}", e);
                let mut state = self.handle.write();
                state.token = None;
                state.loading = false;
                state.error = Some(e.user_message());
                None
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        if let Err(e) = validate_email(email) {
            self.handle.set_error(Some(e.user_message()));
            return Err(e);
        }
        if password.is_empty() {
            let e = SessionError::Validation("Le mot de passe est requis.".to_string());
            self.handle.set_error(Some(e.user_message()));
            return Err(e);
        }

        self.handle.set_error(None);
        match self.auth.login(email.trim(), password).await {
            Ok(response) => {
                let session = self.install(response.token, response.user)?;
                self.handle.notify(Notification::success(format!(
                    "Bienvenue, {} !",
                    session.display_name
                )));
                Ok(session)
            }
            Err(e) => {
                self.handle.set_error(Some(e.user_message()));
                self.handle
                    .notify(failure_notice("Échec de la connexion", &e));
                Err(e.into())
            }
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Session, SessionError> {
        let checked = validate_email(&request.email)
            .and_then(|()| validate_new_password(&request.password))
            .and_then(|()| {
                if request.role.is_admin() {
                    return Err(SessionError::Validation(
                        "Ce type de compte ne peut pas être créé en ligne.".to_string(),
                    ));
                }
                Ok(())
            });
        if let Err(e) = checked {
            self.handle.set_error(Some(e.user_message()));
            return Err(e);
        }

        self.handle.set_error(None);
        match self.auth.register(request).await {
            Ok(response) => {
                let session = self.install(response.token, response.user)?;
                self.handle
                    .notify(Notification::success("Compte créé avec succès."));
                Ok(session)
            }
            Err(e) => {
                self.handle.set_error(Some(e.user_message()));
                self.handle
                    .notify(failure_notice("Échec de l'inscription", &e));
                Err(e.into())
            }
        }
    }

    /// Accept a token from the backend under the same rules `restore`
    /// applies at startup, so a saved token survives the next run.
    fn install(&self, token: String, profile: UserProfile) -> Result<Session, SessionError> {
        let expiry = match token::decode_expiry(&token) {
            Ok(expiry) if !token::is_expired(expiry, Utc::now()) => Ok(expiry),
            Ok(_) => Err("Le serveur a renvoyé une session déjà expirée."),
            Err(e) => {
                tracing::warn!("Backend issued an unreadable session token: {}", e);
                Err("Le serveur a renvoyé une session illisible.")
            }
        };
        let expiry = match expiry {
            Ok(expiry) => expiry,
            Err(reason) => {
                let e = SessionError::Validation(reason.to_string());
                self.handle.set_error(Some(e.user_message()));
                self.handle.notify(Notification::error(reason));
                return Err(e);
            }
        };
        let session = self
            .handle
            .establish(SecretString::from(token), profile, expiry)?;
        tracing::info!(user_id = %session.user_id, role = %session.role, "Signed in");
        Ok(session)
    }

    pub fn logout(&self) {
        self.handle.clear();
        self.handle.set_error(None);
        tracing::info!("Signed out");
        self.handle.notify(Notification::info("Vous êtes déconnecté."));
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Session, SessionError> {
        if !self.handle.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        if let Some(email) = &update.email {
            validate_email(email)?;
        }
        if update.is_empty() {
            return self.handle.session().ok_or(SessionError::NotAuthenticated);
        }

        match self.auth.update_profile(update).await {
            Ok(profile) => {
                let mut state = self.handle.write();
                let expiry = state.session.as_ref().and_then(|s| s.token_expiry);
                let session = Session::from_profile(&profile, expiry);
                state.session = Some(session.clone());
                state.profile = Some(profile);
                drop(state);
                self.handle
                    .notify(Notification::success("Profil mis à jour."));
                Ok(session)
            }
            Err(e) => {
                self.handle
                    .notify(failure_notice("Échec de la mise à jour du profil", &e));
                Err(e.into())
            }
        }
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), SessionError> {
        if !self.handle.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        validate_new_password(new)?;
        if current == new {
            return Err(SessionError::Validation(
                "Le nouveau mot de passe doit être différent de l'actuel.".to_string(),
            ));
        }

        match self.auth.change_password(current, new).await {
            Ok(()) => {
                self.handle
                    .notify(Notification::success("Mot de passe modifié."));
                Ok(())
            }
            Err(e) => {
                self.handle
                    .notify(failure_notice("Échec du changement de mot de passe", &e));
                Err(e.into())
            }
        }
    }

    /// Always reports success once the address is well-formed, so the
    /// response never reveals whether an account exists.
    pub async fn forgot_password(&self, email: &str) -> Result<(), SessionError> {
        validate_email(email)?;
        if let Err(e) = self.auth.forgot_password(email.trim()).await {
            tracing::warn!("Password reset request failed: {}", e);
        }
        self.handle.notify(Notification::success(
            "Si un compte existe pour cette adresse, un e-mail de réinitialisation a été envoyé.",
        ));
        Ok(())
    }

    pub async fn reset_password(&self, reset_token: &str, new: &str) -> Result<(), SessionError> {
        if reset_token.trim().is_empty() {
            return Err(SessionError::Validation(
                "Lien de réinitialisation invalide.".to_string(),
            ));
        }
        validate_new_password(new)?;

        match self.auth.reset_password(reset_token.trim(), new).await {
            Ok(()) => {
                self.handle.notify(Notification::success(
                    "Mot de passe réinitialisé. Vous pouvez vous connecter.",
                ));
                Ok(())
            }
            Err(e) => {
                self.handle
                    .notify(failure_notice("Échec de la réinitialisation", &e));
                Err(e.into())
            }
        }
    }

    pub fn snapshot(&self) -> SessionView {
        self.handle.view()
    }

    pub fn session(&self) -> Option<Session> {
        self.handle.session()
    }

    /// Full profile of the signed-in user, as last returned by the backend.
    pub fn profile(&self) -> Option<UserProfile> {
        self.handle.profile()
    }

    pub fn is_loading(&self) -> bool {
        self.handle.is_loading()
    }

    pub fn is_authenticated(&self) -> bool {
        self.handle.is_authenticated()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.handle.has_role(role)
    }

    pub fn is_admin(&self) -> bool {
        self.handle.is_admin()
    }

    pub fn is_manager(&self) -> bool {
        self.handle.is_manager()
    }

    pub fn is_lawyer(&self) -> bool {
        self.handle.is_lawyer()
    }

    pub fn is_client(&self) -> bool {
        self.handle.is_client()
    }
}
