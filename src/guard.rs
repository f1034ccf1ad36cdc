//! Role-scoped access to the protected areas of the client.
//!
//! A guard never shows a generic "forbidden" screen: a signed-in user who
//! lands in the wrong area is sent to their own dashboard.

use crate::session::{Role, SessionView};

/// Protected areas, each reserved to a set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Admin,
    Client,
    Lawyer,
}

impl Area {
    pub fn admits(self, role: Role) -> bool {
        match self {
            Self::Admin => role.is_admin(),
            Self::Client => role == Role::Client,
            Self::Lawyer => role == Role::Lawyer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
            Self::Lawyer => "lawyer",
        }
    }
}

/// Navigation targets a guard can redirect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    AdminDashboard,
    ClientChat,
    LawyerDashboard,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::AdminDashboard => "/admin/dashboard",
            Self::ClientChat => "/chat",
            Self::LawyerDashboard => "/lawyer/dashboard",
        }
    }

    /// Landing page for a signed-in user.
    pub fn home_for(role: Role) -> Self {
        match role {
            Role::Support | Role::Manager => Self::AdminDashboard,
            Role::Client => Self::ClientChat,
            Role::Lawyer => Self::LawyerDashboard,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// The session is still being restored; show a placeholder.
    Checking,
    Authorized,
    Unauthorized { redirect: Route },
    Unauthenticated { redirect: Route },
}

impl GuardState {
    pub fn renders_outlet(self) -> bool {
        matches!(self, Self::Authorized)
    }

    pub fn redirect(self) -> Option<Route> {
        match self {
            Self::Unauthorized { redirect } | Self::Unauthenticated { redirect } => Some(redirect),
            Self::Checking | Self::Authorized => None,
        }
    }
}

pub fn evaluate(area: Area, view: &SessionView) -> GuardState {
    if view.loading {
        return GuardState::Checking;
    }
    match &view.session {
        None => GuardState::Unauthenticated {
            redirect: Route::Login,
        },
        Some(session) if area.admits(session.role) => GuardState::Authorized,
        Some(session) => {
            tracing::debug!(
                "Role {} cannot enter the {} area, redirecting",
                session.role,
                area.as_str()
            );
            GuardState::Unauthorized {
                redirect: Route::home_for(session.role),
            }
        }
    }
}
