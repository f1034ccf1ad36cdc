//! The chat workflow shared by clients and lawyers.
//!
//! Both roles go through the same reconcile/exchange/upload flow; this
//! type carries the handful of things that differ between them.

use crate::chat::OwnerKind;
use crate::guard::{Area, Route};
use crate::session::Role;

const CLIENT_DEFAULT_SUGGESTIONS: &[&str] = &[
    "Quelles sont les prochaines étapes de mon dossier ?",
    "Quels documents dois-je fournir ?",
    "Quels sont les délais à respecter ?",
    "Combien va me coûter la procédure ?",
    "Puis-je régler ce litige à l'amiable ?",
];

const CLIENT_FALLBACK_SUGGESTIONS: &[&str] = &[
    "Pouvez-vous résumer ma situation juridique ?",
    "Quels sont mes droits dans cette affaire ?",
    "Quels risques dois-je anticiper ?",
    "Faut-il envoyer une mise en demeure ?",
    "Quelle juridiction est compétente ?",
    "Combien de temps la procédure peut-elle durer ?",
    "Quelles preuves dois-je rassembler ?",
    "Puis-je bénéficier de l'aide juridictionnelle ?",
];

const LAWYER_DEFAULT_SUGGESTIONS: &[&str] = &[
    "Résume les faits essentiels du dossier.",
    "Quelle jurisprudence récente s'applique ?",
    "Quels sont les délais de prescription ?",
    "Quels arguments la partie adverse peut-elle soulever ?",
    "Rédige un projet de mise en demeure.",
];

const LAWYER_FALLBACK_SUGGESTIONS: &[&str] = &[
    "Identifie les pièces manquantes au dossier.",
    "Quels textes de loi sont applicables ?",
    "Propose une stratégie de négociation.",
    "Évalue les chances de succès en appel.",
    "Liste les points à clarifier avec le client.",
    "Quelles mesures conservatoires envisager ?",
    "Prépare une chronologie des événements.",
    "Rédige une note de synthèse pour le client.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowRole {
    Client,
    Lawyer,
}

impl WorkflowRole {
    /// Admin roles have no chat workflow.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Client => Some(Self::Client),
            Role::Lawyer => Some(Self::Lawyer),
            Role::Support | Role::Manager => None,
        }
    }

    pub fn area(self) -> Area {
        match self {
            Self::Client => Area::Client,
            Self::Lawyer => Area::Lawyer,
        }
    }

    pub fn home(self) -> Route {
        match self {
            Self::Client => Route::ClientChat,
            Self::Lawyer => Route::LawyerDashboard,
        }
    }

    /// Clients may also chat outside any matter; lawyers always work on one.
    pub fn allows(self, kind: OwnerKind) -> bool {
        match (self, kind) {
            (_, OwnerKind::Project | OwnerKind::LegalRequest) => true,
            (Self::Client, OwnerKind::Standalone) => true,
            (Self::Lawyer, OwnerKind::Standalone) => false,
        }
    }

    /// Shown when a thread has no stored suggestions yet.
    pub fn default_suggestions(self) -> &'static [&'static str] {
        match self {
            Self::Client => CLIENT_DEFAULT_SUGGESTIONS,
            Self::Lawyer => LAWYER_DEFAULT_SUGGESTIONS,
        }
    }

    /// Sampled from when a reply carries no suggestions.
    pub fn fallback_suggestions(self) -> &'static [&'static str] {
        match self {
            Self::Client => CLIENT_FALLBACK_SUGGESTIONS,
            Self::Lawyer => LAWYER_FALLBACK_SUGGESTIONS,
        }
    }
}
