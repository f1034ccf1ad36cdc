//! lexdesk: client core for a legal-services platform.
//!
//! Clients and lawyers chat with an AI assistant about a project (dossier)
//! or a legal request, and attach documents to it. This crate holds the
//! parts below the screens: the authenticated session, the HTTP adapter,
//! route guards, conversation find-or-create, the message exchange loop and
//! the document upload flow. The `lexdesk` binary drives them from a
//! terminal.

pub mod api;
pub mod app;
pub mod chat;
pub mod cli;
pub mod config;
pub mod documents;
pub mod error;
pub mod guard;
pub mod notify;
pub mod session;
pub mod settings;
pub mod workflow;
