//! Terminal output: message bubbles, suggestions, notifications.

use std::io::Write;

use termimad::MadSkin;

use crate::chat::{Message, Sender};
use crate::documents::{Document, UploadProgress};
use crate::notify::{Notification, NotificationLevel, Notifier};

/// Prints notifications on stderr, after the log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        let marker = match notification.level {
            NotificationLevel::Success => "✔",
            NotificationLevel::Info => "ℹ",
            NotificationLevel::Warning => "⚠",
            NotificationLevel::Error => "✖",
        };
        tracing::debug!("Notification ({:?}): {}", notification.level, notification.message);
        eprintln!("{marker} {}", notification.message);
    }
}

pub fn skin() -> MadSkin {
    MadSkin::default()
}

pub fn message(skin: &MadSkin, message: &Message) {
    match (message.sender, message.is_error, message.is_system) {
        (Sender::User, _, _) => {
            let edited = if message.updated_at.is_some() {
                " (modifié)"
            } else {
                ""
            };
            println!("[{}] Vous{edited} : {}", message.id, message.content);
        }
        (Sender::Ai, true, _) => println!("⚠ {}", message.content),
        (Sender::Ai, _, true) => println!("· {}", message.content),
        (Sender::Ai, false, false) => {
            println!("[{}] Assistant :", message.id);
            skin.print_text(&message.content);
        }
    }
}

pub fn history(skin: &MadSkin, messages: &[Message]) {
    if messages.is_empty() {
        println!("Aucun message pour le moment. Posez votre première question.");
        return;
    }
    for m in messages {
        message(skin, m);
    }
}

pub fn suggestions(suggestions: &[String]) {
    if suggestions.is_empty() {
        return;
    }
    println!("Suggestions (/ask <n>) :");
    for (i, s) in suggestions.iter().enumerate() {
        println!("  {}. {s}", i + 1);
    }
}

pub fn documents(documents: &[Document]) {
    if documents.is_empty() {
        println!("Aucun document.");
        return;
    }
    for d in documents {
        let uploaded = d
            .uploaded_at
            .map(|t| t.format("%d/%m/%Y %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<40} {:>10}  {}",
            d.id,
            d.file_name,
            human_size(d.file_size),
            uploaded
        );
    }
}

pub fn progress(progress: UploadProgress) {
    let suffix = if progress.indicative { " (estimation)" } else { "" };
    eprint!("\rTéléversement… {:>3}%{suffix}", progress.percent);
    let _ = std::io::stderr().flush();
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["o", "Ko", "Mo", "Go"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} o")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
