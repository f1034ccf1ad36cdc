//! Interactive chat loop on top of [`ChatSession`].

use std::path::PathBuf;

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use crate::app::App;
use crate::chat::{ChatSession, ConversationTarget};
use crate::cli::render;
use crate::documents::{DocumentOwner, DocumentPanel};
use crate::error::ChatError;

const COMMANDS: &[&str] = &[
    "/ask", "/delete", "/edit", "/help", "/quit", "/reload", "/suggestions", "/upload",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    Ask(usize),
    Edit { id: String, text: String },
    Delete(String),
    Upload(PathBuf),
    Reload,
    Suggestions,
    Help,
    Quit,
    Invalid(String),
}

impl ReplCommand {
    /// `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };
        let (name, args) = rest
            .split_once(char::is_whitespace)
            .map(|(n, a)| (n, a.trim()))
            .unwrap_or((rest, ""));

        let command = match (name, args) {
            ("quit" | "exit", _) => Self::Quit,
            ("help", _) => Self::Help,
            ("reload", _) => Self::Reload,
            ("suggestions", _) => Self::Suggestions,
            ("delete", id) if !id.is_empty() => Self::Delete(id.to_string()),
            ("upload", path) if !path.is_empty() => Self::Upload(PathBuf::from(path)),
            ("ask", n) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Self::Ask(n),
                _ => Self::Invalid("Usage : /ask <numéro de suggestion>".to_string()),
            },
            ("edit", args) => match args.split_once(char::is_whitespace) {
                Some((id, text)) if !text.trim().is_empty() => Self::Edit {
                    id: id.to_string(),
                    text: text.trim().to_string(),
                },
                _ => Self::Invalid("Usage : /edit <id> <nouveau texte>".to_string()),
            },
            ("delete", _) => Self::Invalid("Usage : /delete <id>".to_string()),
            ("upload", _) => Self::Invalid("Usage : /upload <chemin>".to_string()),
            (other, _) => Self::Invalid(format!("Commande inconnue : /{other}")),
        };
        Some(command)
    }
}

#[derive(Clone)]
struct ReplHelper;

impl Helper for ReplHelper {}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return Ok((0, Vec::new()));
        }
        let candidates = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {}

impl Validator for ReplHelper {}

fn print_help() {
    println!("Tapez votre question puis Entrée pour l'envoyer.");
    println!("  /ask <n>             envoyer la suggestion n");
    println!("  /edit <id> <texte>   modifier un message");
    println!("  /delete <id>         supprimer un message");
    println!("  /upload <chemin>     joindre un document");
    println!("  /reload              recharger la conversation");
    println!("  /suggestions         afficher les suggestions");
    println!("  /quit                quitter");
}

async fn send(chat: &ChatSession, skin: &termimad::MadSkin, text: &str) {
    match chat.send(text).await {
        Ok(Some(reply)) => {
            render::message(skin, &reply);
            render::suggestions(&chat.suggestions());
        }
        Ok(None) => {}
        Err(ChatError::Api(_)) => {
            // The error bubble is already part of the history.
            if let Some(last) = chat.messages().last() {
                render::message(skin, last);
            }
        }
        Err(e) => println!("✖ {}", e.user_message()),
    }
}

async fn upload(panel: Option<&DocumentPanel>, chat: &ChatSession, path: PathBuf) {
    let Some(panel) = panel else {
        println!("Les documents ne sont disponibles que pour un dossier ou une demande juridique.");
        return;
    };

    let mut progress = panel.subscribe_progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            render::progress(current);
        }
    });
    let result = panel.upload(Some(&path), Some(chat)).await;
    watcher.abort();
    eprintln!();

    match result {
        Ok(_) => {
            if let Some(notice) = chat.messages().last() {
                println!("· {}", notice.content);
            }
        }
        Err(e) => println!("✖ {}", e.user_message()),
    }
}

/// Open the chat for `target` and run the prompt until `/quit` or EOF.
pub async fn run(app: &App, target: ConversationTarget) -> anyhow::Result<()> {
    let chat = app
        .open_chat(&target)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    let panel = DocumentOwner::for_thread(&chat.thread().owner).map(|owner| app.documents(owner));
    if let Some(panel) = &panel
        && let Err(e) = panel.refresh().await
    {
        tracing::warn!("Could not list documents: {}", e);
    }

    let skin = render::skin();
    println!("=== {} ===", chat.thread().title);
    render::history(&skin, &chat.messages());
    render::suggestions(&chat.suggestions());
    println!("(/help pour l'aide)");

    let mut rl: Editor<ReplHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(ReplHelper));

    loop {
        let line = match rl.readline("vous> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("Ctrl-C : tapez /quit pour quitter.");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                chat.close();
                return Err(e.into());
            }
        };
        let Some(command) = ReplCommand::parse(&line) else {
            continue;
        };
        let _ = rl.add_history_entry(line.as_str());

        match command {
            ReplCommand::Quit => break,
            ReplCommand::Help => print_help(),
            ReplCommand::Send(text) => send(&chat, &skin, &text).await,
            ReplCommand::Ask(n) => match chat.suggestions().get(n - 1) {
                Some(question) => {
                    println!("vous> {question}");
                    send(&chat, &skin, question).await;
                }
                None => println!("Pas de suggestion n°{n}."),
            },
            ReplCommand::Edit { id, text } => match chat.edit(&id, &text).await {
                Ok(saved) => render::message(&skin, &saved),
                Err(e) => println!("✖ {}", e.user_message()),
            },
            ReplCommand::Delete(id) => match chat.delete(&id).await {
                Ok(()) => println!("Message supprimé."),
                Err(e) => println!("✖ {}", e.user_message()),
            },
            ReplCommand::Upload(path) => upload(panel.as_ref(), &chat, path).await,
            ReplCommand::Reload => match chat.reload().await {
                Ok(()) => render::history(&skin, &chat.messages()),
                Err(e) => println!("✖ {}", e.user_message()),
            },
            ReplCommand::Suggestions => render::suggestions(&chat.suggestions()),
            ReplCommand::Invalid(reason) => println!("{reason}"),
        }

        if !app.session().is_authenticated() {
            println!("Session terminée. Reconnectez-vous avec `lexdesk login`.");
            break;
        }
    }

    chat.close();
    Ok(())
}
