//! Command-line surface of the `lexdesk` binary.

pub mod render;
pub mod repl;

use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rustyline::config::Configurer;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::history::DefaultHistory;
use rustyline::{ColorMode, Completer, Editor, Helper, Hinter, Validator};

use crate::api::types::{ProfileUpdate, RegisterRequest};
use crate::app::App;
use crate::chat::ConversationTarget;
use crate::documents::DocumentOwner;
use crate::guard::Route;
use crate::session::Role;

#[derive(Debug, Parser)]
#[command(name = "lexdesk", version)]
#[command(about = "Terminal client for the legal-services platform", long_about = None)]
pub struct Cli {
    /// Settings file (TOML). Defaults to the platform config directory.
    #[arg(long, global = true, env = "LEXDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and keep the session for later commands
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "LEXDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create a client or lawyer account
    Register(RegisterArgs),
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Update profile fields
    Profile(ProfileArgs),
    /// Ask for a password reset e-mail
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password from a reset link token
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long, env = "LEXDESK_NEW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Change the password of the signed-in user
    ChangePassword,
    /// Open the conversation of a project, a legal request, or a standalone one
    Chat(ChatArgs),
    /// Manage the documents of a project or legal request
    Documents {
        #[command(subcommand)]
        action: DocumentAction,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AccountKind {
    Client,
    Lawyer,
}

impl From<AccountKind> for Role {
    fn from(kind: AccountKind) -> Self {
        match kind {
            AccountKind::Client => Role::Client,
            AccountKind::Lawyer => Role::Lawyer,
        }
    }
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    #[arg(long)]
    pub email: String,
    #[arg(long, value_enum, default_value = "client")]
    pub role: AccountKind,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long, env = "LEXDESK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[arg(long)]
    pub first_name: Option<String>,
    #[arg(long)]
    pub last_name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Project id
    #[arg(long, conflicts_with = "legal_request")]
    pub project: Option<String>,
    /// Project title, used when the thread has to be created
    #[arg(long, requires = "project")]
    pub title: Option<String>,
    /// Legal request id
    #[arg(long)]
    pub legal_request: Option<String>,
}

impl ChatArgs {
    pub fn target(self) -> ConversationTarget {
        match (self.project, self.legal_request) {
            (Some(id), _) => ConversationTarget::project(id, self.title),
            (None, Some(id)) => ConversationTarget::legal_request(id),
            (None, None) => ConversationTarget::standalone(),
        }
    }
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct OwnerArgs {
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub legal_request: Option<String>,
}

impl OwnerArgs {
    pub fn owner(self) -> anyhow::Result<DocumentOwner> {
        match (self.project, self.legal_request) {
            (Some(id), None) => Ok(DocumentOwner::Project(id)),
            (None, Some(id)) => Ok(DocumentOwner::LegalRequest(id)),
            _ => bail!("pass exactly one of --project or --legal-request"),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum DocumentAction {
    List {
        #[command(flatten)]
        owner: OwnerArgs,
    },
    Upload {
        #[command(flatten)]
        owner: OwnerArgs,
        file: PathBuf,
    },
    Download {
        #[command(flatten)]
        owner: OwnerArgs,
        id: String,
        /// Destination directory
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
}

/// Line editor helper that draws every typed character as `*`.
#[derive(Completer, Helper, Hinter, Validator)]
struct MaskedInput;

impl Highlighter for MaskedInput {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Owned(mask(line))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn mask(line: &str) -> String {
    "*".repeat(line.chars().count())
}

fn prompt_secret(label: &str) -> anyhow::Result<String> {
    let mut editor: Editor<MaskedInput, DefaultHistory> =
        Editor::new().context("terminal unavailable")?;
    editor.set_helper(Some(MaskedInput));
    // Masking goes through the highlighter, which only runs with colors on.
    editor.set_color_mode(ColorMode::Forced);
    editor.set_auto_add_history(false);
    let value = editor.readline(label).context("no input")?;
    Ok(value)
}

fn password_or_prompt(value: Option<String>, label: &str) -> anyhow::Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt_secret(label),
    }
}

fn require_session(app: &App) -> anyhow::Result<()> {
    if app.session().is_authenticated() {
        return Ok(());
    }
    bail!("Veuillez vous connecter avec `lexdesk login`.")
}

/// Run one command against a wired client whose session was restored.
pub async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    let session = app.session();
    match command {
        Command::Login { email, password } => {
            let password = password_or_prompt(password, "Mot de passe : ")?;
            let user = session
                .login(&email, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Connecté en tant que {} ({}).", user.display_name, user.role);
        }
        Command::Register(args) => {
            let password = password_or_prompt(args.password, "Mot de passe : ")?;
            let request = RegisterRequest {
                first_name: args.first_name,
                last_name: args.last_name,
                email: args.email,
                password,
                role: args.role.into(),
                phone: args.phone,
            };
            let user = session
                .register(&request)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Compte créé pour {}.", user.display_name);
        }
        Command::Logout => session.logout(),
        Command::Whoami => match session.session() {
            Some(user) => {
                println!("{} <{}>", user.display_name, user.email);
                if let Some(phone) = session.profile().and_then(|p| p.phone) {
                    println!("Téléphone : {phone}");
                }
                println!("Rôle : {}", user.role);
                println!("Accueil : {}", Route::home_for(user.role));
                if let Some(expiry) = user.token_expiry {
                    println!("Session valable jusqu'au {}", expiry.format("%d/%m/%Y %H:%M UTC"));
                }
            }
            None => {
                let view = session.snapshot();
                match view.error {
                    Some(reason) => println!("Non connecté ({reason})."),
                    None => println!("Non connecté."),
                }
            }
        },
        Command::Profile(args) => {
            require_session(app)?;
            let update = ProfileUpdate {
                first_name: args.first_name,
                last_name: args.last_name,
                email: args.email,
                phone: args.phone,
            };
            let user = session
                .update_profile(&update)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{} <{}>", user.display_name, user.email);
        }
        Command::ForgotPassword { email } => {
            session
                .forgot_password(&email)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        }
        Command::ResetPassword { token, password } => {
            let password = password_or_prompt(password, "Nouveau mot de passe : ")?;
            session
                .reset_password(&token, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        }
        Command::ChangePassword => {
            require_session(app)?;
            let current = prompt_secret("Mot de passe actuel : ")?;
            let new = prompt_secret("Nouveau mot de passe : ")?;
            session
                .change_password(&current, &new)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        }
        Command::Chat(args) => {
            require_session(app)?;
            repl::run(app, args.target()).await?;
        }
        Command::Documents { action } => {
            require_session(app)?;
            documents(app, action).await?;
        }
    }
    Ok(())
}

async fn documents(app: &App, action: DocumentAction) -> anyhow::Result<()> {
    match action {
        DocumentAction::List { owner } => {
            let panel = app.documents(owner.owner()?);
            let docs = panel
                .refresh()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            render::documents(&docs);
        }
        DocumentAction::Upload { owner, file } => {
            let panel = app.documents(owner.owner()?);
            let mut progress = panel.subscribe_progress();
            let watcher = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let current = *progress.borrow_and_update();
                    render::progress(current);
                }
            });
            let result = panel.upload(Some(&file), None).await;
            watcher.abort();
            eprintln!();
            let document = result.map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Document « {} » téléversé (id {}).", document.file_name, document.id);
        }
        DocumentAction::Download { owner, id, dest } => {
            let panel = app.documents(owner.owner()?);
            if let Err(e) = panel.refresh().await {
                tracing::debug!("Listing before download failed: {}", e);
            }
            let saved = panel
                .download(&id, &dest)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Enregistré sous {}", saved.display());
        }
    }
    Ok(())
}
