use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lexdesk::app::App;
use lexdesk::cli::render::TerminalNotifier;
use lexdesk::cli::{self, Cli, Command};
use lexdesk::config::Config;
use lexdesk::settings::{Settings, default_settings_path};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lexdesk=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    let config = Config::resolve(&settings).context("invalid configuration")?;
    tracing::debug!("Using API at {}", config.api.base_url);

    let app = App::with_token_file(config, Arc::new(TerminalNotifier))
        .context("building HTTP client")?;

    // Password recovery works without a session; skip the profile round-trip.
    if !matches!(
        cli.command,
        Command::ForgotPassword { .. } | Command::ResetPassword { .. }
    ) {
        app.session().restore().await;
    }

    cli::run(&app, cli.command).await
}
