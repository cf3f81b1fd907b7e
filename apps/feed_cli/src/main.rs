mod terminal;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, load_settings_from, AuthControl, ClientSettings, FileIdentityProvider,
    PostComposer, PostListView, ServiceClientFactory, SessionManager,
};
use shared::domain::PostId;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::terminal::{TerminalNavigator, TerminalSurface};

#[derive(Parser, Debug)]
struct Args {
    /// Settings file; `client.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in through the identity provider and store the session.
    Login {
        #[arg(long)]
        username: String,
    },
    Logout,
    Whoami,
    /// Show one page of the feed, newest first.
    Feed {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    Post {
        content: String,
    },
    Like {
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings()?,
    };
    info!(network = ?settings.network, "loaded client settings");

    let surface = Arc::new(TerminalSurface);
    let navigator = Arc::new(TerminalNavigator);

    match args.command {
        Command::Login { username } => {
            let provider = FileIdentityProvider::new(&settings.session_path)
                .with_username(username)
                .with_timeout(settings.call_timeout());
            let session = Arc::new(SessionManager::new(Arc::new(provider), navigator));
            let control = AuthControl::new(session, surface);
            control.toggle(&settings.identity_provider_url()?).await?;
        }
        Command::Logout => {
            let session = Arc::new(SessionManager::new(provider(&settings), navigator));
            if session.restore().await.is_none() {
                println!("not signed in");
                return Ok(());
            }
            let control = AuthControl::new(session, surface);
            control.toggle(&settings.identity_provider_url()?).await?;
        }
        Command::Whoami => {
            let session = SessionManager::new(provider(&settings), navigator);
            match session.restore().await {
                Some(identity) => println!(
                    "{} (session expires {})",
                    identity.principal(),
                    identity.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
                ),
                None => bail!("not signed in"),
            }
        }
        Command::Feed { limit, offset } => {
            let feed = open_feed(&settings, surface, navigator).await?;
            feed.refresh(limit.unwrap_or(settings.page_size), offset)
                .await?;
        }
        Command::Post { content } => {
            let feed = open_feed(&settings, surface.clone(), navigator).await?;
            let composer = PostComposer::with_service(
                feed.service(),
                surface,
                Arc::clone(&feed),
                settings.page_size,
            );
            composer.submit(&content).await?;
        }
        Command::Like { id } => {
            let id = PostId(id);
            let feed = open_feed(&settings, surface, navigator).await?;
            feed.refresh(settings.page_size, 0).await?;
            let control = match feed.like_control(id).await {
                Some(control) => control,
                None => feed
                    .show_post(id)
                    .await?
                    .with_context(|| format!("post {id} does not exist"))?,
            };
            let count = control.like().await?;
            println!("post {id} now has {count} likes");
        }
    }

    Ok(())
}

fn provider(settings: &ClientSettings) -> Arc<FileIdentityProvider> {
    Arc::new(FileIdentityProvider::new(&settings.session_path))
}

async fn open_feed(
    settings: &ClientSettings,
    surface: Arc<TerminalSurface>,
    navigator: Arc<TerminalNavigator>,
) -> Result<Arc<PostListView>> {
    let session = SessionManager::new(provider(settings), navigator);
    let factory = ServiceClientFactory::from_settings(settings);
    let Some(context) = session.enter_feed(&factory).await? else {
        bail!("not signed in; run `feed_cli login --username <name>` first");
    };
    Ok(Arc::new(PostListView::new(&context, surface.clone(), surface)))
}
