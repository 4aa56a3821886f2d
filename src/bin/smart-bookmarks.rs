use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use smart_bookmarks::prelude::*;
use smart_bookmarks::SubmitOutcome;
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "smart-bookmarks", version, about = "Manage your bookmarks from the terminal")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the URL to open in a browser to sign in
    Login,
    /// Open the dashboard and follow changes live
    Dashboard {
        /// The URL the browser was redirected to after signing in
        #[clap(long)]
        callback_url: Option<String>,
    },
}

const HELP: &str = "commands: add <title> <url> | rm <id> | ls | logout | quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let backend = Arc::new(SupabaseBackend::new(config.clone())?);

    match cli.command {
        Command::Login => {
            let login = LoginView::new(backend, &config);
            match login.login_with_provider().await {
                Some(url) => println!("Open this URL to sign in with {}:\n{}", login.provider(), url),
                None => bail!("Could not start the {} sign-in", login.provider()),
            }
        }
        Command::Dashboard { callback_url } => {
            restore_session(&backend, callback_url.as_deref()).await?;
            run_dashboard(backend, &config).await?;
        }
    }

    Ok(())
}

async fn restore_session(backend: &SupabaseBackend, callback_url: Option<&str>) -> anyhow::Result<()> {
    if let Some(callback_url) = callback_url {
        backend
            .auth()
            .get_session_from_url(callback_url)
            .await
            .context("Could not read the session from the callback URL")?;
        return Ok(());
    }

    if let (Ok(access_token), Ok(refresh_token)) = (
        env::var("BOOKMARKS_ACCESS_TOKEN"),
        env::var("BOOKMARKS_REFRESH_TOKEN"),
    ) {
        backend
            .auth()
            .set_session_from_tokens(&access_token, &refresh_token)
            .await
            .context("Stored tokens were rejected")?;
    } else {
        debug!("No callback URL or stored tokens");
    }
    Ok(())
}

async fn run_dashboard(backend: Arc<SupabaseBackend>, config: &AppConfig) -> anyhow::Result<()> {
    let navigator = Arc::new(HistoryNavigator::new());
    let mut dashboard = match Dashboard::mount(backend, navigator.clone(), config).await {
        Some(dashboard) => dashboard,
        None => {
            println!("Not signed in. Run `smart-bookmarks login` first.");
            return Ok(());
        }
    };

    println!("{}", dashboard.render());
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                if !run_command(&mut dashboard, line.trim()).await {
                    break;
                }
            }
            event = dashboard.next_event() => match event {
                Some(event) => {
                    dashboard.handle(event).await;
                    if !dashboard.is_mounted() {
                        break;
                    }
                    println!("{}", dashboard.render());
                }
                None => break,
            },
        }
    }

    dashboard.unmount().await;
    if navigator.current() == Some(Route::Login) {
        println!("Signed out.");
    }
    Ok(())
}

/// Returns false when the dashboard should close
async fn run_command(dashboard: &mut Dashboard, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "add" => {
            let rest = rest.trim();
            let (title, url) = rest.rsplit_once(' ').unwrap_or(("", rest));
            match dashboard.create(title, url).await {
                SubmitOutcome::Created => info!("Bookmark added"),
                SubmitOutcome::Skipped => println!("usage: add <title> <url>"),
                SubmitOutcome::Failed => println!("Could not add the bookmark"),
            }
        }
        "rm" => match rest.trim().parse::<BookmarkId>() {
            Ok(id) if !rest.trim().is_empty() => {
                dashboard.delete(&id).await;
            }
            _ => println!("usage: rm <id>"),
        },
        "ls" => println!("{}", dashboard.render()),
        "logout" => {
            dashboard.logout().await;
            return false;
        }
        "quit" | "exit" => return false,
        _ => println!("{}", HELP),
    }
    true
}
