//! appshell daemon binary.
//!
//! Boots the shell context against the identity service and exposes the
//! session lifecycle from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Reconcile once and print the session
//! appshell --project my-project status
//!
//! # Log out, clearing the local session whatever the backend says
//! appshell --project my-project logout
//!
//! # Stream session events, re-checking every 30 seconds
//! appshell --project my-project watch --refresh-secs 30
//!
//! # No backend: pretend "u1" is signed in
//! appshell --offline-user u1 status
//! ```
//!
//! Log level comes from `RUST_LOG` (default `info`).

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use appshell_core::config::ConfigError;
use appshell_core::identity::ScriptedIdentityService;
use appshell_core::paths::default_config_dir;
use appshell_core::{Identity, ReconcilePolicy, ShellConfig, ShellContext};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "appshell")]
#[command(about = "Session lifecycle for the app shell")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/appshell/config.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Identity service endpoint, e.g. https://cloud.appwrite.io/v1
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Identity service project id
    #[arg(long, global = true)]
    project: Option<String>,

    /// Session credential file
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Collapse concurrent reconciles into one request
    #[arg(long, global = true)]
    single_flight: bool,

    /// Skip the backend and treat this user id as signed in
    #[arg(long, global = true)]
    offline_user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Print the session after the initial reconciliation
    Status,
    /// Log out remotely and clear the local session
    Logout,
    /// Reconcile again and print the session
    Refresh,
    /// Print session events as JSON lines until Ctrl-C
    Watch {
        /// Reconcile on this interval (seconds)
        #[arg(long)]
        refresh_secs: Option<u64>,
    },
}

/// Config file, then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<ShellConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => ShellConfig::load(path)?,
        None => match default_config_dir() {
            Some(dir) => ShellConfig::load_from_dir(&dir)?,
            None => ShellConfig::default(),
        },
    };

    config.apply_env_overrides();

    if let Some(endpoint) = &cli.endpoint {
        config.identity.endpoint = endpoint.clone();
    }
    if let Some(project) = &cli.project {
        config.identity.project_id = project.clone();
    }
    if let Some(path) = &cli.credentials {
        config.credentials_path = Some(path.clone());
    }
    if cli.single_flight {
        config.reconcile_policy = ReconcilePolicy::SingleFlight;
    }

    Ok(config)
}

fn build_context(cli: &Cli, config: ShellConfig) -> Result<ShellContext, ConfigError> {
    let mut builder = ShellContext::builder().config(config);
    if let Some(user) = &cli.offline_user {
        log::info!("Offline mode, signed in as {}", user);
        builder = builder.identity(Arc::new(ScriptedIdentityService::signed_in(
            Identity::new(user.as_str()),
        )));
    }
    builder.build()
}

fn print_session(ctx: &ShellContext) -> Result<(), serde_json::Error> {
    let session = ctx.session.get_session();
    let stack = ctx.root_stack();
    let output = json!({
        "instanceId": ctx.instance_id(),
        "session": session,
        "stack": stack,
        "initialRoute": stack.initial_route(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print events as JSON lines until `shutdown` resolves or the bus closes.
async fn watch<F, W>(
    ctx: &ShellContext,
    refresh_secs: Option<u64>,
    shutdown: F,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future,
    W: Write,
{
    let mut events = ctx.session.events();
    // One future for the whole loop, so a signal that lands mid-iteration
    // is still seen.
    tokio::pin!(shutdown);

    if let Some(secs) = refresh_secs.filter(|secs| *secs > 0) {
        let session = ctx.session.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            // The first tick fires immediately; the initial reconcile covers it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if session.is_disposed() {
                    break;
                }
                session.reconcile().await;
            }
        });
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Interrupted, shutting down");
                ctx.shutdown();
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    writeln!(out, "{}", serde_json::to_string(&event)?)?;
                    out.flush()?;
                }
                Err(RecvError::Lagged(missed)) => log::warn!("Missed {} session events", missed),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let ctx = build_context(&cli, config)?;
    log::debug!("Shell instance {} started", ctx.instance_id());

    match cli.command {
        Command::Status => {
            ctx.session.wait_until_loaded().await;
            print_session(&ctx)?;
        }
        Command::Logout => {
            ctx.session.wait_until_loaded().await;
            ctx.session.logout().await;
            print_session(&ctx)?;
        }
        Command::Refresh => {
            ctx.session.wait_until_loaded().await;
            ctx.session.reconcile().await;
            print_session(&ctx)?;
        }
        Command::Watch { refresh_secs } => {
            print_session(&ctx)?;
            let mut stdout = std::io::stdout();
            watch(&ctx, refresh_secs, tokio::signal::ctrl_c(), &mut stdout).await?;
        }
    }

    ctx.shutdown();
    Ok(())
}
