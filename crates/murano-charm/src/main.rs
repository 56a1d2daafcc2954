//! Murano charm binary.
//!
//! Juju runs one hook per process. Hook files are symlinks to this
//! executable, so the hook name comes from the command line, the
//! `JUJU_HOOK_NAME` variable or the name the binary was invoked under.

use anyhow::{Context, Result};
use charm_tools::{CommandRunner, HookTools, JujuHookTools, SystemRunner};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use murano_charm::handlers;
use murano_charm::{MuranoCharm, Settings, StateStore};

#[derive(Parser)]
#[command(name = "murano-charm")]
#[command(version, about = "Juju charm for the Murano application catalog", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a hook (default when invoked through a hook symlink)
    Hook {
        /// Hook name; defaults to $JUJU_HOOK_NAME or the executable name
        name: Option<String>,
    },

    /// Import the core library package using the rendered credentials file
    ImportPackage,

    /// Print the persisted flags and stage as JSON
    State,
}

fn hook_name(explicit: Option<String>) -> Result<String> {
    if let Some(name) = explicit {
        return Ok(name);
    }
    if let Ok(name) = std::env::var("JUJU_HOOK_NAME") {
        if !name.is_empty() {
            return Ok(name);
        }
    }
    std::env::args()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .context("Cannot determine hook name")
}

async fn load_charm(settings: Settings) -> Result<MuranoCharm> {
    let runner: Arc<dyn CommandRunner> =
        Arc::new(SystemRunner::new().with_default_timeout(settings.command_timeout()));
    let unit: Arc<dyn HookTools> = Arc::new(JujuHookTools::new(runner.clone()));

    MuranoCharm::load(settings, unit, runner)
        .await
        .context("Failed to load charm configuration")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Hook stderr ends up in the unit log
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,murano_charm=debug,charm_tools=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("Failed to load settings")?;
    let store = StateStore::new(settings.state_file());

    match cli.command {
        Some(Commands::ImportPackage) => {
            let charm = load_charm(settings).await?;
            let imported = handlers::import_package_action(&charm)
                .await
                .context("Package import failed")?;
            tracing::info!(imported, "Package import finished");
        }
        Some(Commands::State) => {
            let state = store.load().await?;
            let machine = murano_charm::Machine::new(state.flags.clone());
            let report = serde_json::json!({
                "stage": machine.stage(),
                "flags": state.flags,
                "last_hook": state.last_hook,
                "updated_at": state.updated_at,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some(Commands::Hook { name }) => run_hook(settings, &store, hook_name(name)?).await?,
        None => run_hook(settings, &store, hook_name(None)?).await?,
    }

    Ok(())
}

async fn run_hook(settings: Settings, store: &StateStore, hook: String) -> Result<()> {
    tracing::info!(hook = %hook, "Running hook");
    let charm = load_charm(settings).await?;
    let outcome = handlers::run_hook(&charm, store, &hook)
        .await
        .with_context(|| format!("Hook {hook} failed"))?;
    tracing::info!(
        hook = %outcome.hook,
        stage = %outcome.stage,
        actions = outcome.actions.len(),
        "Hook complete"
    );
    Ok(())
}
