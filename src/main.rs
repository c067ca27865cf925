//! Ember Coordinator CLI
//!
//! Builds, watches, tests and installs Ember CLI apps for a host application.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ember_coordinator::command::HOST_ENV_VAR;
use ember_coordinator::{
    AppRegistry, Configuration, DependencyChecker, Error, HostContext, Result, ShellRunner,
    Validate, WaitOutcome,
};

#[derive(Parser)]
#[command(name = "ember-coordinator", version, about = "Coordinate Ember CLI builds")]
struct Cli {
    /// Configuration file (.toml, .yml or .yaml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host environment name. Defaults to $HOST_ENV, then `development`.
    #[arg(short, long)]
    environment: Option<String>,

    /// Root of the host application.
    #[arg(long, default_value = ".")]
    host_root: PathBuf,

    /// Directory the build tool writes into. Defaults to <host-root>/tmp/ember-cli.
    #[arg(long)]
    build_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate configuration and installed dependencies.
    Check { apps: Vec<String> },
    /// Build apps once.
    Compile { apps: Vec<String> },
    /// Build apps in watch mode until interrupted.
    Serve { apps: Vec<String> },
    /// Run an app's test suite.
    Test { app: String },
    /// Install an app's npm and bower dependencies.
    Install { app: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        if let Some(trace) = e.build_trace() {
            for line in trace {
                eprintln!("  {}", line);
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let configuration = match &cli.config {
        Some(path) => Configuration::load(path)?,
        None => Configuration::default(),
    };
    for warning in configuration.validate().into_result()? {
        tracing::warn!("{}", warning);
    }

    let environment = cli
        .environment
        .clone()
        .or_else(|| std::env::var(HOST_ENV_VAR).ok())
        .unwrap_or_else(|| "development".to_string());
    let host_root = std::fs::canonicalize(&cli.host_root)?;
    let mut host = HostContext::new(environment, host_root);
    if let Some(build_root) = &cli.build_root {
        host = host.with_build_root(build_root);
    }

    let registry = AppRegistry::new(configuration, host, Arc::new(ShellRunner::new()));

    match cli.command {
        Command::Check { apps } => {
            let registry = select(registry, apps)?;
            for name in registry.names() {
                if let Some(coordinator) = registry.get(name) {
                    DependencyChecker::for_paths(coordinator.paths()).check()?;
                    println!("{}: dependencies ok", name);
                }
            }
            Ok(())
        }
        Command::Compile { apps } => {
            let mut registry = select(registry, apps)?;
            registry.compile_all()?;
            for name in registry.names() {
                println!("{}: compiled", name);
            }
            Ok(())
        }
        Command::Serve { apps } => serve(select(registry, apps)?).await,
        Command::Test { app } => {
            let mut registry = registry;
            registry.add(app).run_tests()
        }
        Command::Install { app } => {
            let mut registry = registry;
            registry.add(app).install_dependencies()
        }
    }
}

/// Registers `apps`, or every configured app when none are named.
fn select(registry: AppRegistry, apps: Vec<String>) -> Result<AppRegistry> {
    let mut registry = if apps.is_empty() {
        registry.with_configured_apps()
    } else {
        registry
    };
    for app in apps {
        registry.add(app);
    }
    if registry.is_empty() {
        return Err(Error::Config(
            "no apps given and none configured".to_string(),
        ));
    }
    Ok(registry)
}

async fn serve(mut registry: AppRegistry) -> Result<()> {
    registry.run_all()?;

    let (mut registry, waited) = tokio::task::spawn_blocking(move || {
        let waited = registry.wait_all();
        (registry, waited)
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    match waited {
        Ok(outcomes) => {
            for (name, outcome) in outcomes {
                match outcome {
                    WaitOutcome::Ready => tracing::info!(app = %name, "first build ready"),
                    WaitOutcome::TimedOut { .. } => {
                        tracing::info!(app = %name, "serving before first build finished")
                    }
                }
            }
        }
        Err(e) => {
            registry.shutdown()?;
            return Err(e);
        }
    }

    tracing::info!("watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    registry.shutdown()
}
