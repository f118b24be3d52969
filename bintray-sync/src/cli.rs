///
/// This module implements the full CLI interface for bintray-sync: command parsing,
/// main entrypoints, and user-visible output.
///
/// All passes (reconcile, cleanup, publish) live in the [`bintray-sync-core`] crate.
/// This module is strictly CLI glue: it loads the manifest, builds the Bintray client
/// and the run context, and prints the resulting report.
///
/// ## How To Use
/// - For command-line users: use the installed `bintray-sync` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`bintray-sync-core`]: ../../bintray-sync-core/
use crate::bintray::BintrayClient;
use crate::load_config::{gpg_passphrase_from_env, load_config};
use anyhow::Result;
use bintray_sync_core::cleanup::cleanup;
use bintray_sync_core::config::SynchroniseOptions;
use bintray_sync_core::context::RunContext;
use bintray_sync_core::reconcile::reconcile;
use bintray_sync_core::synchronise::synchronise;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

/// CLI for bintray-sync: provision and publish packages from a YAML manifest.
#[derive(Parser)]
#[clap(
    name = "bintray-sync",
    version,
    about = "Provision Bintray repositories and packages from a YAML manifest, then upload, sign and publish"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile, upload, sign, publish and index everything in the manifest
    Sync {
        /// Path to the YAML manifest file
        #[clap(long)]
        config: PathBuf,
        /// Delete declared packages and repositories first, even if the manifest does not ask to
        #[clap(long)]
        cleanup: bool,
    },
    /// Only create the repositories and packages that are missing
    Reconcile {
        /// Path to the YAML manifest file
        #[clap(long)]
        config: PathBuf,
    },
    /// Only delete the declared packages and repositories
    Cleanup {
        /// Path to the YAML manifest file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config, cleanup } => {
            let config = load_config(config)?;
            let client = client(config.threads)?;
            let options = SynchroniseOptions {
                cleanup: cleanup || config.cleanup,
                gpg_passphrase: gpg_passphrase_from_env(),
            };
            options.trace_loaded();

            let ctx = RunContext::new();
            tracing::info!(command = "sync", run_id = %ctx.run_id(), "Starting synchronisation");
            println!("Synchronise starting...");
            match synchronise(&ctx, &config.manifest, &client, &options).await {
                Ok(report) => {
                    print_report("Synchronise", &report)?;
                    if report.has_failures() {
                        tracing::error!(command = "sync", "Synchronisation finished with failed steps");
                        anyhow::bail!("one or more publish steps failed, see report above");
                    }
                    tracing::info!(command = "sync", "Synchronisation complete");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Synchronisation failed: {e}");
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Reconcile { config } => {
            let config = load_config(config)?;
            let client = client(config.threads)?;
            let ctx = RunContext::new();
            tracing::info!(command = "reconcile", run_id = %ctx.run_id(), "Starting reconciliation");
            match reconcile(&ctx, &config.manifest, &client).await {
                Ok(report) => {
                    print_report("Reconcile", &report)?;
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Reconciliation failed: {e}");
                    tracing::error!(command = "reconcile", error = %e, "Reconciliation failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Cleanup { config } => {
            let config = load_config(config)?;
            let client = client(config.threads)?;
            let ctx = RunContext::new();
            tracing::info!(command = "cleanup", run_id = %ctx.run_id(), "Starting cleanup");
            let report = cleanup(&ctx, &config.manifest, &client).await;
            print_report("Cleanup", &report)
        }
    }
}

fn client(threads: usize) -> Result<BintrayClient> {
    BintrayClient::new_from_env(threads).map_err(|e| anyhow::anyhow!("{e}"))
}

fn print_report<T: Serialize>(label: &str, report: &T) -> Result<()> {
    println!("{label} complete.\nReport:");
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
