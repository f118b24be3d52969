/// `load_config` module: Loads a static YAML manifest file and maps it into the core's validated `Manifest`.
///
/// This module is the only place where untrusted YAML is parsed and mapped to the strongly-typed
/// domain values of `bintray-sync-core`.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into strict intermediate structs (unknown keys are rejected)
/// - Convert repositories and packages into [`Manifest`] values, which reject duplicate keys
/// - Validate run-level settings (`threads`, `cleanup`)
///
/// Secrets (Bintray user, API key, GPG passphrase) never live in this file; they are read from
/// the environment by [`crate::bintray::BintrayClient::new_from_env`] and [`gpg_passphrase_from_env`].
///
/// # Errors
/// All errors use `anyhow::Error` with context and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use bintray_sync_core::contract::{PackageConfig, RepositoryConfig, UploadParams};
use bintray_sync_core::manifest::{Manifest, Repository};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const DEFAULT_THREADS: usize = 3;

pub const GPG_PASSPHRASE_ENV: &str = "BINTRAY_ADMIN_GPG_PASSPHRASE";

/// Everything the CLI needs from the manifest file.
#[derive(Debug)]
pub struct CliConfig {
    /// Upload concurrency per package.
    pub threads: usize,
    pub cleanup: bool,
    pub manifest: Manifest,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    threads: Option<usize>,
    #[serde(default)]
    cleanup: bool,
    bintray: BintraySection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BintraySection {
    #[serde(default)]
    repos: Vec<RepoYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepoYaml {
    name: String,
    subject: String,
    #[serde(default)]
    config: RepositoryConfig,
    #[serde(default)]
    packages: Vec<PackageYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageYaml {
    package: String,
    #[serde(default)]
    config: PackageConfig,
    upload: UploadParams,
}

/// Loads the YAML manifest file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    parse_config(&config_content)
        .with_context(|| format!("Invalid config file {}", path_ref.display()))
}

/// Parses manifest YAML that is already in memory.
pub fn parse_config(content: &str) -> Result<CliConfig> {
    let raw: RawConfig = match serde_yaml::from_str(content) {
        Ok(conf) => {
            info!("Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let threads = raw.threads.unwrap_or(DEFAULT_THREADS);
    if threads == 0 {
        error!("threads must be at least 1");
        anyhow::bail!("threads must be at least 1");
    }

    let repositories = raw
        .bintray
        .repos
        .into_iter()
        .map(|repo| {
            info!(subject = %repo.subject, repo = %repo.name, packages = repo.packages.len(), "Parsed repository from config");
            repo.packages.into_iter().fold(
                Repository::new(repo.subject, repo.name, repo.config),
                |acc, pkg| acc.with_package(pkg.package, pkg.config, pkg.upload),
            )
        })
        .collect();

    let manifest = Manifest::new(repositories).context("Manifest validation failed")?;
    manifest.trace_loaded();

    info!(threads, cleanup = raw.cleanup, "Config loaded and validated successfully");

    Ok(CliConfig {
        threads,
        cleanup: raw.cleanup,
        manifest,
    })
}

/// Reads the optional GPG signing passphrase from the environment.
pub fn gpg_passphrase_from_env() -> Option<String> {
    match std::env::var(GPG_PASSPHRASE_ENV) {
        Ok(passphrase) if !passphrase.is_empty() => {
            info!("{GPG_PASSPHRASE_ENV} found in env");
            Some(passphrase)
        }
        _ => {
            info!("{GPG_PASSPHRASE_ENV} not set, signing without passphrase");
            None
        }
    }
}
