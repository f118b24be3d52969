//! Reconciliation pass: create whatever the manifest declares and the service lacks.
//!
//! For each repository in manifest order the service is asked whether it exists; an
//! absent repository is created from its configuration. The same check-then-create step
//! then runs for each of its packages, in order.
//!
//! # Error Handling
//! - A failed existence check is logged and treated as "absent", so creation is attempted.
//! - A failed creation aborts the pass immediately with a [`ReconcileError`]; nothing
//!   after the failing entity is processed.
//!
//! The check and the create are two separate calls, so an entity created by someone
//! else in between surfaces as a creation failure or as `created == false`.

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};

use crate::context::RunContext;
use crate::contract::{PackagePath, PackageService, RepositoryPath, ServiceError};
use crate::manifest::{Manifest, Package, Repository};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to create repository {repository}: {source}")]
    CreateRepository {
        repository: RepositoryPath,
        #[source]
        source: ServiceError,
    },

    #[error("failed to create package {package}: {source}")]
    CreatePackage {
        package: PackagePath,
        #[source]
        source: ServiceError,
    },
}

/// What the pass did for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageOutcome {
    pub package: PackagePath,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryOutcome {
    pub repository: RepositoryPath,
    pub action: Action,
    pub packages: Vec<PackageOutcome>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub repositories: Vec<RepositoryOutcome>,
}

impl ReconcileReport {
    /// Number of repositories and packages created by the pass.
    pub fn created_count(&self) -> usize {
        self.repositories
            .iter()
            .map(|r| {
                usize::from(r.action == Action::Created)
                    + r.packages
                        .iter()
                        .filter(|p| p.action == Action::Created)
                        .count()
            })
            .sum()
    }
}

pub async fn reconcile<S>(
    ctx: &RunContext,
    manifest: &Manifest,
    service: &S,
) -> Result<ReconcileReport, ReconcileError>
where
    S: PackageService + ?Sized,
{
    async {
        info!(
            repositories = manifest.repositories().len(),
            "[RECONCILE] Starting reconciliation"
        );

        let mut report = ReconcileReport::default();
        for repo in manifest.repositories() {
            let outcome = reconcile_repository(repo, service).await?;
            report.repositories.push(outcome);
        }

        info!(
            created = report.created_count(),
            "[RECONCILE] Reconciliation complete"
        );
        Ok(report)
    }
    .instrument(ctx.pass_span("reconcile"))
    .await
}

async fn reconcile_repository<S>(
    repo: &Repository,
    service: &S,
) -> Result<RepositoryOutcome, ReconcileError>
where
    S: PackageService + ?Sized,
{
    let path = repo.path();
    let exists = match service.repository_exists(path).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!(repository = %path, error = %e, "[RECONCILE] Repository existence check failed, assuming absent");
            false
        }
    };

    let action = if exists {
        info!(repository = %path, "[RECONCILE] Repository already exists");
        Action::AlreadyExists
    } else {
        info!(repository = %path, "[RECONCILE] Repository does not exist, creating");
        match service.create_repository(path, repo.config()).await {
            Ok(true) => {
                info!(repository = %path, "[RECONCILE] Repository created");
                Action::Created
            }
            Ok(false) => {
                info!(repository = %path, "[RECONCILE] Service reported repository as already present");
                Action::AlreadyExists
            }
            Err(e) => {
                error!(repository = %path, error = %e, "[RECONCILE][ERROR] Repository creation failed");
                return Err(ReconcileError::CreateRepository {
                    repository: path.clone(),
                    source: e,
                });
            }
        }
    };

    let mut packages = Vec::with_capacity(repo.packages().len());
    for package in repo.packages() {
        packages.push(reconcile_package(package, service).await?);
    }

    Ok(RepositoryOutcome {
        repository: path.clone(),
        action,
        packages,
    })
}

async fn reconcile_package<S>(package: &Package, service: &S) -> Result<PackageOutcome, ReconcileError>
where
    S: PackageService + ?Sized,
{
    let path = package.path();
    let exists = match service.package_exists(path).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!(package = %path, error = %e, "[RECONCILE] Package existence check failed, assuming absent");
            false
        }
    };

    if exists {
        info!(package = %path, "[RECONCILE] Package already exists");
        return Ok(PackageOutcome {
            package: path.clone(),
            action: Action::AlreadyExists,
        });
    }

    info!(package = %path, "[RECONCILE] Package does not exist, creating");
    if let Err(e) = service.create_package(path, package.config()).await {
        error!(package = %path, error = %e, "[RECONCILE][ERROR] Package creation failed");
        return Err(ReconcileError::CreatePackage {
            package: path.clone(),
            source: e,
        });
    }
    info!(package = %path, "[RECONCILE] Package created");

    Ok(PackageOutcome {
        package: path.clone(),
        action: Action::Created,
    })
}
