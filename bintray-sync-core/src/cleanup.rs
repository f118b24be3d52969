//! Destructive pass: delete every declared package, then its repository.
//!
//! Failures are logged and collected but never stop the pass; a missing entity is the
//! common cause and is harmless, since reconciliation recreates everything afterwards.

use serde::Serialize;
use tracing::{info, warn, Instrument};

use crate::context::RunContext;
use crate::contract::{PackagePath, PackageService, RepositoryPath};
use crate::manifest::Manifest;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub packages_deleted: Vec<PackagePath>,
    pub repositories_deleted: Vec<RepositoryPath>,
    /// One message per failed deletion.
    pub failures: Vec<String>,
}

pub async fn cleanup<S>(ctx: &RunContext, manifest: &Manifest, service: &S) -> CleanupReport
where
    S: PackageService + ?Sized,
{
    async {
        info!(
            repositories = manifest.repositories().len(),
            "[CLEANUP] Deleting declared packages and repositories"
        );
        let mut report = CleanupReport::default();

        for repo in manifest.repositories() {
            for package in repo.packages() {
                let path = package.path();
                info!(package = %path, "[CLEANUP] Deleting package");
                match service.delete_package(path).await {
                    Ok(()) => report.packages_deleted.push(path.clone()),
                    Err(e) => {
                        warn!(package = %path, error = %e, "[CLEANUP] Package non-existent or not deletable");
                        report
                            .failures
                            .push(format!("package {path} non-existent: {e}"));
                    }
                }
            }

            let path = repo.path();
            info!(repository = %path, "[CLEANUP] Deleting repository");
            match service.delete_repository(path).await {
                Ok(()) => report.repositories_deleted.push(path.clone()),
                Err(e) => {
                    warn!(repository = %path, error = %e, "[CLEANUP] Repo non-existent or not deletable");
                    report
                        .failures
                        .push(format!("repository {path} non-existent: {e}"));
                }
            }
        }

        info!(
            packages_deleted = report.packages_deleted.len(),
            repositories_deleted = report.repositories_deleted.len(),
            failures = report.failures.len(),
            "[CLEANUP] Cleanup complete"
        );
        report
    }
    .instrument(ctx.pass_span("cleanup"))
    .await
}
