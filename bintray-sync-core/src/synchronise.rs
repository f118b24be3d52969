//! High-level pipeline: orchestrates cleanup → reconcile → publish for a manifest.
//!
//! This module provides the top-level orchestration for "synchronising" the remote
//! package service with a loaded manifest:
//!   - Optionally deletes every declared package and repository ([`crate::cleanup`])
//!   - Creates missing repositories and packages ([`crate::reconcile`])
//!   - Uploads, signs, publishes and indexes every package version ([`crate::publish`])
//!
//! # Error Handling
//! Only reconciliation can abort the run: a failed creation returns its
//! [`ReconcileError`] and the publish pass is never started. Cleanup and publish
//! failures are recorded in the returned [`SynchroniseReport`].
//!
//! # Callable From
//! - The CLI crate and integration tests, with any [`PackageService`] implementation.

use serde::Serialize;
use tracing::{error, info};

use crate::cleanup::{cleanup, CleanupReport};
use crate::config::SynchroniseOptions;
use crate::context::RunContext;
use crate::contract::PackageService;
use crate::manifest::Manifest;
use crate::publish::{publish, PublishReport};
use crate::reconcile::{reconcile, ReconcileError, ReconcileReport};

#[derive(Debug, Serialize)]
pub struct SynchroniseReport {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupReport>,
    pub reconcile: ReconcileReport,
    pub publish: PublishReport,
}

impl SynchroniseReport {
    pub fn has_failures(&self) -> bool {
        self.publish.has_failures()
    }
}

pub async fn synchronise<S>(
    ctx: &RunContext,
    manifest: &Manifest,
    service: &S,
    options: &SynchroniseOptions,
) -> Result<SynchroniseReport, ReconcileError>
where
    S: PackageService + ?Sized,
{
    info!(run_id = %ctx.run_id(), cleanup = options.cleanup, "[SYNC] Starting full synchronisation pipeline");

    let cleanup_report = if options.cleanup {
        Some(cleanup(ctx, manifest, service).await)
    } else {
        None
    };

    let reconcile_report = match reconcile(ctx, manifest, service).await {
        Ok(report) => report,
        Err(e) => {
            error!(run_id = %ctx.run_id(), error = %e, "[SYNC][ERROR] Reconciliation failed, aborting run");
            return Err(e);
        }
    };

    let publish_report = publish(
        ctx,
        manifest,
        service,
        options.gpg_passphrase.as_deref(),
    )
    .await;

    info!(run_id = %ctx.run_id(), failed = publish_report.has_failures(), "[SYNC] Synchronisation finished");

    Ok(SynchroniseReport {
        run_id: ctx.run_id().to_string(),
        cleanup: cleanup_report,
        reconcile: reconcile_report,
        publish: publish_report,
    })
}
