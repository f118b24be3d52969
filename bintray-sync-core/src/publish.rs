//! Publish pass: upload, sign, publish, schedule metadata and show each package version.
//!
//! Every step of every package is attempted; a failed step is logged and recorded in the
//! package's [`PublishOutcome`] and the pass moves on. Callers decide what a failure
//! means for the exit status via [`PublishReport::has_failures`].

use serde::Serialize;
use tracing::{debug, error, info, Instrument};

use crate::context::RunContext;
use crate::contract::{PackageService, ServiceError, UploadSummary, VersionPath};
use crate::manifest::{Manifest, Package};

/// Result of one step for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Skipped,
    Failed { error: String },
}

impl StepStatus {
    fn failed(e: impl std::fmt::Display) -> Self {
        StepStatus::Failed {
            error: e.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub version: VersionPath,
    pub upload: StepStatus,
    pub files: UploadSummary,
    pub sign: StepStatus,
    pub publish: StepStatus,
    pub metadata: StepStatus,
    pub show: StepStatus,
    /// Package description returned by the service, when the show step succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PublishOutcome {
    pub fn has_failures(&self) -> bool {
        [
            &self.upload,
            &self.sign,
            &self.publish,
            &self.metadata,
            &self.show,
        ]
        .iter()
        .any(|s| s.is_failed())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
    pub packages: Vec<PublishOutcome>,
}

impl PublishReport {
    pub fn has_failures(&self) -> bool {
        self.packages.iter().any(PublishOutcome::has_failures)
    }
}

pub async fn publish<S>(
    ctx: &RunContext,
    manifest: &Manifest,
    service: &S,
    gpg_passphrase: Option<&str>,
) -> PublishReport
where
    S: PackageService + ?Sized,
{
    async {
        let mut report = PublishReport::default();
        for package in manifest.packages() {
            report
                .packages
                .push(publish_package(package, service, gpg_passphrase).await);
        }
        info!(
            packages = report.packages.len(),
            failed = report.packages.iter().filter(|p| p.has_failures()).count(),
            "[PUBLISH] Publish pass complete"
        );
        report
    }
    .instrument(ctx.pass_span("publish"))
    .await
}

async fn publish_package<S>(
    package: &Package,
    service: &S,
    gpg_passphrase: Option<&str>,
) -> PublishOutcome
where
    S: PackageService + ?Sized,
{
    let version = package.version_path();
    let params = package.upload();

    info!(version = %version, publish = params.publish, "[PUBLISH][UPLOAD] Uploading files");
    let (upload, files) = match service.upload_files(&version, params).await {
        Ok(summary) if summary.failed > 0 => {
            error!(version = %version, uploaded = summary.uploaded, failed = summary.failed, "[PUBLISH][ERROR][UPLOAD] Some files failed to upload");
            (
                StepStatus::failed(format!("{} file(s) failed to upload", summary.failed)),
                summary,
            )
        }
        Ok(summary) => {
            info!(version = %version, uploaded = summary.uploaded, "[PUBLISH][UPLOAD] Upload succeeded");
            (StepStatus::Succeeded, summary)
        }
        Err(e) => (
            step_failed(&version, "upload", e),
            UploadSummary::default(),
        ),
    };

    info!(version = %version, "[PUBLISH][SIGN] Signing version files");
    let sign = match service
        .gpg_sign_version(&version, gpg_passphrase.map(str::to_owned))
        .await
    {
        Ok(()) => StepStatus::Succeeded,
        Err(e) => step_failed(&version, "sign", e),
    };

    let publish = if params.publish {
        info!(version = %version, "[PUBLISH] Publishing version");
        match service.publish_version(&version).await {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => step_failed(&version, "publish", e),
        }
    } else {
        debug!(version = %version, "[PUBLISH] Publish disabled for package, skipping");
        StepStatus::Skipped
    };

    info!(version = %version, "[PUBLISH][METADATA] Scheduling metadata calculation");
    let metadata = match service.calc_metadata(&version).await {
        Ok(true) => StepStatus::Succeeded,
        Ok(false) => {
            error!(version = %version, "[PUBLISH][ERROR][METADATA] Metadata calculation was not scheduled");
            StepStatus::failed("metadata calculation was not scheduled")
        }
        Err(e) => step_failed(&version, "metadata", e),
    };

    let package_path = version.package();
    let (show, details) = match service.show_package(&package_path).await {
        Ok(details) => {
            info!(package = %package_path, details = %details, "[PUBLISH][SHOW] Package details");
            (StepStatus::Succeeded, Some(details))
        }
        Err(e) => (step_failed(&version, "show", e), None),
    };

    PublishOutcome {
        version,
        upload,
        files,
        sign,
        publish,
        metadata,
        show,
        details,
    }
}

fn step_failed(version: &VersionPath, step: &'static str, e: ServiceError) -> StepStatus {
    error!(version = %version, step, error = %e, "[PUBLISH][ERROR] Step failed");
    StepStatus::failed(e)
}
