//! # contract: the remote package service interface
//!
//! This module defines the single trait ([`PackageService`]) through which every pass
//! talks to the package-hosting service, together with the plain data types that flow
//! through it: entity paths and the configuration blobs carried by the manifest.
//!
//! ## Interface & Extensibility
//! - Implement [`PackageService`] to target a real REST API (see the `bintray-sync` crate)
//!   or an in-memory double.
//! - All methods are async and return boxed errors ([`ServiceError`]).
//! - Configuration blobs are opaque to the passes: they are handed to the service untouched.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockPackageService` is exported behind the
//!   `test-export-mocks` feature so downstream crates can script the remote side.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mockall::{automock, predicate::*};

/// Error type returned by every [`PackageService`] operation.
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// Identifies a repository: `subject/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RepositoryPath {
    pub subject: String,
    pub repo: String,
}

impl RepositoryPath {
    pub fn new(subject: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            repo: repo.into(),
        }
    }

    /// Path of a package owned by this repository.
    pub fn package(&self, package: impl Into<String>) -> PackagePath {
        PackagePath {
            subject: self.subject.clone(),
            repo: self.repo.clone(),
            package: package.into(),
        }
    }
}

impl fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.repo)
    }
}

/// Identifies a package: `subject/repo/package`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackagePath {
    pub subject: String,
    pub repo: String,
    pub package: String,
}

impl PackagePath {
    pub fn repository(&self) -> RepositoryPath {
        RepositoryPath::new(self.subject.clone(), self.repo.clone())
    }

    pub fn version(&self, version: impl Into<String>) -> VersionPath {
        VersionPath {
            subject: self.subject.clone(),
            repo: self.repo.clone(),
            package: self.package.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subject, self.repo, self.package)
    }
}

/// Identifies a package version: `subject/repo/package/version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VersionPath {
    pub subject: String,
    pub repo: String,
    pub package: String,
    pub version: String,
}

impl VersionPath {
    pub fn package(&self) -> PackagePath {
        PackagePath {
            subject: self.subject.clone(),
            repo: self.repo.clone(),
            package: self.package.clone(),
        }
    }
}

impl fmt::Display for VersionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.subject, self.repo, self.package, self.version
        )
    }
}

fn default_repo_type() -> String {
    "generic".to_string()
}

fn default_true() -> bool {
    true
}

/// Repository settings sent on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Repository flavour (generic, maven, debian, rpm, ...).
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub gpg_sign_metadata: bool,
    #[serde(default)]
    pub gpg_sign_files: bool,
    #[serde(default)]
    pub gpg_use_owner_key: bool,
    /// JSON file whose contents replace the fields above as the creation body.
    #[serde(default, skip_serializing)]
    pub config_file: Option<PathBuf>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
            private: false,
            desc: None,
            labels: Vec::new(),
            gpg_sign_metadata: false,
            gpg_sign_files: false,
            gpg_use_owner_key: false,
            config_file: None,
        }
    }
}

/// Package settings sent on creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Left empty, the service implementation applies its default license.
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_licenses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_tracker_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_release_notes_file: Option<String>,
    #[serde(default)]
    pub public_download_numbers: bool,
    #[serde(default)]
    pub public_stats: bool,
}

/// Describes which local files go into which package version, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadParams {
    pub version: String,
    /// Glob selecting local files.
    pub pattern: String,
    /// Remote directory the matched files land in.
    #[serde(default)]
    pub target_path: String,
    #[serde(default = "default_true")]
    pub flat: bool,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub publish: bool,
    #[serde(rename = "override", default)]
    pub override_existing: bool,
    #[serde(default)]
    pub explode: bool,
    /// Debian coordinates as `distribution/component/architecture`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deb: Option<String>,
}

/// Result of an upload: how many files made it and how many did not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
}

/// Trait for querying and mutating repositories, packages and versions on the remote
/// package service. The implementor owns transport, authentication and file handling.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PackageService: Send + Sync {
    /// Whether the repository exists.
    async fn repository_exists(&self, path: &RepositoryPath) -> Result<bool, ServiceError>;

    /// Create a repository. `Ok(false)` means the service reported it as already present.
    async fn create_repository(
        &self,
        path: &RepositoryPath,
        config: &RepositoryConfig,
    ) -> Result<bool, ServiceError>;

    async fn delete_repository(&self, path: &RepositoryPath) -> Result<(), ServiceError>;

    /// Whether the package exists.
    async fn package_exists(&self, path: &PackagePath) -> Result<bool, ServiceError>;

    async fn create_package(
        &self,
        path: &PackagePath,
        config: &PackageConfig,
    ) -> Result<(), ServiceError>;

    async fn delete_package(&self, path: &PackagePath) -> Result<(), ServiceError>;

    /// Fetch the package description as the service returns it.
    async fn show_package(&self, path: &PackagePath) -> Result<serde_json::Value, ServiceError>;

    /// Upload the files selected by `params` into the version, creating the version if needed.
    async fn upload_files(
        &self,
        path: &VersionPath,
        params: &UploadParams,
    ) -> Result<UploadSummary, ServiceError>;

    async fn gpg_sign_version(
        &self,
        path: &VersionPath,
        passphrase: Option<String>,
    ) -> Result<(), ServiceError>;

    async fn publish_version(&self, path: &VersionPath) -> Result<(), ServiceError>;

    /// Schedule metadata calculation for the repository owning the version.
    /// Returns whether the service accepted the request.
    async fn calc_metadata(&self, path: &VersionPath) -> Result<bool, ServiceError>;
}
