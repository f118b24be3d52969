//! Desired-state manifest: repositories and their packages, validated once and then read-only.
//!
//! Build [`Repository`] values with [`Repository::new`] and [`Repository::with_package`],
//! then freeze them with [`Manifest::new`], which rejects empty identifiers and
//! colliding repository or package keys.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info};

use crate::contract::{
    PackageConfig, PackagePath, RepositoryConfig, RepositoryPath, UploadParams, VersionPath,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("repository #{index} has an empty {field}")]
    EmptyRepositoryField { index: usize, field: &'static str },

    #[error("package #{index} of repository {repository} has an empty name")]
    EmptyPackageName { repository: String, index: usize },

    #[error("package {package} has an empty upload version")]
    EmptyVersion { package: String },

    #[error("repository {0} is declared more than once")]
    DuplicateRepository(String),

    #[error("package {0} is declared more than once")]
    DuplicatePackage(String),
}

/// A package entry, keyed by its owning repository plus its own name.
#[derive(Debug, Clone)]
pub struct Package {
    path: PackagePath,
    config: PackageConfig,
    upload: UploadParams,
}

impl Package {
    pub fn path(&self) -> &PackagePath {
        &self.path
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    pub fn upload(&self) -> &UploadParams {
        &self.upload
    }

    /// The version the upload descriptor targets.
    pub fn version_path(&self) -> VersionPath {
        self.path.version(self.upload.version.clone())
    }
}

/// A repository entry with its packages in declaration order.
#[derive(Debug, Clone)]
pub struct Repository {
    path: RepositoryPath,
    config: RepositoryConfig,
    packages: Vec<Package>,
}

impl Repository {
    pub fn new(
        subject: impl Into<String>,
        name: impl Into<String>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            path: RepositoryPath::new(subject, name),
            config,
            packages: Vec::new(),
        }
    }

    pub fn with_package(
        mut self,
        name: impl Into<String>,
        config: PackageConfig,
        upload: UploadParams,
    ) -> Self {
        self.packages.push(Package {
            path: self.path.package(name),
            config,
            upload,
        });
        self
    }

    pub fn path(&self) -> &RepositoryPath {
        &self.path
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }
}

/// Ordered, validated list of repositories.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    repositories: Vec<Repository>,
}

impl Manifest {
    pub fn new(repositories: Vec<Repository>) -> Result<Self, ManifestError> {
        let mut repo_keys = HashSet::new();
        let mut package_keys = HashSet::new();

        for (index, repo) in repositories.iter().enumerate() {
            if repo.path.subject.trim().is_empty() {
                return Err(ManifestError::EmptyRepositoryField {
                    index,
                    field: "subject",
                });
            }
            if repo.path.repo.trim().is_empty() {
                return Err(ManifestError::EmptyRepositoryField {
                    index,
                    field: "name",
                });
            }
            if !repo_keys.insert(repo.path.clone()) {
                return Err(ManifestError::DuplicateRepository(repo.path.to_string()));
            }

            for (pkg_index, package) in repo.packages.iter().enumerate() {
                if package.path.package.trim().is_empty() {
                    return Err(ManifestError::EmptyPackageName {
                        repository: repo.path.to_string(),
                        index: pkg_index,
                    });
                }
                if package.upload.version.trim().is_empty() {
                    return Err(ManifestError::EmptyVersion {
                        package: package.path.to_string(),
                    });
                }
                if !package_keys.insert(package.path.clone()) {
                    return Err(ManifestError::DuplicatePackage(package.path.to_string()));
                }
            }
        }

        Ok(Self { repositories })
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Every package, in manifest order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.repositories.iter().flat_map(|r| r.packages.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn trace_loaded(&self) {
        info!(
            repositories = self.repositories.len(),
            packages = self.packages().count(),
            "Loaded Manifest"
        );
        debug!(?self, "Manifest loaded (full debug)");
    }
}
