#![doc = "Bintray REST client: implements the core `PackageService` contract over HTTP."]
//
//! # Bintray client (CLI <-> Core)
//!
//! This module provides the bridge between the CLI workflow and the service abstraction in
//! [`bintray_sync_core::contract`]. [`BintrayClient`] implements [`PackageService`] against
//! the Bintray REST API with `reqwest`.
//!
//! ## Client Usage
//!
//! - Construct [`BintrayClient`] from environment variables with [`BintrayClient::new_from_env`]
//!   (`BINTRAY_USER`, `BINTRAY_KEY`, optional `BINTRAY_API_URL`), or from explicit
//!   [`BintrayDetails`] with [`BintrayClient::new`].
//! - Every request authenticates with HTTP basic auth (user + API key).
//! - Non-success statuses become errors carrying the status and the response body.
//!
//! ## Uploads
//!
//! `upload_files` makes sure the target version exists, expands the upload glob, and `PUT`s
//! each file to `/content/...` with up to `threads` requests in flight. Each file is sent with
//! its SHA-256 in `X-Checksum-Sha2`.

use std::env;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bintray_sync_core::contract::{
    PackageConfig, PackagePath, PackageService, RepositoryConfig, RepositoryPath, ServiceError,
    UploadParams, UploadSummary, VersionPath,
};
use futures::stream::{self, StreamExt};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const DEFAULT_API_URL: &str = "https://api.bintray.com";
pub const DEFAULT_LICENSE: &str = "Apache-2.0";

pub const USER_ENV: &str = "BINTRAY_USER";
pub const KEY_ENV: &str = "BINTRAY_KEY";
pub const API_URL_ENV: &str = "BINTRAY_API_URL";

/// Connection and account settings for [`BintrayClient`].
#[derive(Debug, Clone)]
pub struct BintrayDetails {
    pub api_url: String,
    pub user: String,
    pub key: String,
    /// Applied to packages created without any license.
    pub default_license: String,
}

impl BintrayDetails {
    pub fn new(user: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            user: user.into(),
            key: key.into(),
            default_license: DEFAULT_LICENSE.to_string(),
        }
    }
}

pub struct BintrayClient {
    http: reqwest::Client,
    details: BintrayDetails,
    threads: usize,
}

#[derive(Serialize)]
struct NewPackage<'a> {
    name: &'a str,
    #[serde(flatten)]
    config: &'a PackageConfig,
}

#[derive(Serialize)]
struct NewVersion<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct SignRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    passphrase: Option<String>,
}

impl BintrayClient {
    pub fn new(details: BintrayDetails, threads: usize) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bintray-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            details: BintrayDetails {
                api_url: details.api_url.trim_end_matches('/').to_string(),
                ..details
            },
            threads: threads.max(1),
        })
    }

    pub fn new_from_env(threads: usize) -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok(); // loads environment variables from .env if present
        match (env::var(USER_ENV), env::var(KEY_ENV)) {
            (Ok(user), Ok(key)) => {
                let mut details = BintrayDetails::new(user, key);
                if let Ok(api_url) = env::var(API_URL_ENV) {
                    details.api_url = api_url;
                }
                tracing::info!(
                    user = %details.user,
                    api_url = %details.api_url,
                    key_set = !details.key.is_empty(),
                    threads,
                    "Initialized BintrayClient from environment"
                );
                Self::new(details, threads)
            }
            (Err(e), _) => {
                tracing::error!(error = ?e, "{USER_ENV} missing in environment");
                Err(format!("{USER_ENV} environment variable not set: {e}").into())
            }
            (_, Err(e)) => {
                tracing::error!(error = ?e, "{KEY_ENV} missing in environment");
                Err(format!("{KEY_ENV} environment variable not set: {e}").into())
            }
        }
    }

    pub fn details(&self) -> &BintrayDetails {
        &self.details
    }

    /// Appends `segments` to the API URL, percent-encoding each one.
    fn url<I>(&self, segments: I) -> Result<Url, ServiceError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = Url::parse(&self.details.api_url)?;
        url.path_segments_mut()
            .map_err(|_| format!("API URL {:?} cannot take a path", self.details.api_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.details.user, Some(&self.details.key))
    }

    /// `GET` that maps 200 to `true` and 404 to `false`.
    async fn exists(&self, url: Url, what: &str) -> Result<bool, ServiceError> {
        let resp = self.authed(self.http.get(url)).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(resp, what).await),
        }
    }

    async fn version_exists(&self, path: &VersionPath) -> Result<bool, ServiceError> {
        let url = self.url([
            "packages",
            path.subject.as_str(),
            path.repo.as_str(),
            path.package.as_str(),
            "versions",
            path.version.as_str(),
        ])?;
        self.exists(url, "version lookup").await
    }

    async fn create_version(&self, path: &VersionPath) -> Result<(), ServiceError> {
        tracing::info!(version = %path, "Creating version");
        let resp = self
            .authed(self.http.post(self.url([
                "packages",
                path.subject.as_str(),
                path.repo.as_str(),
                path.package.as_str(),
                "versions",
            ])?))
            .json(&NewVersion {
                name: path.version.as_str(),
            })
            .send()
            .await?;
        expect_success(resp, "create version").await.map(|_| ())
    }

    async fn upload_one(
        &self,
        path: &VersionPath,
        params: &UploadParams,
        file: UploadFile,
    ) -> Result<(), ServiceError> {
        let content = tokio::fs::read(&file.local).await?;
        let checksum = format!("{:x}", Sha256::digest(&content));

        let mut segments: Vec<String> = [
            "content",
            path.subject.as_str(),
            path.repo.as_str(),
            path.package.as_str(),
            path.version.as_str(),
        ]
        .into_iter()
        .chain(file.remote.split('/'))
        .map(str::to_string)
        .collect();
        // Matrix params ride on the last segment; `;` and `=` are left unescaped.
        if let (Some(deb), Some(last)) = (params.deb.as_deref(), segments.last_mut()) {
            last.push_str(&deb_matrix_params(deb)?);
        }
        let url = self.url(&segments)?;

        tracing::debug!(local = %file.local.display(), remote = %file.remote, sha256 = %checksum, "Uploading file");
        let resp = self
            .authed(self.http.put(url))
            .query(&[
                ("publish", flag(params.publish)),
                ("override", flag(params.override_existing)),
                ("explode", flag(params.explode)),
            ])
            .header("X-Checksum-Sha2", checksum)
            .body(content)
            .send()
            .await?;
        expect_success(resp, "upload").await?;
        tracing::info!(remote = %file.remote, version = %path, "Uploaded file");
        Ok(())
    }
}

#[async_trait]
impl PackageService for BintrayClient {
    async fn repository_exists(&self, path: &RepositoryPath) -> Result<bool, ServiceError> {
        tracing::debug!(repository = %path, "Checking repository existence");
        let url = self.url(["repos", path.subject.as_str(), path.repo.as_str()])?;
        self.exists(url, "repository lookup").await
    }

    async fn create_repository(
        &self,
        path: &RepositoryPath,
        config: &RepositoryConfig,
    ) -> Result<bool, ServiceError> {
        let body = match &config.config_file {
            Some(file) => {
                let raw = tokio::fs::read_to_string(file).await.map_err(|e| {
                    format!("failed to read repository config file {}: {e}", file.display())
                })?;
                serde_json::from_str::<serde_json::Value>(&raw)?
            }
            None => serde_json::to_value(config)?,
        };

        tracing::info!(repository = %path, repo_type = %config.repo_type, "Creating repository");
        let resp = self
            .authed(
                self.http
                    .post(self.url(["repos", path.subject.as_str(), path.repo.as_str()])?),
            )
            .json(&body)
            .send()
            .await?;

        if resp.status() == StatusCode::CONFLICT {
            tracing::info!(repository = %path, "Repository already exists on the service");
            return Ok(false);
        }
        expect_success(resp, "create repository").await?;
        Ok(true)
    }

    async fn delete_repository(&self, path: &RepositoryPath) -> Result<(), ServiceError> {
        tracing::info!(repository = %path, "Deleting repository");
        let resp = self
            .authed(
                self.http
                    .delete(self.url(["repos", path.subject.as_str(), path.repo.as_str()])?),
            )
            .send()
            .await?;
        expect_success(resp, "delete repository").await.map(|_| ())
    }

    async fn package_exists(&self, path: &PackagePath) -> Result<bool, ServiceError> {
        tracing::debug!(package = %path, "Checking package existence");
        let url = self.url([
            "packages",
            path.subject.as_str(),
            path.repo.as_str(),
            path.package.as_str(),
        ])?;
        self.exists(url, "package lookup").await
    }

    async fn create_package(
        &self,
        path: &PackagePath,
        config: &PackageConfig,
    ) -> Result<(), ServiceError> {
        let licensed;
        let config = if config.licenses.is_empty() && config.custom_licenses.is_empty() {
            licensed = PackageConfig {
                licenses: vec![self.details.default_license.clone()],
                ..config.clone()
            };
            &licensed
        } else {
            config
        };

        tracing::info!(package = %path, licenses = ?config.licenses, "Creating package");
        let resp = self
            .authed(
                self.http
                    .post(self.url(["packages", path.subject.as_str(), path.repo.as_str()])?),
            )
            .json(&NewPackage {
                name: path.package.as_str(),
                config,
            })
            .send()
            .await?;
        expect_success(resp, "create package").await.map(|_| ())
    }

    async fn delete_package(&self, path: &PackagePath) -> Result<(), ServiceError> {
        tracing::info!(package = %path, "Deleting package");
        let resp = self
            .authed(self.http.delete(self.url([
                "packages",
                path.subject.as_str(),
                path.repo.as_str(),
                path.package.as_str(),
            ])?))
            .send()
            .await?;
        expect_success(resp, "delete package").await.map(|_| ())
    }

    async fn show_package(&self, path: &PackagePath) -> Result<serde_json::Value, ServiceError> {
        let resp = self
            .authed(self.http.get(self.url([
                "packages",
                path.subject.as_str(),
                path.repo.as_str(),
                path.package.as_str(),
            ])?))
            .send()
            .await?;
        let resp = expect_success(resp, "show package").await?;
        Ok(resp.json::<serde_json::Value>().await?)
    }

    async fn upload_files(
        &self,
        path: &VersionPath,
        params: &UploadParams,
    ) -> Result<UploadSummary, ServiceError> {
        let files = expand_upload(params)?;
        if files.is_empty() {
            tracing::error!(pattern = %params.pattern, "Upload pattern matched no files");
            return Err(format!("upload pattern {:?} matched no files", params.pattern).into());
        }

        if !self.version_exists(path).await? {
            self.create_version(path).await?;
        }

        tracing::info!(version = %path, files = files.len(), threads = self.threads, "Uploading files");
        let results: Vec<(String, Result<(), ServiceError>)> = stream::iter(files)
            .map(move |file| async move {
                let remote = file.remote.clone();
                (remote, self.upload_one(path, params, file).await)
            })
            .buffer_unordered(self.threads)
            .collect()
            .await;

        let mut summary = UploadSummary::default();
        for (remote, result) in results {
            match result {
                Ok(()) => summary.uploaded += 1,
                Err(e) => {
                    tracing::error!(remote = %remote, error = %e, "File upload failed");
                    summary.failed += 1;
                }
            }
        }
        tracing::info!(
            version = %path,
            uploaded = summary.uploaded,
            failed = summary.failed,
            "Upload finished"
        );
        Ok(summary)
    }

    async fn gpg_sign_version(
        &self,
        path: &VersionPath,
        passphrase: Option<String>,
    ) -> Result<(), ServiceError> {
        tracing::info!(version = %path, passphrase_set = passphrase.is_some(), "Signing version");
        let resp = self
            .authed(self.http.post(self.url([
                "gpg",
                path.subject.as_str(),
                path.repo.as_str(),
                path.package.as_str(),
                "versions",
                path.version.as_str(),
            ])?))
            .json(&SignRequest { passphrase })
            .send()
            .await?;
        expect_success(resp, "gpg sign").await.map(|_| ())
    }

    async fn publish_version(&self, path: &VersionPath) -> Result<(), ServiceError> {
        tracing::info!(version = %path, "Publishing version");
        let resp = self
            .authed(self.http.post(self.url([
                "content",
                path.subject.as_str(),
                path.repo.as_str(),
                path.package.as_str(),
                path.version.as_str(),
                "publish",
            ])?))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        expect_success(resp, "publish").await.map(|_| ())
    }

    async fn calc_metadata(&self, path: &VersionPath) -> Result<bool, ServiceError> {
        tracing::info!(version = %path, "Scheduling metadata calculation");
        let resp = self
            .authed(
                self.http
                    .post(self.url([
                        "calc_metadata",
                        path.subject.as_str(),
                        path.repo.as_str(),
                    ])?),
            )
            .send()
            .await?;
        // Any 2xx means the calculation was queued; Bintray answers 202 as a rule.
        expect_success(resp, "calc metadata").await?;
        Ok(true)
    }
}

async fn expect_success(resp: Response, what: &str) -> Result<Response, ServiceError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(status_error(resp, what).await)
    }
}

async fn status_error(resp: Response, what: &str) -> ServiceError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    tracing::error!(%status, body = %body, "{what} failed");
    format!("{what} failed with {status}: {body}").into()
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Turns `distribution/component/architecture` into Bintray matrix parameters.
pub fn deb_matrix_params(deb: &str) -> Result<String, ServiceError> {
    let parts: Vec<&str> = deb.split('/').collect();
    match parts.as_slice() {
        [distribution, component, architecture]
            if !distribution.is_empty() && !component.is_empty() && !architecture.is_empty() =>
        {
            Ok(format!(
                ";deb_distribution={distribution};deb_component={component};deb_architecture={architecture}"
            ))
        }
        _ => Err(format!(
            "invalid deb coordinates {deb:?}, expected distribution/component/architecture"
        )
        .into()),
    }
}

/// A local file and the remote path it is uploaded to, relative to the version root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub local: PathBuf,
    pub remote: String,
}

/// Expands the upload pattern into the files to send, sorted by local path.
pub fn expand_upload(params: &UploadParams) -> Result<Vec<UploadFile>, ServiceError> {
    let root = upload_root(&params.pattern);
    let depth = pattern_depth(&params.pattern);
    let mut files = Vec::new();

    for entry in glob::glob(&params.pattern)? {
        let local = entry?;
        if !local.is_file() {
            continue;
        }
        let relative = local.strip_prefix(&root).unwrap_or(&local).to_path_buf();
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if !params.recursive && segments.len() > depth {
            continue;
        }

        let name = if params.flat {
            segments.last().cloned().unwrap_or_default()
        } else {
            segments.join("/")
        };
        if name.is_empty() {
            continue;
        }

        let target = params.target_path.trim_matches('/');
        let remote = if target.is_empty() {
            name
        } else {
            format!("{target}/{name}")
        };
        files.push(UploadFile { local, remote });
    }

    files.sort_by(|a, b| a.local.cmp(&b.local));
    Ok(files)
}

/// The leading part of a glob pattern that contains no wildcard.
fn upload_root(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut root = PathBuf::new();
    let mut has_wildcard = false;
    for component in path.components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) {
            has_wildcard = true;
            break;
        }
        root.push(component);
    }
    if !has_wildcard {
        // A literal file path: its parent is the root.
        return root.parent().map(Path::to_path_buf).unwrap_or_default();
    }
    root
}

/// How many levels below the upload root the pattern names explicitly; `**` counts as none.
fn pattern_depth(pattern: &str) -> usize {
    let root_len = upload_root(pattern).components().count();
    Path::new(pattern)
        .components()
        .skip(root_len)
        .filter(|c| c.as_os_str() != "**")
        .count()
}
