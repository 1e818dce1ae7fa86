//! Package builder
//!
//! Runs an external build command against a source package in the shared
//! volume and names the resulting artifact `<src>-<6 random chars>`. Callers
//! talk to it over HTTP (see [`server`]) or in process through [`Builder::build`].

mod artifact;
mod client;
mod exec;
pub mod server;

pub use artifact::{artifact_name, sanitize, SUFFIX_LEN};
pub use client::{BuildClient, HttpBuildClient};
pub use exec::{run_build, BuildRun, ENV_DEPLOY_PKG, ENV_SRC_PKG};
pub use server::{router, serve};

use crate::cache::{CacheOptions, ServiceCache};
use crate::error::{ErrorKind, FnplaneError, FnplaneResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Command run when a request does not name one
pub const DEFAULT_BUILD_COMMAND: &str = "/build";

/// How long an issued artifact name is remembered by default
pub const ISSUED_NAME_MAX_AGE: Duration = Duration::from_secs(3600);

/// Body of `POST /`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub src_pkg_filename: String,
    /// Empty or `null` means the builder's default command
    #[serde(default, deserialize_with = "null_as_empty")]
    pub command: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of every builder response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildResponse {
    pub artifact_filename: String,
    pub build_logs: String,
}

/// A build that did not succeed, with whatever it produced before failing
#[derive(Debug)]
pub struct BuildFailure {
    pub error: FnplaneError,
    /// Empty unless a name was reserved before the failure
    pub artifact_filename: String,
    pub build_logs: String,
}

impl BuildFailure {
    fn new(error: FnplaneError, artifact_filename: String, mut build_logs: String) -> Self {
        build_logs.push_str(&format!("{}\n", error));
        Self {
            error,
            artifact_filename,
            build_logs,
        }
    }

    /// HTTP status for this failure: 400 for bad input, otherwise 500
    pub fn status(&self) -> u16 {
        match self.error.kind() {
            ErrorKind::InvalidArgument => 400,
            _ => 500,
        }
    }

    pub fn into_response(self) -> BuildResponse {
        BuildResponse {
            artifact_filename: self.artifact_filename,
            build_logs: self.build_logs,
        }
    }
}

/// Builds source packages that live in one shared volume
#[derive(Clone)]
pub struct Builder {
    shared_volume: PathBuf,
    default_command: String,
    /// Artifact names issued by this process, forgotten per the registry options
    issued: ServiceCache<String, ()>,
}

impl Builder {
    /// Create a builder over `shared_volume` that remembers issued names for
    /// [`ISSUED_NAME_MAX_AGE`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(shared_volume: impl Into<PathBuf>) -> Self {
        Self::with_registry(
            shared_volume,
            CacheOptions {
                max_age: Some(ISSUED_NAME_MAX_AGE),
                ..CacheOptions::default()
            },
        )
    }

    /// Create a builder whose issued-name registry uses `registry` options
    pub fn with_registry(shared_volume: impl Into<PathBuf>, registry: CacheOptions) -> Self {
        Self {
            shared_volume: shared_volume.into(),
            default_command: DEFAULT_BUILD_COMMAND.to_string(),
            issued: ServiceCache::with_options(registry),
        }
    }

    /// Use `command` for requests that do not name one
    pub fn with_default_command(mut self, command: impl Into<String>) -> Self {
        let command = command.into();
        if !command.is_empty() {
            self.default_command = command;
        }
        self
    }

    pub fn shared_volume(&self) -> &Path {
        &self.shared_volume
    }

    pub fn default_command(&self) -> &str {
        &self.default_command
    }

    /// Run one build to completion
    pub async fn build(&self, request: &BuildRequest) -> Result<BuildResponse, BuildFailure> {
        let src_name = sanitize(&request.src_pkg_filename)
            .map_err(|e| BuildFailure::new(e, String::new(), String::new()))?;

        let src_path = self.shared_volume.join(src_name);
        let src_exists = fs::try_exists(&src_path).await.map_err(|e| {
            BuildFailure::new(
                FnplaneError::io(format!("checking source package {}", src_path.display()), e),
                String::new(),
                String::new(),
            )
        })?;
        if !src_exists {
            return Err(BuildFailure::new(
                FnplaneError::SourceMissing(src_path),
                String::new(),
                String::new(),
            ));
        }

        let artifact = self
            .reserve_artifact(src_name)
            .await
            .map_err(|e| BuildFailure::new(e, String::new(), String::new()))?;
        let artifact_path = self.shared_volume.join(&artifact);

        let command = if request.command.is_empty() {
            self.default_command.as_str()
        } else {
            request.command.as_str()
        };
        info!(src = src_name, artifact = %artifact, command, "starting build");

        let run = run_build(command, &src_path, &artifact_path).await;
        match run.outcome {
            Ok(()) => {
                info!(artifact = %artifact, "build succeeded");
                Ok(BuildResponse {
                    artifact_filename: artifact,
                    build_logs: run.logs,
                })
            }
            Err(e) => {
                warn!(artifact = %artifact, error = %e, "build failed");
                Err(BuildFailure::new(e, artifact, run.logs))
            }
        }
    }

    /// Pick a fresh artifact name, failing closed on any collision
    async fn reserve_artifact(&self, src_name: &str) -> FnplaneResult<String> {
        let name = artifact_name(src_name, &mut rand::rng());

        if self.issued.try_insert(name.clone(), ()).await?.is_some() {
            return Err(FnplaneError::ArtifactCollision(name));
        }
        let exists = fs::try_exists(self.shared_volume.join(&name))
            .await
            .map_err(|e| FnplaneError::io(format!("checking artifact {}", name), e))?;
        if exists {
            return Err(FnplaneError::ArtifactCollision(name));
        }

        Ok(name)
    }
}

/// Create the shared volume with owner-only permissions if it does not exist
pub async fn ensure_shared_volume(path: &Path) -> FnplaneResult<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(FnplaneError::invalid(format!(
                "shared volume {} is not a directory",
                path.display()
            )))
        }
        Err(_) => {}
    }

    fs::create_dir_all(path)
        .await
        .map_err(|e| FnplaneError::io(format!("creating shared volume {}", path.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(path, perms)
            .map_err(|e| FnplaneError::io("setting shared volume permissions", e))?;
    }

    info!(path = %path.display(), "created shared volume");
    Ok(())
}

/// Write an executable shell script into `dir` and return its path
#[cfg(test)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn request(src: &str, command: &str) -> BuildRequest {
        BuildRequest {
            src_pkg_filename: src.to_string(),
            command: command.to_string(),
        }
    }

    #[test]
    fn request_wire_format() {
        let req: BuildRequest = serde_json::from_str(r#"{"srcPkgFilename":"pkg"}"#).unwrap();
        assert_eq!(req, request("pkg", ""));

        let req: BuildRequest =
            serde_json::from_str(r#"{"srcPkgFilename":"pkg","command":null}"#).unwrap();
        assert_eq!(req, request("pkg", ""));

        let resp = BuildResponse {
            artifact_filename: "pkg-abc123".to_string(),
            build_logs: "ok\n".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"artifactFilename":"pkg-abc123","buildLogs":"ok\n"}"#
        );
    }

    #[tokio::test]
    #[serial]
    async fn successful_build() {
        let volume = TempDir::new().unwrap();
        std::fs::create_dir(volume.path().join("pkg")).unwrap();
        let builder = Builder::new(volume.path());

        let resp = builder.build(&request("pkg", "/bin/true")).await.unwrap();

        assert!(resp.artifact_filename.starts_with("pkg-"));
        assert_eq!(resp.artifact_filename.len(), "pkg-".len() + SUFFIX_LEN);
        assert_eq!(resp.build_logs, "");
    }

    #[tokio::test]
    #[serial]
    async fn failed_build_keeps_reserved_name() {
        let volume = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        std::fs::create_dir(volume.path().join("pkg")).unwrap();
        let cmd = write_script(tools.path(), "fail.sh", "echo line1\necho line2\nexit 2");
        let builder = Builder::new(volume.path());

        let failure = builder.build(&request("pkg", &cmd)).await.unwrap_err();

        assert_eq!(failure.status(), 500);
        assert!(failure.artifact_filename.starts_with("pkg-"));
        let (logs, last) = failure.build_logs.split_at("line1\nline2\n".len());
        assert_eq!(logs, "line1\nline2\n");
        assert!(last.starts_with("error waiting for cmd"));
        assert!(last.ends_with('\n'));
    }

    #[tokio::test]
    #[serial]
    async fn default_command_is_used() {
        let volume = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        std::fs::create_dir(volume.path().join("pkg")).unwrap();
        let cmd = write_script(tools.path(), "default.sh", "echo default");
        let builder = Builder::new(volume.path()).with_default_command(cmd);

        let resp = builder.build(&request("pkg", "")).await.unwrap();

        assert_eq!(resp.build_logs, "default\n");
    }

    #[tokio::test]
    async fn missing_source_reserves_nothing() {
        let volume = TempDir::new().unwrap();
        let builder = Builder::new(volume.path());

        let failure = builder.build(&request("ghost", "/bin/true")).await.unwrap_err();

        assert_eq!(failure.status(), 500);
        assert!(failure.artifact_filename.is_empty());
        assert!(failure
            .build_logs
            .starts_with("could not find source package"));
        assert!(builder.issued.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn source_lookup_error_is_not_reported_missing() {
        let volume = TempDir::new().unwrap();
        std::fs::write(volume.path().join("file"), b"x").unwrap();
        let builder = Builder::new(volume.path());

        let failure = builder.build(&request("file/pkg", "/bin/true")).await.unwrap_err();

        assert_eq!(failure.error.kind(), ErrorKind::Transport);
        assert_eq!(failure.status(), 500);
        assert!(failure.build_logs.starts_with("IO error: checking source package"));
        assert!(builder.issued.is_empty().await.unwrap());
    }

    #[tokio::test]
    #[serial]
    async fn current_dir_prefix_is_accepted() {
        let volume = TempDir::new().unwrap();
        std::fs::create_dir(volume.path().join("pkg")).unwrap();
        let builder = Builder::new(volume.path());

        let resp = builder.build(&request("./pkg", "/bin/true")).await.unwrap();

        assert!(resp.artifact_filename.starts_with("pkg-"));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let volume = TempDir::new().unwrap();
        let builder = Builder::new(volume.path());

        let failure = builder.build(&request("../etc", "/bin/true")).await.unwrap_err();

        assert_eq!(failure.status(), 400);
        assert!(failure.artifact_filename.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn names_are_unique_across_builds() {
        let volume = TempDir::new().unwrap();
        std::fs::create_dir(volume.path().join("pkg")).unwrap();
        let builder = Builder::new(volume.path());

        let mut names = std::collections::HashSet::new();
        for _ in 0..20 {
            let resp = builder.build(&request("pkg", "/bin/true")).await.unwrap();
            assert!(names.insert(resp.artifact_filename));
        }
        assert_eq!(builder.issued.len().await.unwrap(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn issued_names_are_forgotten_after_max_age() {
        let volume = TempDir::new().unwrap();
        let registry = crate::config::schema::CacheConfig {
            max_age_secs: 1,
            sweep_interval_secs: 1,
            ..crate::config::schema::CacheConfig::default()
        };
        let builder = Builder::with_registry(volume.path(), registry.options());

        builder.reserve_artifact("pkg").await.unwrap();
        builder.reserve_artifact("pkg").await.unwrap();
        assert_eq!(builder.issued.len().await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(builder.issued.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn default_registry_is_bounded_by_age() {
        let volume = TempDir::new().unwrap();
        let builder = Builder::new(volume.path());

        builder.reserve_artifact("pkg").await.unwrap();
        assert_eq!(builder.issued.len().await.unwrap(), 1);
        assert_eq!(
            crate::config::schema::CacheConfig::default().options().max_age,
            Some(ISSUED_NAME_MAX_AGE)
        );
    }

    #[tokio::test]
    async fn shared_volume_is_created_private() {
        let root = TempDir::new().unwrap();
        let volume = root.path().join("packages");

        ensure_shared_volume(&volume).await.unwrap();
        ensure_shared_volume(&volume).await.unwrap();

        let meta = std::fs::metadata(&volume).unwrap();
        assert!(meta.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(meta.permissions().mode() & 0o777, 0o700);
        }
    }

    #[tokio::test]
    async fn shared_volume_must_be_a_directory() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let err = ensure_shared_volume(&file).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
