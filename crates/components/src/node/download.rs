//! Artifact download and unpacking
//!
//! Artifacts are laid out per component as
//! `<source>/<kind>/<version>/<arch>/{configs.tar.gz,images.tar.gz,charts.tgz}`.
//! Fetching them onto the node is handled outside this crate; the
//! [`LocalArtifactStore`] serves artifacts already staged on the node.

use crate::constants::NodePaths;
use crate::error::ComponentError;
use crate::fsutil::remove_file_if_exists;
use crate::node::command::CommandRunner;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Config bundle unpacked onto the node root
pub const CONFIGS_ARCHIVE: &str = "configs.tar.gz";

/// Image bundle imported into the container runtime
pub const IMAGES_ARCHIVE: &str = "images.tar.gz";

/// Packaged Helm chart
pub const CHART_ARCHIVE: &str = "charts.tgz";

/// Creates per-component artifact handles
pub trait Downloader: Send + Sync {
    /// Handle on the artifacts of one component version
    fn instance(
        &self,
        kind: &str,
        version: &str,
        arch: &str,
        online: bool,
        dry_run: bool,
    ) -> Result<Box<dyn ArtifactInstance>, ComponentError>;
}

/// Artifacts of one component version
#[async_trait::async_trait]
pub trait ArtifactInstance: Send + Sync {
    /// Fetch the config bundle and unpack it onto the node
    async fn download_and_unpack_configs(&self) -> Result<PathBuf, ComponentError>;

    /// Remove files unpacked from the config bundle
    async fn remove_configs(&self) -> Result<(), ComponentError>;

    /// Fetch the image bundle, returning its local path
    async fn download_images(&self) -> Result<PathBuf, ComponentError>;

    /// Remove the local image bundle
    async fn remove_images(&self) -> Result<(), ComponentError>;

    /// Fetch the packaged chart, returning its local path
    async fn download_chart(&self) -> Result<PathBuf, ComponentError>;

    /// Remove the local chart
    async fn remove_chart(&self) -> Result<(), ComponentError>;
}

/// Serves artifacts pre-staged under a local directory
#[derive(Clone)]
pub struct LocalArtifactStore {
    source_dir: PathBuf,
    paths: NodePaths,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for LocalArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalArtifactStore")
            .field("source_dir", &self.source_dir)
            .finish_non_exhaustive()
    }
}

impl LocalArtifactStore {
    /// Store reading from `source_dir` and caching under `paths`
    pub fn new(source_dir: PathBuf, paths: NodePaths, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            source_dir,
            paths,
            runner,
        }
    }
}

impl Downloader for LocalArtifactStore {
    fn instance(
        &self,
        kind: &str,
        version: &str,
        arch: &str,
        online: bool,
        dry_run: bool,
    ) -> Result<Box<dyn ArtifactInstance>, ComponentError> {
        if kind.is_empty() || version.is_empty() {
            return Err(ComponentError::Download(format!(
                "artifact kind and version are required (kind '{}', version '{}')",
                kind, version
            )));
        }
        Ok(Box::new(LocalArtifact {
            label: format!("{kind} {version}"),
            source: self.source_dir.join(kind).join(version).join(arch),
            cache: self.paths.artifact_dir(kind, version),
            install_root: self.paths.install_root.clone(),
            runner: Arc::clone(&self.runner),
            online,
            dry_run,
        }))
    }
}

struct LocalArtifact {
    label: String,
    source: PathBuf,
    cache: PathBuf,
    install_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    online: bool,
    dry_run: bool,
}

impl LocalArtifact {
    async fn stage(&self, file: &str) -> Result<PathBuf, ComponentError> {
        let src = self.source.join(file);
        let dst = self.cache.join(file);
        if self.dry_run {
            debug!("dry run: stage {} to {}", src.display(), dst.display());
            return Ok(dst);
        }
        if !tokio::fs::try_exists(&src).await.unwrap_or(false) {
            return Err(ComponentError::Download(format!(
                "{} {} is not staged at {} (online: {})",
                self.label,
                file,
                src.display(),
                self.online
            )));
        }
        tokio::fs::create_dir_all(&self.cache)
            .await
            .map_err(|e| ComponentError::io(&self.cache, e))?;
        tokio::fs::copy(&src, &dst)
            .await
            .map_err(|e| ComponentError::io(&dst, e))?;
        debug!("Staged {} {} at {}", self.label, file, dst.display());
        Ok(dst)
    }

    async fn unstage(&self, file: &str) -> Result<(), ComponentError> {
        let path = self.cache.join(file);
        if self.dry_run {
            debug!("dry run: remove {}", path.display());
            return Ok(());
        }
        remove_file_if_exists(&path).await
    }
}

#[async_trait::async_trait]
impl ArtifactInstance for LocalArtifact {
    async fn download_and_unpack_configs(&self) -> Result<PathBuf, ComponentError> {
        let archive = self.stage(CONFIGS_ARCHIVE).await?;
        let archive_arg = archive.to_string_lossy().into_owned();
        let root_arg = self.install_root.to_string_lossy().into_owned();
        self.runner
            .run(self.dry_run, "tar", &["-xzf", archive_arg.as_str(), "-C", root_arg.as_str()])
            .await
            .map_err(|e| ComponentError::Download(format!("unpack {} configs: {}", self.label, e)))?;
        Ok(archive)
    }

    async fn remove_configs(&self) -> Result<(), ComponentError> {
        let archive = self.cache.join(CONFIGS_ARCHIVE);
        if self.dry_run || !tokio::fs::try_exists(&archive).await.unwrap_or(false) {
            return Ok(());
        }
        let archive_arg = archive.to_string_lossy().into_owned();
        let listing = self.runner.run(false, "tar", &["-tzf", archive_arg.as_str()]).await?;
        for entry in listing.stdout.lines().filter(|l| !l.is_empty() && !l.ends_with('/')) {
            let path = self.install_root.join(entry.trim_start_matches("./"));
            if let Err(e) = remove_file_if_exists(&path).await {
                warn!("Failed to remove {} file {}: {}", self.label, path.display(), e);
            }
        }
        remove_file_if_exists(&archive).await
    }

    async fn download_images(&self) -> Result<PathBuf, ComponentError> {
        self.stage(IMAGES_ARCHIVE).await
    }

    async fn remove_images(&self) -> Result<(), ComponentError> {
        self.unstage(IMAGES_ARCHIVE).await
    }

    async fn download_chart(&self) -> Result<PathBuf, ComponentError> {
        self.stage(CHART_ARCHIVE).await
    }

    async fn remove_chart(&self) -> Result<(), ComponentError> {
        self.unstage(CHART_ARCHIVE).await
    }
}
