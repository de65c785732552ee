//! Workspace packaging.

use super::error::BuildError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Path of the artifact for `workspace`: a sibling `<name>.tar.gz`.
pub fn artifact_path(workspace: &Path) -> Result<PathBuf, BuildError> {
    let name = workspace
        .file_name()
        .ok_or_else(|| BuildError::Packaging(format!("{} has no name", workspace.display())))?;
    let parent = workspace.parent().unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!("{}.tar.gz", name.to_string_lossy())))
}

/// Writes the workspace into a gzipped tarball next to it.
pub async fn package_workspace(workspace: &Path) -> Result<PathBuf, BuildError> {
    let target = artifact_path(workspace)?;
    let source = workspace.to_path_buf();
    let out = target.clone();

    tokio::task::spawn_blocking(move || -> Result<(), BuildError> {
        let file = File::create(&out)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut archive = tar::Builder::new(encoder);
        archive.append_dir_all(".", &source)?;
        archive.into_inner()?.finish()?;
        Ok(())
    })
    .await
    .map_err(|e| BuildError::Packaging(e.to_string()))??;

    Ok(target)
}
