// Filesystem-backed media store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use unipost_core::domain::{Asset, Post};
use unipost_core::error::{AppError, Result};
use unipost_core::port::{MediaStore, StagedAsset};

/// Durable asset storage rooted at a local directory. Asset refs stored on
/// posts are paths relative to this root; `materialize` copies them into the
/// per-job staging directory so the pipeline never mutates the original.
pub struct FsMediaStore {
    media_root: PathBuf,
}

impl FsMediaStore {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        // Refs stay inside the media root; reject traversal outright.
        if reference.split('/').any(|part| part == "..") {
            return Err(AppError::Media(format!(
                "asset ref escapes the media root: {}",
                reference
            )));
        }
        Ok(self.media_root.join(reference))
    }

    async fn copy_in(&self, reference: &str, dest: &Path) -> Result<u64> {
        let source = self.resolve(reference)?;
        fs::copy(&source, dest).await.map_err(|e| {
            AppError::Media(format!(
                "failed to stage {}: {}",
                source.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn materialize(&self, post: &Post, staging_dir: &Path) -> Result<StagedAsset> {
        fs::create_dir_all(staging_dir).await?;

        let (paths, refs, size_bytes) = match &post.asset {
            Asset::Video { path } => {
                let dest = staging_dir.join("source.mp4");
                let size = self.copy_in(path, &dest).await?;
                (vec![dest], vec![path.clone()], size)
            }
            Asset::PhotoSet { paths: refs } => {
                let mut staged = Vec::with_capacity(refs.len());
                let mut total = 0u64;
                for (index, reference) in refs.iter().enumerate() {
                    let dest = staging_dir.join(format!("photo-{}.jpg", index));
                    total += self.copy_in(reference, &dest).await?;
                    staged.push(dest);
                }
                (staged, refs.clone(), total)
            }
        };

        debug!(post_id = %post.id, size_bytes, files = paths.len(), "Staged asset locally");

        Ok(StagedAsset {
            kind: post.asset.kind(),
            paths,
            source_refs: refs,
            size_bytes,
            staging_dir: staging_dir.to_path_buf(),
        })
    }

    async fn remove_staged(&self, staging_dir: &Path) -> Result<()> {
        match fs::remove_dir_all(staging_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Media(format!(
                "failed to remove staging dir {}: {}",
                staging_dir.display(),
                e
            ))),
        }
    }

    async fn remove_remote(&self, post: &Post) -> Result<()> {
        for reference in post.asset.refs() {
            let path = self.resolve(reference)?;
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove published asset");
                }
            }
        }
        Ok(())
    }
}
