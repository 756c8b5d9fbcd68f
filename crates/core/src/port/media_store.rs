// Media store port: durable asset storage and local staging.

use crate::domain::Post;
use crate::error::Result;
use crate::port::destination::StagedAsset;
use async_trait::async_trait;
use std::path::Path;

/// Moves assets between durable storage and the per-job local staging
/// directory, and cleans both up afterwards.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Download/copy the post's asset into `staging_dir` (namespaced by post
    /// id by the caller, so concurrent jobs never collide).
    async fn materialize(&self, post: &Post, staging_dir: &Path) -> Result<StagedAsset>;

    /// Remove the local staging directory. Idempotent: a missing directory
    /// is success.
    async fn remove_staged(&self, staging_dir: &Path) -> Result<()>;

    /// Remove the staged copy in durable storage. Best-effort and
    /// idempotent; callers log failures and move on.
    async fn remove_remote(&self, post: &Post) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use crate::domain::Asset;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Media store that fabricates staged assets without touching the
    /// filesystem.
    #[derive(Default)]
    pub struct FakeMediaStore {
        removals: AtomicUsize,
    }

    impl FakeMediaStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn removals(&self) -> usize {
            self.removals.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaStore for FakeMediaStore {
        async fn materialize(&self, post: &Post, staging_dir: &Path) -> Result<StagedAsset> {
            let (kind, paths, refs): (_, Vec<PathBuf>, Vec<String>) = match &post.asset {
                Asset::Video { path } => (
                    post.asset.kind(),
                    vec![staging_dir.join("source.mp4")],
                    vec![path.clone()],
                ),
                Asset::PhotoSet { paths } => (
                    post.asset.kind(),
                    paths
                        .iter()
                        .enumerate()
                        .map(|(i, _)| staging_dir.join(format!("photo-{}.jpg", i)))
                        .collect(),
                    paths.clone(),
                ),
            };
            Ok(StagedAsset {
                kind,
                paths,
                source_refs: refs,
                size_bytes: 1024,
                staging_dir: staging_dir.to_path_buf(),
            })
        }

        async fn remove_staged(&self, _staging_dir: &Path) -> Result<()> {
            self.removals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove_remote(&self, _post: &Post) -> Result<()> {
            Ok(())
        }
    }
}
