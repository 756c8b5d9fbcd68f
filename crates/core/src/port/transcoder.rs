// Transcoder port (watermarking).

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Media mutation collaborator. The only operation the engine needs is the
/// watermark pass applied to free-tier videos before fan-out.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Burn the watermark into `input`, writing to `output`. Returns the
    /// path to use for upload (implementations may fall back to `input`
    /// when the tool fails, mirroring a best-effort watermark policy).
    async fn watermark(&self, input: &Path, output: &Path) -> Result<PathBuf>;
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts watermark invocations; returns the requested output path.
    #[derive(Default)]
    pub struct RecordingTranscoder {
        calls: AtomicUsize,
    }

    impl RecordingTranscoder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transcoder for RecordingTranscoder {
        async fn watermark(&self, _input: &Path, output: &Path) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(output.to_path_buf())
        }
    }
}
