// ffmpeg-based watermark pass.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};
use unipost_core::error::Result;
use unipost_core::port::Transcoder;

/// Upper bound on a single watermark run. Long-form video re-encodes can be
/// slow, but anything beyond this is a stuck process.
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(600);

/// Burns the brand watermark into videos via an external ffmpeg binary.
///
/// The pass is best-effort: when ffmpeg is missing, exits non-zero, or times
/// out, the original input path is returned and the job proceeds without the
/// watermark.
pub struct FfmpegTranscoder {
    ffmpeg_bin: String,
    logo_path: Option<PathBuf>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_bin: impl Into<String>, logo_path: Option<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            logo_path,
        }
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-i".to_string(), path_arg(input)];

        match &self.logo_path {
            Some(logo) => {
                args.push("-i".to_string());
                args.push(path_arg(logo));
                args.push("-filter_complex".to_string());
                args.push(
                    "[1:v]scale=150:-1[logo];\
                     [0:v][logo]overlay=W-w-20:H-h-60[marked];\
                     [marked]drawtext=text='UniPost':fontcolor=white@0.7:fontsize=24:x=W-tw-20:y=H-th-24"
                        .to_string(),
                );
            }
            None => {
                args.push("-vf".to_string());
                args.push(
                    "drawtext=text='UniPost':fontcolor=white@0.7:fontsize=24:x=W-tw-20:y=H-th-24"
                        .to_string(),
                );
            }
        }

        args.extend(
            [
                "-c:v",
                "libx264",
                "-crf",
                "23",
                "-preset",
                "fast",
                "-c:a",
                "copy",
                "-movflags",
                "+faststart",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(path_arg(output));
        args
    }

    async fn run(&self, input: &Path, output: &Path) -> std::result::Result<(), String> {
        let args = self.build_args(input, output);

        let child = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", self.ffmpeg_bin, e))?;

        let output = timeout(TRANSCODE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| format!("transcode exceeded {:?}", TRANSCODE_TIMEOUT))?
            .map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // ffmpeg puts the actionable error at the end of stderr.
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join(" | ");
            Err(format!("ffmpeg exited with {}: {}", output.status, tail))
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn watermark(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        info!(input = %input.display(), output = %output.display(), "Applying watermark");

        match self.run(input, output).await {
            Ok(()) => Ok(output.to_path_buf()),
            Err(reason) => {
                warn!(
                    input = %input.display(),
                    %reason,
                    "Watermark pass failed, uploading unmarked video"
                );
                Ok(input.to_path_buf())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_include_overlay_when_a_logo_is_configured() {
        let transcoder = FfmpegTranscoder::new("ffmpeg", Some(PathBuf::from("/opt/logo.png")));
        let args = transcoder.build_args(Path::new("/in.mp4"), Path::new("/out.mp4"));

        assert!(args.iter().any(|a| a == "/opt/logo.png"));
        assert!(args.iter().any(|a| a.contains("overlay=W-w-20:H-h-60")));
        assert_eq!(args.last().map(String::as_str), Some("/out.mp4"));
    }

    #[test]
    fn args_fall_back_to_text_only_without_a_logo() {
        let transcoder = FfmpegTranscoder::new("ffmpeg", None);
        let args = transcoder.build_args(Path::new("/in.mp4"), Path::new("/out.mp4"));

        assert!(!args.iter().any(|a| a == "-filter_complex"));
        assert!(args.iter().any(|a| a.contains("drawtext=text='UniPost'")));
    }

    #[tokio::test]
    async fn missing_binary_falls_back_to_the_input_path() {
        let transcoder = FfmpegTranscoder::new("definitely-not-ffmpeg-bin", None);
        let out = transcoder
            .watermark(Path::new("/in.mp4"), Path::new("/out.mp4"))
            .await
            .unwrap();
        assert_eq!(out, PathBuf::from("/in.mp4"));
    }
}
