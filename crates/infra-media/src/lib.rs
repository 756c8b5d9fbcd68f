//! Local media infrastructure: filesystem asset storage and the ffmpeg
//! watermark pass.

mod media_store;
mod transcoder;

pub use media_store::FsMediaStore;
pub use transcoder::FfmpegTranscoder;
