// UniPost Core - Domain logic, ports and publish orchestration.
// NO infrastructure dependencies: stores, HTTP and ffmpeg live behind ports.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
