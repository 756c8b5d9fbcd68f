// Application layer - publish orchestration services.

pub mod dispatch;
pub mod engine;
pub mod pipeline;
pub mod policy;
pub mod runner;
pub mod scheduler;
pub mod shutdown;
pub mod tokens;

// Re-exports
pub use dispatch::{DispatchQueue, DispatchWorker, PublishRequest};
pub use engine::{AdapterSet, DistributionEngine, DistributionReport};
pub use policy::PolicyGate;
pub use runner::JobRunner;
pub use scheduler::PublishScheduler;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use tokens::TokenLifecycleManager;
