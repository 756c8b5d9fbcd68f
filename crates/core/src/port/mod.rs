// Port layer - interfaces to everything outside the core.

pub mod credential_store;
pub mod destination;
pub mod media_store;
pub mod post_store;
pub mod providers;
pub mod subscription_store;
pub mod token_refresher;
pub mod transcoder;

// Re-exports
pub use credential_store::CredentialStore;
pub use destination::{ByteRange, DestinationAdapter, PostMeta, StagedAsset, UploadSession};
pub use media_store::MediaStore;
pub use post_store::PostStore;
pub use providers::{IdProvider, SystemTimeProvider, TimeProvider, UuidProvider};
pub use subscription_store::SubscriptionStore;
pub use token_refresher::{RefreshError, TokenRefresher};
pub use transcoder::Transcoder;
