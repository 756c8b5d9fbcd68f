// Domain layer - pure entities and publish vocabulary.

pub mod credential;
pub mod destination;
pub mod error;
pub mod policy;
pub mod post;

pub use credential::{DestinationAuth, DestinationCredential, TokenGrant};
pub use destination::{
    Destination, DestinationOutcome, DestinationResults, DispatchError, PublishPhase,
};
pub use error::DomainError;
pub use policy::{PolicyProfile, Tier};
pub use post::{Asset, AssetKind, OwnerId, Post, PostId, PostStatus};
