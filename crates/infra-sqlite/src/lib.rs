//! SQLite-backed persistence for posts, linked social accounts, and
//! subscription tiers. Implements the core store ports over a single
//! WAL-mode pool.

mod connection;
mod credential_store;
mod migration;
mod post_store;
mod subscription_store;

pub use connection::create_pool;
pub use credential_store::SqliteCredentialStore;
pub use migration::run_migrations;
pub use post_store::SqlitePostStore;
pub use subscription_store::SqliteSubscriptionStore;
