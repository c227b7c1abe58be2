//! Persistent per-user interaction state and user accounts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod snowflake;
mod sqlite;

pub use snowflake::Snowflake;
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("username must be 3-64 characters, alphanumeric and underscores only")]
    InvalidUsername,
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("migrate database: {0}")]
    Migration(#[from] rusqlite_migration::Error),
    #[error("prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
    #[error("database worker: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Interaction state a user holds for one resource path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRecord {
    pub user_id: u64,
    pub path: String,
    pub hidden: bool,
    pub starred: bool,
    pub view_time: Option<DateTime<Utc>>,
    pub read_time: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    /// The zero-valued record for a path the user has never touched.
    pub fn empty(user_id: u64, path: impl Into<String>) -> Self {
        Self {
            user_id,
            path: path.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    /// Zero until the store assigns an id.
    pub id: u64,
    pub name: String,
    pub password_hash: String,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Records for whichever of `paths` the user has interacted with.
    async fn list_resources(
        &self,
        user_id: u64,
        paths: &[String],
    ) -> Result<Vec<ResourceRecord>, StoreError>;
    async fn get_resource(&self, user_id: u64, path: &str) -> Result<ResourceRecord, StoreError>;
    /// Replaces the whole record.
    async fn upsert_resource(&self, resource: &ResourceRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list_users(&self, after_name: &str, limit: u32) -> Result<Vec<UserRecord>, StoreError>;
    async fn get_user(&self, user_id: u64) -> Result<UserRecord, StoreError>;
    async fn get_user_by_name(&self, name: &str) -> Result<UserRecord, StoreError>;
    /// Creates the user when `id` is zero, otherwise replaces it. Returns the
    /// stored record.
    async fn upsert_user(&self, user: &UserRecord) -> Result<UserRecord, StoreError>;
    /// Removes the user and every resource record they own.
    async fn delete_user(&self, user_id: u64) -> Result<(), StoreError>;
}

pub trait Store: ResourceStore + UserStore {}

impl<T: ResourceStore + UserStore> Store for T {}

pub fn valid_username(name: &str) -> bool {
    (3..=64).contains(&name.len())
        && name
            .bytes()
            .all(|b| b == b'_' || b.is_ascii_alphanumeric())
}
