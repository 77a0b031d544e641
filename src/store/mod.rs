//! Datastore seam for the bootstrap sequence
//!
//! Every call names its database explicitly; there is no ambient
//! "current database". `MongoDatastore` talks to a live server,
//! `MemoryDatastore` mirrors the same semantics for dry runs and tests.

mod memory;
mod mongo;
pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use memory::MemoryDatastore;
pub use mongo::MongoDatastore;
pub use schema::{chat_history_indexes, IndexSpec, SortOrder};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Name of the index every collection carries on `_id`
pub const ID_INDEX: &str = "_id_";

/// A role granted on a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn read_write(db: &str) -> Self {
        Self {
            role: "readWrite".to_string(),
            db: db.to_string(),
        }
    }
}

/// Operation classes checked by the authorization boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Admin,
}

/// A principal as stored on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "user")]
    pub name: String,
    #[serde(rename = "db")]
    pub auth_database: String,
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
}

impl UserInfo {
    /// Whether the built-in roles allow `action` on `db`
    pub fn permits(&self, db: &str, action: Action) -> bool {
        self.roles.iter().any(|grant| {
            let (actions, any_db): (&[Action], bool) = match grant.role.as_str() {
                "read" => (&[Action::Read], false),
                "readWrite" => (&[Action::Read, Action::Write], false),
                "dbAdmin" | "userAdmin" => (&[Action::Admin], false),
                "dbOwner" => (&[Action::Read, Action::Write, Action::Admin], false),
                "readAnyDatabase" => (&[Action::Read], true),
                "readWriteAnyDatabase" => (&[Action::Read, Action::Write], true),
                "dbAdminAnyDatabase" | "userAdminAnyDatabase" | "clusterAdmin" => {
                    (&[Action::Admin], true)
                }
                "root" => (&[Action::Read, Action::Write, Action::Admin], true),
                _ => (&[], false),
            };
            // AnyDatabase roles only take effect when granted on admin
            let scope_ok = if any_db {
                grant.db == "admin"
            } else {
                grant.db == db
            };
            scope_ok && actions.contains(&action)
        })
    }

    /// Exactly `readWrite` on `db` and nothing else
    pub fn is_scoped_to(&self, db: &str) -> bool {
        self.roles == [RoleGrant::read_write(db)]
    }
}

/// Principal to create, password included
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub auth_database: String,
    pub password: String,
    pub roles: Vec<RoleGrant>,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("auth_database", &self.auth_database)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

/// Administrative operations the bootstrapper issues
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Round-trip to the server
    async fn ping(&self) -> StoreResult<()>;

    async fn collection_exists(&self, db: &str, collection: &str) -> StoreResult<bool>;

    /// Fails with `AlreadyExists` if the collection is present
    async fn create_collection(&self, db: &str, collection: &str) -> StoreResult<()>;

    /// Indexes on the collection, `_id_` included
    async fn list_indexes(&self, db: &str, collection: &str) -> StoreResult<Vec<IndexSpec>>;

    /// No-op for an identical existing index, `IndexConflict` for a
    /// different one under the same name
    async fn create_index(&self, db: &str, collection: &str, index: &IndexSpec)
        -> StoreResult<()>;

    async fn find_user(&self, auth_db: &str, name: &str) -> StoreResult<Option<UserInfo>>;

    /// Fails with `AlreadyExists` if the principal is present
    async fn create_user(&self, user: &NewUser) -> StoreResult<()>;
}
