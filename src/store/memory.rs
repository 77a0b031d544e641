//! In-memory datastore with MongoDB semantics for the bootstrap operations
//!
//! Backs `plan` dry runs and the unit tests. Records every administrative
//! call in order so the sequence can be inspected.

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{Datastore, IndexSpec, NewUser, SortOrder, StoreResult, UserInfo, ID_INDEX};
use crate::error::{ResourceKind, StoreError};

#[derive(Debug, Default)]
struct CollectionState {
    indexes: Vec<IndexSpec>,
    documents: Vec<Document>,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            indexes: vec![IndexSpec::new(ID_INDEX, &[("_id", SortOrder::Ascending)]).unique()],
            documents: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    // db -> collection -> state
    databases: BTreeMap<String, BTreeMap<String, CollectionState>>,
    // (auth db, user name) -> user
    users: HashMap<(String, String), UserInfo>,
    operations: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryDatastore {
    state: Mutex<State>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Administrative calls received so far, in order
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    /// Databases that hold at least one collection
    pub fn database_names(&self) -> Vec<String> {
        self.lock()
            .databases
            .iter()
            .filter(|(_, colls)| !colls.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn collection_names(&self, db: &str) -> Vec<String> {
        self.lock()
            .databases
            .get(db)
            .map(|colls| colls.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn users(&self) -> Vec<UserInfo> {
        self.lock().users.values().cloned().collect()
    }

    pub fn document_count(&self, db: &str, collection: &str) -> usize {
        self.lock()
            .databases
            .get(db)
            .and_then(|colls| colls.get(collection))
            .map_or(0, |c| c.documents.len())
    }

    /// Insert a document, enforcing every unique index on the collection.
    /// Like the server, inserting into a missing collection creates it.
    pub fn insert(&self, db: &str, collection: &str, doc: Document) -> StoreResult<()> {
        let mut state = self.lock();
        let coll = state
            .databases
            .entry(db.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);

        let mut doc = doc;
        if !doc.contains_key("_id") {
            doc.insert("_id", ObjectId::new());
        }

        for index in coll.indexes.iter().filter(|i| i.unique) {
            let key = index_key(index, &doc);
            if coll.documents.iter().any(|d| index_key(index, d) == key) {
                return Err(StoreError::DuplicateKey {
                    index: index.name.clone(),
                    key: format!("{:?}", key),
                });
            }
        }

        coll.documents.push(doc);
        Ok(())
    }
}

/// Values of the index's fields in `doc`; missing fields index as null
fn index_key(index: &IndexSpec, doc: &Document) -> Vec<Bson> {
    index
        .keys
        .iter()
        .map(|(field, _)| lookup_path(doc, field).cloned().unwrap_or(Bson::Null))
        .collect()
}

/// Resolve a dotted path such as `context_info.window_position`
fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn ping(&self) -> StoreResult<()> {
        self.lock().operations.push("ping".to_string());
        Ok(())
    }

    async fn collection_exists(&self, db: &str, collection: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        state
            .operations
            .push(format!("listCollections {}", db));
        Ok(state
            .databases
            .get(db)
            .map_or(false, |colls| colls.contains_key(collection)))
    }

    async fn create_collection(&self, db: &str, collection: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state
            .operations
            .push(format!("createCollection {}.{}", db, collection));
        let colls = state.databases.entry(db.to_string()).or_default();
        if colls.contains_key(collection) {
            return Err(StoreError::AlreadyExists {
                kind: ResourceKind::Collection,
                name: format!("{}.{}", db, collection),
            });
        }
        colls.insert(collection.to_string(), CollectionState::new());
        Ok(())
    }

    async fn list_indexes(&self, db: &str, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        let mut state = self.lock();
        state
            .operations
            .push(format!("listIndexes {}.{}", db, collection));
        state
            .databases
            .get(db)
            .and_then(|colls| colls.get(collection))
            .map(|c| c.indexes.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: ResourceKind::Collection,
                name: format!("{}.{}", db, collection),
            })
    }

    async fn create_index(
        &self,
        db: &str,
        collection: &str,
        index: &IndexSpec,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        state
            .operations
            .push(format!("createIndex {}.{} {}", db, collection, index.name));
        let coll = state
            .databases
            .entry(db.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);

        if let Some(existing) = coll.indexes.iter().find(|i| i.name == index.name) {
            if existing.same_definition(index) {
                return Ok(());
            }
            return Err(StoreError::IndexConflict {
                name: index.name.clone(),
                detail: format!(
                    "existing keys [{}], requested [{}]",
                    existing.describe_keys(),
                    index.describe_keys()
                ),
            });
        }
        if let Some(existing) = coll.indexes.iter().find(|i| i.keys == index.keys) {
            return Err(StoreError::IndexConflict {
                name: index.name.clone(),
                detail: format!("same keys already indexed as '{}'", existing.name),
            });
        }

        if index.unique {
            let mut seen: Vec<Vec<Bson>> = Vec::new();
            for doc in &coll.documents {
                let key = index_key(index, doc);
                if seen.contains(&key) {
                    return Err(StoreError::DuplicateKey {
                        index: index.name.clone(),
                        key: format!("{:?}", key),
                    });
                }
                seen.push(key);
            }
        }

        coll.indexes.push(index.clone());
        Ok(())
    }

    async fn find_user(&self, auth_db: &str, name: &str) -> StoreResult<Option<UserInfo>> {
        let mut state = self.lock();
        state
            .operations
            .push(format!("usersInfo {}.{}", auth_db, name));
        Ok(state
            .users
            .get(&(auth_db.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> StoreResult<()> {
        let mut state = self.lock();
        state
            .operations
            .push(format!("createUser {}.{}", user.auth_database, user.name));
        let key = (user.auth_database.clone(), user.name.clone());
        if state.users.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: ResourceKind::User,
                name: format!("{}@{}", user.name, user.auth_database),
            });
        }
        state.users.insert(
            key,
            UserInfo {
                name: user.name.clone(),
                auth_database: user.auth_database.clone(),
                roles: user.roles.clone(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RoleGrant;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_create_collection_twice_fails() {
        let store = MemoryDatastore::new();
        store.create_collection("db", "c").await.unwrap();
        let err = store.create_collection("db", "c").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::AlreadyExists {
                kind: ResourceKind::Collection,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_new_collection_has_id_index() {
        let store = MemoryDatastore::new();
        store.create_collection("db", "c").await.unwrap();
        let indexes = store.list_indexes("db", "c").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, ID_INDEX);
    }

    #[tokio::test]
    async fn test_list_indexes_on_missing_collection() {
        let store = MemoryDatastore::new();
        let err = store.list_indexes("db", "missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_identical_index_is_noop() {
        let store = MemoryDatastore::new();
        store.create_collection("db", "c").await.unwrap();
        let idx = IndexSpec::new("a_idx", &[("a", SortOrder::Ascending)]);
        store.create_index("db", "c", &idx).await.unwrap();
        store.create_index("db", "c", &idx).await.unwrap();
        assert_eq!(store.list_indexes("db", "c").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_same_name_different_keys_conflicts() {
        let store = MemoryDatastore::new();
        store.create_collection("db", "c").await.unwrap();
        let idx = IndexSpec::new("a_idx", &[("a", SortOrder::Ascending)]);
        store.create_index("db", "c", &idx).await.unwrap();

        let other = IndexSpec::new("a_idx", &[("b", SortOrder::Ascending)]);
        let err = store.create_index("db", "c", &other).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexConflict { ref name, .. } if name == "a_idx"));

        let unique = idx.clone().unique();
        assert!(store.create_index("db", "c", &unique).await.is_err());
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicate_insert() {
        let store = MemoryDatastore::new();
        store.create_collection("db", "c").await.unwrap();
        let idx = IndexSpec::new("m_idx", &[("message_id", SortOrder::Ascending)]).unique();
        store.create_index("db", "c", &idx).await.unwrap();

        store.insert("db", "c", doc! { "message_id": "m1" }).unwrap();
        let err = store
            .insert("db", "c", doc! { "message_id": "m1" })
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref index, .. } if index == "m_idx"));
        store.insert("db", "c", doc! { "message_id": "m2" }).unwrap();
        assert_eq!(store.document_count("db", "c"), 2);
    }

    #[test]
    fn test_generated_id_does_not_collide_with_supplied_id() {
        let store = MemoryDatastore::new();
        store.insert("db", "c", doc! { "_id": 2i64, "n": 1 }).unwrap();
        store.insert("db", "c", doc! { "n": 2 }).unwrap();
        store.insert("db", "c", doc! { "n": 3 }).unwrap();
        assert_eq!(store.document_count("db", "c"), 3);

        let err = store.insert("db", "c", doc! { "_id": 2i64 }).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref index, .. } if index == ID_INDEX));
    }

    #[tokio::test]
    async fn test_unique_index_build_fails_on_existing_duplicates() {
        let store = MemoryDatastore::new();
        store.insert("db", "c", doc! { "message_id": "m1" }).unwrap();
        store.insert("db", "c", doc! { "message_id": "m1" }).unwrap();
        let idx = IndexSpec::new("m_idx", &[("message_id", SortOrder::Ascending)]).unique();
        let err = store.create_index("db", "c", &idx).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn test_lookup_nested_path() {
        let d = doc! { "context_info": { "window_position": 3 } };
        assert_eq!(
            lookup_path(&d, "context_info.window_position"),
            Some(&Bson::Int32(3))
        );
        assert_eq!(lookup_path(&d, "context_info.missing"), None);
        assert_eq!(lookup_path(&d, "missing.window_position"), None);
    }

    #[tokio::test]
    async fn test_create_user_twice_fails() {
        let store = MemoryDatastore::new();
        let user = NewUser {
            name: "app".to_string(),
            auth_database: "admin".to_string(),
            password: "pw".to_string(),
            roles: vec![RoleGrant::read_write("db")],
        };
        store.create_user(&user).await.unwrap();
        let found = store.find_user("admin", "app").await.unwrap().unwrap();
        assert!(found.is_scoped_to("db"));

        let err = store.create_user(&user).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::AlreadyExists {
                kind: ResourceKind::User,
                ..
            }
        ));
        assert!(store.find_user("other", "app").await.unwrap().is_none());
    }
}
