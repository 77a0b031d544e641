//! MongoDB implementation of the datastore seam

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, IndexModel};

use super::{Datastore, IndexSpec, NewUser, StoreResult, UserInfo};
use crate::error::{ResourceKind, StoreError};

// Server error codes we translate
const NAMESPACE_NOT_FOUND: i32 = 26;
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const DUPLICATE_KEY: i32 = 11000;
const USER_ALREADY_EXISTS: i32 = 51003;

pub struct MongoDatastore {
    client: Client,
}

impl MongoDatastore {
    pub async fn connect(uri: &str, app_name: &str) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some(app_name.to_string());
        let client = Client::with_options(options)?;
        Ok(Self { client })
    }

    fn collection(&self, db: &str, collection: &str) -> mongodb::Collection<Document> {
        self.client.database(db).collection::<Document>(collection)
    }
}

/// Translate a driver error into the seam's error types
fn translate(err: mongodb::error::Error, kind: ResourceKind, name: &str) -> StoreError {
    let classified = match err.kind.as_ref() {
        ErrorKind::Command(command) => classify(command.code, kind, name, &command.message),
        _ => None,
    };
    classified.unwrap_or(StoreError::Driver(err))
}

fn classify(code: i32, kind: ResourceKind, name: &str, message: &str) -> Option<StoreError> {
    match code {
        NAMESPACE_EXISTS | USER_ALREADY_EXISTS => Some(StoreError::AlreadyExists {
            kind,
            name: name.to_string(),
        }),
        INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT => Some(StoreError::IndexConflict {
            name: name.to_string(),
            detail: message.to_string(),
        }),
        DUPLICATE_KEY => Some(StoreError::DuplicateKey {
            index: name.to_string(),
            key: message.to_string(),
        }),
        NAMESPACE_NOT_FOUND => Some(StoreError::NotFound {
            kind,
            name: name.to_string(),
        }),
        _ => None,
    }
}

fn index_model(index: &IndexSpec) -> IndexModel {
    let mut options = IndexOptions::builder().name(index.name.clone()).build();
    if index.unique {
        options.unique = Some(true);
    }
    IndexModel::builder()
        .keys(index.keys_document())
        .options(options)
        .build()
}

fn index_spec(model: &IndexModel) -> IndexSpec {
    let options = model.options.as_ref();
    IndexSpec {
        name: options
            .and_then(|o| o.name.clone())
            .unwrap_or_default(),
        // text/hashed/geo keys have no sort order; an empty key list
        // never matches a requested definition
        keys: IndexSpec::keys_from_document(&model.keys).unwrap_or_default(),
        unique: options.and_then(|o| o.unique).unwrap_or(false),
    }
}

#[async_trait]
impl Datastore for MongoDatastore {
    async fn ping(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }

    async fn collection_exists(&self, db: &str, collection: &str) -> StoreResult<bool> {
        let names = self
            .client
            .database(db)
            .list_collection_names(doc! { "name": collection })
            .await?;
        Ok(names.iter().any(|n| n == collection))
    }

    async fn create_collection(&self, db: &str, collection: &str) -> StoreResult<()> {
        self.client
            .database(db)
            .create_collection(collection, None)
            .await
            .map_err(|e| translate(e, ResourceKind::Collection, &format!("{}.{}", db, collection)))
    }

    async fn list_indexes(&self, db: &str, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        let name = format!("{}.{}", db, collection);
        let cursor = self
            .collection(db, collection)
            .list_indexes(None)
            .await
            .map_err(|e| translate(e, ResourceKind::Collection, &name))?;
        let models: Vec<IndexModel> = cursor.try_collect().await?;
        Ok(models.iter().map(index_spec).collect())
    }

    async fn create_index(
        &self,
        db: &str,
        collection: &str,
        index: &IndexSpec,
    ) -> StoreResult<()> {
        self.collection(db, collection)
            .create_index(index_model(index), None)
            .await
            .map_err(|e| translate(e, ResourceKind::Index, &index.name))?;
        Ok(())
    }

    async fn find_user(&self, auth_db: &str, name: &str) -> StoreResult<Option<UserInfo>> {
        let reply = self
            .client
            .database(auth_db)
            .run_command(
                doc! { "usersInfo": { "user": name, "db": auth_db } },
                None,
            )
            .await?;
        let users = reply
            .get_array("users")
            .map_err(|e| StoreError::Decode(format!("usersInfo: {}", e)))?;
        match users.first().and_then(|u| u.as_document()) {
            Some(user) => bson::from_document(user.clone())
                .map(Some)
                .map_err(|e| StoreError::Decode(format!("usersInfo: {}", e))),
            None => Ok(None),
        }
    }

    async fn create_user(&self, user: &NewUser) -> StoreResult<()> {
        let roles: Vec<Document> = user
            .roles
            .iter()
            .map(|r| doc! { "role": r.role.clone(), "db": r.db.clone() })
            .collect();
        self.client
            .database(&user.auth_database)
            .run_command(
                doc! {
                    "createUser": user.name.clone(),
                    "pwd": user.password.clone(),
                    "roles": roles,
                },
                None,
            )
            .await
            .map_err(|e| {
                translate(
                    e,
                    ResourceKind::User,
                    &format!("{}@{}", user.name, user.auth_database),
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{chat_history_indexes, SortOrder};

    #[test]
    fn test_classify_duplicate_resources() {
        let err = classify(NAMESPACE_EXISTS, ResourceKind::Collection, "db.c", "").unwrap();
        assert!(matches!(
            err,
            StoreError::AlreadyExists {
                kind: ResourceKind::Collection,
                ..
            }
        ));

        let err = classify(USER_ALREADY_EXISTS, ResourceKind::User, "app@admin", "").unwrap();
        assert_eq!(err.to_string(), "user 'app@admin' already exists");
    }

    #[test]
    fn test_classify_index_conflicts() {
        for code in [INDEX_OPTIONS_CONFLICT, INDEX_KEY_SPECS_CONFLICT] {
            let err = classify(code, ResourceKind::Index, "session_timestamp_idx", "keys differ")
                .unwrap();
            assert!(matches!(err, StoreError::IndexConflict { ref detail, .. } if detail == "keys differ"));
        }
    }

    #[test]
    fn test_classify_duplicate_key_and_missing_namespace() {
        let err = classify(
            DUPLICATE_KEY,
            ResourceKind::Index,
            "message_id_unique_idx",
            "E11000 duplicate key error",
        )
        .unwrap();
        assert!(matches!(
            err,
            StoreError::DuplicateKey { ref index, ref key }
                if index == "message_id_unique_idx" && key == "E11000 duplicate key error"
        ));

        let err = classify(NAMESPACE_NOT_FOUND, ResourceKind::Collection, "db.c", "ns does not exist")
            .unwrap();
        assert!(matches!(
            err,
            StoreError::NotFound {
                kind: ResourceKind::Collection,
                ref name
            } if name == "db.c"
        ));
    }

    #[test]
    fn test_classify_unknown_code_passes_through() {
        assert!(classify(13, ResourceKind::User, "app", "unauthorized").is_none());
    }

    #[test]
    fn test_index_model_carries_name_and_unique() {
        let indexes = chat_history_indexes();
        let unique = index_model(&indexes[5]);
        let options = unique.options.as_ref().unwrap();
        assert_eq!(options.name.as_deref(), Some("message_id_unique_idx"));
        assert_eq!(options.unique, Some(true));

        let plain = index_model(&indexes[0]);
        assert_eq!(plain.options.as_ref().unwrap().unique, None);
        assert_eq!(plain.keys, doc! { "session_id": 1, "timestamp": 1 });
    }

    #[test]
    fn test_index_spec_from_listed_model() {
        let model = IndexModel::builder()
            .keys(doc! { "message_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("message_id_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        let spec = index_spec(&model);
        assert_eq!(spec.name, "message_id_unique_idx");
        assert_eq!(spec.keys, vec![("message_id".to_string(), SortOrder::Ascending)]);
        assert!(spec.unique);
        assert!(spec.same_definition(&chat_history_indexes()[5]));
    }
}
