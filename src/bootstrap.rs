//! Provisioning sequence for the chat history store
//!
//! ping -> select database -> create collection -> create indexes -> create
//! user. Steps run strictly in order; the first failure aborts the rest and
//! nothing already created is rolled back.

use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{Config, ExistingPolicy};
use crate::error::{BootstrapError, ResourceKind, Step, StoreError};
use crate::store::{chat_history_indexes, Datastore, IndexSpec, NewUser, RoleGrant};

/// What happened to a resource during the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// Already present, left untouched (skip policy only)
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub database: String,
    pub collection: Outcome,
    pub indexes: Vec<(String, Outcome)>,
    pub user: String,
    pub user_outcome: Outcome,
}

impl BootstrapReport {
    /// Operator-facing completion lines
    pub fn status_lines(&self) -> Vec<String> {
        vec![
            "Database initialization completed successfully!".to_string(),
            "Created collections and indexes for n8n chat storage".to_string(),
            match self.user_outcome {
                Outcome::Created => format!("Created user: {} for chat application", self.user),
                Outcome::Skipped => format!("User {} already exists, left unchanged", self.user),
            },
        ]
    }

    pub fn created_count(&self) -> usize {
        let mut n = self.indexes.iter().filter(|(_, o)| *o == Outcome::Created).count();
        if self.collection == Outcome::Created {
            n += 1;
        }
        if self.user_outcome == Outcome::Created {
            n += 1;
        }
        n
    }
}

/// Target resources for one run
#[derive(Debug, Clone)]
pub struct Target {
    pub database: String,
    pub collection: String,
    pub indexes: Vec<IndexSpec>,
    pub user: NewUser,
    pub policy: ExistingPolicy,
}

impl Target {
    pub fn from_config(config: &Config, password: String) -> Self {
        Self {
            database: config.database.clone(),
            collection: config.collection.clone(),
            indexes: chat_history_indexes(),
            user: NewUser {
                name: config.app_user.name.clone(),
                auth_database: config.app_user.auth_database.clone(),
                password,
                roles: vec![RoleGrant::read_write(&config.database)],
            },
            policy: config.on_existing,
        }
    }
}

pub struct Bootstrapper<'a, D: Datastore + ?Sized> {
    store: &'a D,
    target: Target,
}

impl<'a, D: Datastore + ?Sized> Bootstrapper<'a, D> {
    pub fn new(store: &'a D, target: Target) -> Self {
        Self { store, target }
    }

    pub async fn run(&self) -> Result<BootstrapReport, BootstrapError> {
        let span = info_span!(
            "bootstrap",
            database = %self.target.database,
            collection = %self.target.collection,
        );
        async {
            self.store
                .ping()
                .await
                .map_err(|e| fail(Step::Connect, e))?;

            // The database materializes on the first write below
            info!(step = %Step::SelectDatabase, "selected database");

            let collection = self.create_collection().await?;
            let indexes = self.create_indexes().await?;
            let user_outcome = self.create_user().await?;

            Ok(BootstrapReport {
                database: self.target.database.clone(),
                collection,
                indexes,
                user: self.target.user.name.clone(),
                user_outcome,
            })
        }
        .instrument(span)
        .await
    }

    fn skip_existing(&self) -> bool {
        self.target.policy == ExistingPolicy::Skip
    }

    async fn create_collection(&self) -> Result<Outcome, BootstrapError> {
        let Target {
            database,
            collection,
            ..
        } = &self.target;

        if self.skip_existing()
            && self
                .store
                .collection_exists(database, collection)
                .await
                .map_err(|e| fail(Step::CreateCollection, e))?
        {
            warn!(collection = %collection, "collection already exists, skipping");
            return Ok(Outcome::Skipped);
        }

        self.store
            .create_collection(database, collection)
            .await
            .map_err(|e| fail(Step::CreateCollection, e))?;
        info!(collection = %collection, "created collection");
        Ok(Outcome::Created)
    }

    async fn create_indexes(&self) -> Result<Vec<(String, Outcome)>, BootstrapError> {
        let Target {
            database,
            collection,
            indexes,
            ..
        } = &self.target;

        let existing = if self.skip_existing() {
            self.store
                .list_indexes(database, collection)
                .await
                .map_err(|e| fail(Step::CreateIndex, e))?
        } else {
            Vec::new()
        };

        let mut outcomes = Vec::with_capacity(indexes.len());
        for index in indexes {
            if let Some(present) = existing.iter().find(|i| i.name == index.name) {
                if !present.same_definition(index) {
                    return Err(fail(
                        Step::CreateIndex,
                        StoreError::IndexConflict {
                            name: index.name.clone(),
                            detail: format!(
                                "existing keys [{}], requested [{}]",
                                present.describe_keys(),
                                index.describe_keys()
                            ),
                        },
                    ));
                }
                warn!(index = %index.name, "index already exists, skipping");
                outcomes.push((index.name.clone(), Outcome::Skipped));
                continue;
            }

            self.store
                .create_index(database, collection, index)
                .await
                .map_err(|e| fail(Step::CreateIndex, e))?;
            info!(index = %index.name, keys = %index.describe_keys(), unique = index.unique, "created index");
            outcomes.push((index.name.clone(), Outcome::Created));
        }
        Ok(outcomes)
    }

    async fn create_user(&self) -> Result<Outcome, BootstrapError> {
        let user = &self.target.user;

        if self.skip_existing() {
            let found = self
                .store
                .find_user(&user.auth_database, &user.name)
                .await
                .map_err(|e| fail(Step::CreateUser, e))?;
            if let Some(found) = found {
                if !found.is_scoped_to(&self.target.database) {
                    warn!(user = %user.name, roles = ?found.roles, "existing user has unexpected roles, leaving unchanged");
                } else {
                    warn!(user = %user.name, "user already exists, skipping");
                }
                return Ok(Outcome::Skipped);
            }
        }

        self.store
            .create_user(user)
            .await
            .map_err(|e| fail(Step::CreateUser, e))?;
        info!(user = %user.name, auth_db = %user.auth_database, roles = ?user.roles, "created user");
        Ok(Outcome::Created)
    }
}

fn fail(step: Step, source: StoreError) -> BootstrapError {
    error!(step = %step, error = %source, "bootstrap step failed");
    BootstrapError::store(step, source)
}

/// Kind of the already-present resource that stopped a run. Conflicting
/// index definitions are not included: skip mode rejects them too.
pub fn already_exists_kind(err: &BootstrapError) -> Option<ResourceKind> {
    match err.store_error() {
        Some(StoreError::AlreadyExists { kind, .. }) => Some(*kind),
        _ => None,
    }
}
