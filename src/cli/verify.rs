//! Verify command implementation

use anyhow::{Context, Result};

use crate::config::Config;
use crate::store::{
    chat_history_indexes, Action, Datastore, IndexSpec, MongoDatastore, UserInfo, ID_INDEX,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Ok,
    Missing,
    Conflicting { found: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserState {
    Missing,
    /// Present; `scoped` is false when roles reach beyond read/write on the database
    Present {
        can_read: bool,
        can_write: bool,
        scoped: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Inspection {
    pub collection_exists: bool,
    pub indexes: Vec<(String, IndexState)>,
    pub extra_indexes: Vec<String>,
    pub user: UserState,
}

impl Inspection {
    pub fn is_ok(&self) -> bool {
        self.collection_exists
            && self.indexes.iter().all(|(_, s)| *s == IndexState::Ok)
            && self.extra_indexes.is_empty()
            && self.user
                == UserState::Present {
                    can_read: true,
                    can_write: true,
                    scoped: true,
                }
    }
}

/// Compare the deployed state against the expected resources
pub async fn inspect<D: Datastore + ?Sized>(store: &D, config: &Config) -> Result<Inspection> {
    let expected = chat_history_indexes();
    let collection_exists = store
        .collection_exists(&config.database, &config.collection)
        .await?;

    let deployed: Vec<IndexSpec> = if collection_exists {
        store
            .list_indexes(&config.database, &config.collection)
            .await?
    } else {
        Vec::new()
    };

    let indexes = expected
        .iter()
        .map(|want| {
            let state = match deployed.iter().find(|d| d.name == want.name) {
                None => IndexState::Missing,
                Some(found) if found.same_definition(want) => IndexState::Ok,
                Some(found) => IndexState::Conflicting {
                    found: found.describe_keys(),
                },
            };
            (want.name.clone(), state)
        })
        .collect();

    let extra_indexes = deployed
        .iter()
        .filter(|d| d.name != ID_INDEX && !expected.iter().any(|e| e.name == d.name))
        .map(|d| d.name.clone())
        .collect();

    let user = match store
        .find_user(&config.app_user.auth_database, &config.app_user.name)
        .await?
    {
        None => UserState::Missing,
        Some(found) => user_state(&found, &config.database),
    };

    Ok(Inspection {
        collection_exists,
        indexes,
        extra_indexes,
        user,
    })
}

fn user_state(user: &UserInfo, db: &str) -> UserState {
    UserState::Present {
        can_read: user.permits(db, Action::Read),
        can_write: user.permits(db, Action::Write),
        scoped: user.is_scoped_to(db),
    }
}

pub async fn run(config: &Config) -> Result<bool> {
    let store = MongoDatastore::connect(&config.mongodb.uri, &config.mongodb.app_name)
        .await
        .context("Failed to configure MongoDB client")?;
    store.ping().await.context("MongoDB is not reachable")?;

    let inspection = inspect(&store, config).await?;
    print(config, &inspection);
    Ok(inspection.is_ok())
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}

fn print(config: &Config, inspection: &Inspection) {
    println!(
        "{} collection {}.{}",
        mark(inspection.collection_exists),
        config.database,
        config.collection
    );

    for (name, state) in &inspection.indexes {
        match state {
            IndexState::Ok => println!("{} index {}", mark(true), name),
            IndexState::Missing => println!("{} index {} (missing)", mark(false), name),
            IndexState::Conflicting { found } => {
                println!("{} index {} (found keys: {})", mark(false), name, found)
            }
        }
    }
    for name in &inspection.extra_indexes {
        println!("{} unexpected index {}", mark(false), name);
    }

    match &inspection.user {
        UserState::Missing => println!("{} user {} (missing)", mark(false), config.app_user.name),
        UserState::Present {
            can_read,
            can_write,
            scoped,
        } => {
            println!(
                "{} user {} read={} write={} least-privilege={}",
                mark(*can_read && *can_write && *scoped),
                config.app_user.name,
                can_read,
                can_write,
                scoped
            );
        }
    }
}
