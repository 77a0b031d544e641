//! Error types for the datastore seam and the bootstrap sequence

use thiserror::Error;

/// Kind of named resource, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Collection,
    Index,
    User,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Collection => "collection",
            ResourceKind::Index => "index",
            ResourceKind::User => "user",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("index '{name}' conflicts with an existing index: {detail}")]
    IndexConflict { name: String, detail: String },

    #[error("duplicate key on index '{index}': {key}")]
    DuplicateKey { index: String, key: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("datastore error: {0}")]
    Driver(#[from] mongodb::error::Error),

    #[error("malformed server response: {0}")]
    Decode(String),
}

/// Bootstrap step identifiers, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    SelectDatabase,
    CreateCollection,
    CreateIndex,
    CreateUser,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Step::Connect => "connect",
            Step::SelectDatabase => "select-database",
            Step::CreateCollection => "create-collection",
            Step::CreateIndex => "create-index",
            Step::CreateUser => "create-user",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{step} failed: {source}")]
    Store {
        step: Step,
        #[source]
        source: StoreError,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl BootstrapError {
    pub fn store(step: Step, source: StoreError) -> Self {
        BootstrapError::Store { step, source }
    }

    /// The datastore error behind this failure, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            BootstrapError::Store { source, .. } => Some(source),
            BootstrapError::Config(_) => None,
        }
    }
}
