pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;

pub use bootstrap::{BootstrapReport, Bootstrapper, Target};
pub use config::Config;
pub use error::{BootstrapError, StoreError};
pub use store::{Datastore, MemoryDatastore, MongoDatastore};
