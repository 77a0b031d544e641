//! Init command implementation

use anyhow::{Context, Result};

use crate::bootstrap::{already_exists_kind, Bootstrapper, Target};
use crate::config::{Config, ExistingPolicy};
use crate::store::MongoDatastore;

pub async fn run(config: &Config) -> Result<()> {
    let password = config.app_password()?;

    let store = MongoDatastore::connect(&config.mongodb.uri, &config.mongodb.app_name)
        .await
        .context("Failed to configure MongoDB client")?;

    let target = Target::from_config(config, password);
    let report = match Bootstrapper::new(&store, target).run().await {
        Ok(report) => report,
        Err(e) => {
            if already_exists_kind(&e).is_some() && config.on_existing == ExistingPolicy::Fail {
                eprintln!(
                    "Datastore already (partly) initialized. Set 'on_existing: skip' to create only missing resources."
                );
            }
            return Err(e.into());
        }
    };

    for line in report.status_lines() {
        println!("{}", line);
    }
    Ok(())
}
