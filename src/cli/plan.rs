//! Plan command implementation (dry run, no server connection)

use anyhow::Result;
use chrono::Utc;

use crate::bootstrap::{Bootstrapper, Target};
use crate::config::Config;
use crate::model::ChatMessage;
use crate::store::schema::{index_for, QUERY_PATTERNS};
use crate::store::MemoryDatastore;

pub async fn run(config: &Config) -> Result<()> {
    let target = Target::from_config(config, String::new());
    let indexes = target.indexes.clone();

    let store = MemoryDatastore::new();
    Bootstrapper::new(&store, target).run().await?;

    println!("Operations against {}:\n", config.mongodb.uri);
    for (i, op) in store.operations().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, op);
    }

    println!(
        "\n{:<28} {:<50} {}",
        "Index", "Keys", "Options"
    );
    println!("{}", "-".repeat(88));
    for index in &indexes {
        println!(
            "{:<28} {:<50} {}",
            index.name,
            index.describe_keys(),
            if index.unique { "unique" } else { "-" }
        );
    }

    println!("\n{:<32} {}", "Query", "Served by");
    println!("{}", "-".repeat(60));
    for pattern in QUERY_PATTERNS {
        let served = index_for(&indexes, pattern.equality, pattern.sort)
            .map(|i| i.name.as_str())
            .unwrap_or("(collection scan)");
        println!("{:<32} {}", pattern.description, served);
    }

    let sample = ChatMessage::sample(Utc::now());
    println!("\nExample document:\n{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}
