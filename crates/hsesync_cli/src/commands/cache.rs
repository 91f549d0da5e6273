//! Cache command implementation.

use super::open_existing;
use hsesync_engine::CacheMirror;
use hsesync_model::{Collection, Document, ID_FIELD};
use std::path::Path;

/// Runs the cache command.
pub fn run(path: &Path, collection: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let collection: Collection = collection.parse()?;
    let records = dump(path, collection)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(collection, &records);
        }
    }

    Ok(())
}

/// Reads every cached record of `collection`.
pub fn dump(
    path: &Path,
    collection: Collection,
) -> Result<Vec<Document>, Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    Ok(CacheMirror::new(store).read_all(collection)?)
}

fn print_text_output(collection: Collection, records: &[Document]) {
    println!("{} ({} cached)", collection, records.len());
    for record in records {
        println!();
        println!("[{}]", record.id().unwrap_or("?"));
        for (field, value) in record.as_map() {
            if field != ID_FIELD {
                println!("  {}: {}", field, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seeded_store;

    #[test]
    fn dumps_one_collection() {
        let (_dir, path) = seeded_store();
        let records = dump(&path, Collection::Incidents).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id().unwrap()).collect();
        assert_eq!(ids, vec!["i-1", "i-2"]);
        assert!(dump(&path, Collection::PpeIssuances).unwrap().is_empty());
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let (_dir, path) = seeded_store();
        assert!(run(&path, "tasks", "json").is_err());
    }
}
