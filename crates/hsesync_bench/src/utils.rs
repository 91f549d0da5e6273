//! Benchmark utilities.

use hsesync_model::{Collection, Document};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;

/// Generate a random alphanumeric string of the specified length.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate an incident whose description is `payload_size` characters long.
pub fn incident(id: &str, payload_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let severity = ["low", "medium", "high"][rng.gen_range(0..3)];
    Document::with_id(id)
        .with("type", json!("near_miss"))
        .with("severity", json!(severity))
        .with("description", json!(random_text(payload_size)))
}

/// Generate a batch of incidents with ids `bench-0`, `bench-1`, ...
pub fn generate_incidents(count: usize, payload_size: usize) -> Vec<Document> {
    (0..count)
        .map(|n| incident(&format!("bench-{n}"), payload_size))
        .collect()
}

/// A minimal insertable record for a randomly chosen collection.
pub fn random_record(id: &str) -> (Collection, Document) {
    let collection = Collection::ALL[rand::thread_rng().gen_range(0..Collection::ALL.len())];
    let mut doc = Document::with_id(id);
    for field in collection.required_fields() {
        doc.insert(*field, json!(random_text(12)));
    }
    (collection, doc)
}
