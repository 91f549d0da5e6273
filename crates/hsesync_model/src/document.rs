//! Schema-checked JSON documents.

use crate::collection::Collection;
use crate::error::{ModelError, ModelResult};
use crate::operation::OperationKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field every document is keyed by.
pub const ID_FIELD: &str = "id";

/// A JSON object record.
///
/// Documents are what the queue stores as operation payloads and what the
/// cache mirror stores per collection. [`Document::validate_for`] checks one
/// against what a collection and operation kind require before it is queued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// An empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A document holding only `id`.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::new().with(ID_FIELD, Value::String(id.into()))
    }

    /// Wraps a JSON value.
    ///
    /// # Errors
    ///
    /// [`ModelError::InvalidDocument`] unless `value` is an object.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ModelError::invalid(
                "document",
                format!("expected a JSON object, got {}", kind_of(&other)),
            )),
        }
    }

    /// Serializes any serde value into a document.
    ///
    /// # Errors
    ///
    /// Fails if the value does not serialize to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> ModelResult<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Deserializes the document into `T`.
    ///
    /// # Errors
    ///
    /// Fails if the fields do not match `T`.
    pub fn to_record<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    /// The `id` field, when it is a non-empty string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Returns the id, generating a time-ordered one when missing.
    pub fn ensure_id(&mut self) -> String {
        if let Some(id) = self.id() {
            return id.to_string();
        }
        let id = uuid::Uuid::now_v7().to_string();
        self.0.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        id
    }

    /// Reads a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// True if the field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copies every field of `patch` over this document (one level deep).
    pub fn merge(&mut self, patch: &Document) {
        for (field, value) in &patch.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// A copy without the `id` field.
    #[must_use]
    pub fn without_id(&self) -> Document {
        let mut copy = self.clone();
        copy.0.remove(ID_FIELD);
        copy
    }

    /// Checks the document against what `kind` requires for `collection`.
    ///
    /// - every kind needs a non-empty string `id`
    /// - inserts need each of [`Collection::required_fields`], non-null
    /// - updates need at least one field besides `id`
    ///
    /// # Errors
    ///
    /// [`ModelError::InvalidDocument`] naming the first problem found.
    pub fn validate_for(&self, collection: Collection, kind: OperationKind) -> ModelResult<()> {
        match self.0.get(ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => {}
            Some(Value::String(_)) => {
                return Err(ModelError::invalid(collection.name(), "id is empty"))
            }
            Some(other) => {
                return Err(ModelError::invalid(
                    collection.name(),
                    format!("id must be a string, got {}", kind_of(other)),
                ))
            }
            None => return Err(ModelError::invalid(collection.name(), "missing id")),
        }

        match kind {
            OperationKind::Insert => {
                let missing: Vec<&str> = collection
                    .required_fields()
                    .iter()
                    .copied()
                    .filter(|field| matches!(self.0.get(*field), None | Some(Value::Null)))
                    .collect();
                if !missing.is_empty() {
                    return Err(ModelError::invalid(
                        collection.name(),
                        format!("missing required fields: {}", missing.join(", ")),
                    ));
                }
            }
            OperationKind::Update => {
                if self.0.len() < 2 {
                    return Err(ModelError::invalid(
                        collection.name(),
                        "update carries no fields besides id",
                    ));
                }
            }
            OperationKind::Delete => {}
        }
        Ok(())
    }

    /// The underlying JSON map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwraps into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl TryFrom<Value> for Document {
    type Error = ModelError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
