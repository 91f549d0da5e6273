//! Typed records, one per collection.
//!
//! Fields the remote schema requires on insert are plain fields; the rest
//! are `Option` and left out of the JSON when unset, so an update built
//! from a typed record only patches what is filled in.

use crate::collection::Collection;
use crate::document::Document;
use crate::error::ModelResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record type bound to its collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// The collection records of this type live in.
    const COLLECTION: Collection;

    /// The record id.
    fn id(&self) -> &str;

    /// Converts to a document.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    fn to_document(&self) -> ModelResult<Document> {
        Document::from_serialize(self)
    }

    /// Reads a document back into the typed record.
    ///
    /// # Errors
    ///
    /// Fails if a required field is missing or has the wrong type.
    fn from_document(doc: &Document) -> ModelResult<Self> {
        doc.to_record()
    }
}

macro_rules! impl_record {
    ($($ty:ty => $collection:expr),+ $(,)?) => {
        $(
            impl Record for $ty {
                const COLLECTION: Collection = $collection;

                fn id(&self) -> &str {
                    &self.id
                }
            }
        )+
    };
}

impl_record! {
    Incident => Collection::Incidents,
    SafetyTraining => Collection::SafetyTrainings,
    ErgonomicAssessment => Collection::ErgonomicAssessments,
    MedicalExamination => Collection::MedicalExaminations,
    RiskAssessment => Collection::RiskAssessments,
    WorkplaceInspection => Collection::WorkplaceInspections,
    PpeIssuance => Collection::PpeIssuances,
    CorrectiveAction => Collection::CorrectiveActions,
}

/// An incident, injury or near miss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Record id.
    pub id: String,
    /// `near_miss`, `injury`, `property_damage`, ...
    #[serde(rename = "type")]
    pub incident_type: String,
    /// Short title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// What happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `low`, `medium`, `high`, `critical`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// When it happened (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    /// Where it happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Who reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_by: Option<String>,
    /// Investigation status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A completed safety training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyTraining {
    /// Record id.
    pub id: String,
    /// Course title.
    pub title: String,
    /// Date held (ISO 8601).
    pub training_date: String,
    /// Trainer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer: Option<String>,
    /// Participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    /// Length in hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    /// Certificate expiry (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<String>,
}

/// A workstation ergonomic assessment.
///
/// The score is computed elsewhere (RULA, REBA, NIOSH lifting equation) and
/// stored as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErgonomicAssessment {
    /// Record id.
    pub id: String,
    /// Assessed workstation or task.
    pub workstation: String,
    /// Method name, e.g. `RULA`.
    pub method: String,
    /// Final score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Risk band derived from the score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    /// Who assessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessor: Option<String>,
    /// Date assessed (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessed_on: Option<String>,
    /// Suggested changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
}

/// An occupational medical examination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalExamination {
    /// Record id.
    pub id: String,
    /// Examined employee.
    pub employee_name: String,
    /// `pre_employment`, `periodic`, `return_to_work`, ...
    pub examination_type: String,
    /// Date examined (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examination_date: Option<String>,
    /// Fitness verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_for_work: Option<bool>,
    /// Work restrictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<Vec<String>>,
    /// When the next one is due (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_examination_date: Option<String>,
}

/// A hazard with its assessed risk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Record id.
    pub id: String,
    /// The hazard.
    pub hazard: String,
    /// `low`, `medium`, `high`.
    pub risk_level: String,
    /// Activity exposed to the hazard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    /// Likelihood on a 1 to 5 scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likelihood: Option<u8>,
    /// Consequence on a 1 to 5 scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequence: Option<u8>,
    /// Control measures in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<String>,
}

/// A workplace inspection round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkplaceInspection {
    /// Record id.
    pub id: String,
    /// Inspected area.
    pub area: String,
    /// Date inspected (ISO 8601).
    pub inspection_date: String,
    /// Inspector name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector: Option<String>,
    /// Findings, one per line item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<String>>,
    /// Checklist score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Protective equipment handed to an employee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PpeIssuance {
    /// Record id.
    pub id: String,
    /// Receiving employee.
    pub employee_name: String,
    /// Item, e.g. `safety_glasses`.
    pub item: String,
    /// Units handed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    /// Date issued (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_on: Option<String>,
    /// Replacement due (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_by: Option<String>,
}

/// A follow-up action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveAction {
    /// Record id.
    pub id: String,
    /// What has to be done.
    pub description: String,
    /// `open`, `in_progress`, `done`.
    pub status: String,
    /// Incident, inspection or assessment that raised it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Due date (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}
