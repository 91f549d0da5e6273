//! The remote collections the application writes to.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named group of records on the remote store.
///
/// The wire name doubles as the name of the local cache partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Incidents, injuries and near misses.
    Incidents,
    /// Completed safety trainings.
    SafetyTrainings,
    /// Workstation ergonomic assessments (RULA, REBA, NIOSH, ...).
    ErgonomicAssessments,
    /// Occupational medical examinations.
    MedicalExaminations,
    /// Hazard and risk assessments.
    RiskAssessments,
    /// Workplace inspection rounds.
    WorkplaceInspections,
    /// Personal protective equipment handed out.
    PpeIssuances,
    /// Follow-up actions raised by incidents, inspections or assessments.
    CorrectiveActions,
}

impl Collection {
    /// Every known collection.
    pub const ALL: [Collection; 8] = [
        Collection::Incidents,
        Collection::SafetyTrainings,
        Collection::ErgonomicAssessments,
        Collection::MedicalExaminations,
        Collection::RiskAssessments,
        Collection::WorkplaceInspections,
        Collection::PpeIssuances,
        Collection::CorrectiveActions,
    ];

    /// The wire name, e.g. `safety_trainings`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Collection::Incidents => "incidents",
            Collection::SafetyTrainings => "safety_trainings",
            Collection::ErgonomicAssessments => "ergonomic_assessments",
            Collection::MedicalExaminations => "medical_examinations",
            Collection::RiskAssessments => "risk_assessments",
            Collection::WorkplaceInspections => "workplace_inspections",
            Collection::PpeIssuances => "ppe_issuances",
            Collection::CorrectiveActions => "corrective_actions",
        }
    }

    /// Fields an insert must carry besides `id`.
    #[must_use]
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Incidents => &["type"],
            Collection::SafetyTrainings => &["title", "training_date"],
            Collection::ErgonomicAssessments => &["workstation", "method"],
            Collection::MedicalExaminations => &["employee_name", "examination_type"],
            Collection::RiskAssessments => &["hazard", "risk_level"],
            Collection::WorkplaceInspections => &["area", "inspection_date"],
            Collection::PpeIssuances => &["employee_name", "item"],
            Collection::CorrectiveActions => &["description", "status"],
        }
    }

    /// Parses a wire name.
    ///
    /// # Errors
    ///
    /// [`ModelError::UnknownCollection`] for any other name.
    pub fn from_name(name: &str) -> ModelResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| ModelError::UnknownCollection {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}
