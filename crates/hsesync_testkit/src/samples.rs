//! Sample HSE records.

use hsesync_model::{
    Collection, CorrectiveAction, Document, ErgonomicAssessment, Incident, RiskAssessment,
    WorkplaceInspection,
};
use serde_json::json;

/// A near-miss incident.
pub fn incident(id: &str) -> Incident {
    Incident {
        id: id.to_string(),
        incident_type: "near_miss".into(),
        title: Some("Forklift reversed without spotter".into()),
        severity: Some("medium".into()),
        location: Some("Warehouse B, aisle 4".into()),
        ..Default::default()
    }
}

/// [`incident`] as a document.
pub fn incident_document(id: &str) -> Document {
    Document::from_value(json!({
        "id": id,
        "type": "near_miss",
        "title": "Forklift reversed without spotter",
        "severity": "medium",
        "location": "Warehouse B, aisle 4",
    }))
    .expect("object literal")
}

/// A REBA assessment of a packing station.
pub fn ergonomic_assessment(id: &str) -> ErgonomicAssessment {
    ErgonomicAssessment {
        id: id.to_string(),
        workstation: "Packing line 2".into(),
        method: "REBA".into(),
        score: Some(8.0),
        risk_level: Some("high".into()),
        ..Default::default()
    }
}

/// A noise hazard.
pub fn risk_assessment(id: &str) -> RiskAssessment {
    RiskAssessment {
        id: id.to_string(),
        hazard: "Noise above 85 dB(A)".into(),
        risk_level: "medium".into(),
        likelihood: Some(4),
        consequence: Some(3),
        ..Default::default()
    }
}

/// A loading dock inspection.
pub fn inspection(id: &str) -> WorkplaceInspection {
    WorkplaceInspection {
        id: id.to_string(),
        area: "Loading dock".into(),
        inspection_date: "2024-03-02".into(),
        findings: Some(vec!["Dock plate worn".into(), "Exit sign unlit".into()]),
        ..Default::default()
    }
}

/// An open corrective action raised by `source_id`.
pub fn corrective_action(id: &str, source_id: &str) -> CorrectiveAction {
    CorrectiveAction {
        id: id.to_string(),
        description: "Replace dock plate".into(),
        status: "open".into(),
        source_id: Some(source_id.to_string()),
        ..Default::default()
    }
}

/// A minimal insertable document for any collection.
pub fn minimal(collection: Collection, id: &str) -> Document {
    let mut doc = Document::with_id(id);
    for field in collection.required_fields() {
        doc.insert(*field, json!(format!("sample {field}")));
    }
    doc
}
