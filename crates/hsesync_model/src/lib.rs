//! # hsesync model
//!
//! The data the offline subsystem moves around:
//! - [`Collection`]: the closed set of remote collections and what an insert
//!   into each must carry
//! - [`Document`]: a JSON object record, validated per collection and kind
//! - [`PendingOperation`] and [`AttemptRecord`]: queued writes and their
//!   retry bookkeeping
//! - typed [`Record`]s, one struct per collection
//!
//! This crate does no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod document;
mod error;
mod operation;
pub mod records;

pub use collection::Collection;
pub use document::{Document, ID_FIELD};
pub use error::{ModelError, ModelResult};
pub use operation::{now_millis, AttemptRecord, OperationKind, PendingOperation};
pub use records::{
    CorrectiveAction, ErgonomicAssessment, Incident, MedicalExamination, PpeIssuance, Record,
    RiskAssessment, SafetyTraining, WorkplaceInspection,
};
