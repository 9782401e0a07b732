//! CRM submission — maps a completed lead onto the remote CRM.

pub mod odoo;

pub use odoo::OdooClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CrmError;
use crate::lead::{LeadField, LeadRecord};

/// Identifier the CRM assigned to a created lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub i64);

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four validated values sent to the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadPayload {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub requirement: String,
}

impl LeadPayload {
    /// Build from a record; `None` unless every field is validated.
    pub fn from_record(record: &LeadRecord) -> Option<Self> {
        Some(Self {
            name: record.value(LeadField::Name)?.to_string(),
            email: record.value(LeadField::Email)?.to_string(),
            phone: record.value(LeadField::Phone)?.to_string(),
            requirement: record.value(LeadField::Requirement)?.to_string(),
        })
    }
}

/// Result of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Created { lead_id: LeadId },
    Failed { error: CrmError, message: String },
}

impl SubmissionOutcome {
    pub fn failed(error: CrmError) -> Self {
        let message = error.to_string();
        Self::Failed { error, message }
    }

    pub fn lead_id(&self) -> Option<LeadId> {
        match self {
            Self::Created { lead_id } => Some(*lead_id),
            Self::Failed { .. } => None,
        }
    }
}

/// A CRM that can register leads.
#[async_trait]
pub trait CrmBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Authenticate (if needed) and create exactly one lead.
    async fn create_lead(&self, payload: &LeadPayload) -> Result<LeadId, CrmError>;
}
