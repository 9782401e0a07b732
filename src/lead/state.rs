//! Lead state machine — merges extracted candidates and tracks completeness.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

use super::extract::ExtractionResult;
use super::model::{FieldValue, LeadField, LeadRecord};
use super::validate::validate_field;

/// Completeness phase of the lead.
///
/// Progresses: Collecting → ReadyToSubmit → Submitted. A CRM schema
/// rejection is the only way back from ReadyToSubmit to Collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadPhase {
    #[default]
    Collecting,
    ReadyToSubmit,
    Submitted,
}

impl LeadPhase {
    /// Check if a forward transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: LeadPhase) -> bool {
        use LeadPhase::*;
        matches!(
            (self, target),
            (Collecting, ReadyToSubmit) | (ReadyToSubmit, Submitted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted)
    }
}

impl std::fmt::Display for LeadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Collecting => "collecting",
            Self::ReadyToSubmit => "ready_to_submit",
            Self::Submitted => "submitted",
        };
        write!(f, "{s}")
    }
}

/// User input for a field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRejection {
    pub field: LeadField,
    pub value: String,
    pub reason: String,
}

/// What a single merge changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Fields that took a new validated value.
    pub accepted: Vec<LeadField>,
    /// Candidates that failed validation in this merge.
    pub rejected: Vec<FieldRejection>,
    /// Whether this merge moved the lead to ReadyToSubmit.
    pub became_ready: bool,
}

/// Owns the `LeadRecord` for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadTracker {
    record: LeadRecord,
    phase: LeadPhase,
    rejections: BTreeMap<LeadField, FieldRejection>,
}

impl LeadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> &LeadRecord {
        &self.record
    }

    pub fn phase(&self) -> LeadPhase {
        self.phase
    }

    pub fn missing_fields(&self) -> Vec<LeadField> {
        self.record.missing_fields()
    }

    pub fn validated_count(&self) -> usize {
        self.record.validated_count()
    }

    /// Outstanding rejections, one per field at most.
    pub fn rejections(&self) -> impl Iterator<Item = &FieldRejection> {
        self.rejections.values()
    }

    /// Merge extraction candidates into the record.
    ///
    /// Valid candidates replace the current value unless it was validated
    /// with higher confidence. Invalid candidates never touch the record.
    pub fn merge(&mut self, result: &ExtractionResult) -> Result<MergeOutcome, TrackerError> {
        if self.phase.is_terminal() {
            return Err(TrackerError::AlreadySubmitted);
        }

        let mut outcome = MergeOutcome::default();
        for candidate in result.candidates() {
            let field = candidate.field;
            match validate_field(field, &candidate.value) {
                Ok(()) => {
                    let slot = self.record.slot_mut(field);
                    let replace = match slot {
                        Some(existing) => candidate.confidence >= existing.confidence,
                        None => true,
                    };
                    if !replace {
                        tracing::debug!(
                            %field,
                            "Keeping higher-confidence value over new candidate"
                        );
                        continue;
                    }
                    *slot = Some(FieldValue::new(candidate.value.trim(), candidate.confidence));
                    self.rejections.remove(&field);
                    outcome.rejected.retain(|r| r.field != field);
                    if !outcome.accepted.contains(&field) {
                        outcome.accepted.push(field);
                    }
                }
                Err(reason) => {
                    tracing::debug!(%field, %reason, "Rejected extracted value");
                    let rejection = FieldRejection {
                        field,
                        value: candidate.value.trim().to_string(),
                        reason,
                    };
                    self.rejections.insert(field, rejection.clone());
                    outcome.rejected.retain(|r| r.field != field);
                    outcome.rejected.push(rejection);
                }
            }
        }

        if self.phase == LeadPhase::Collecting && self.record.is_complete() {
            self.phase = LeadPhase::ReadyToSubmit;
            outcome.became_ready = true;
        }

        Ok(outcome)
    }

    /// Move to the terminal phase after the CRM accepted the lead.
    pub fn mark_submitted(&mut self) -> Result<(), TrackerError> {
        if !self.phase.can_transition_to(LeadPhase::Submitted) {
            return Err(TrackerError::NotReady { phase: self.phase });
        }
        self.phase = LeadPhase::Submitted;
        Ok(())
    }

    /// Clear a field the CRM refused, returning the lead to Collecting.
    pub fn reopen(&mut self, field: LeadField, reason: impl Into<String>) -> Result<(), TrackerError> {
        if self.phase.is_terminal() {
            return Err(TrackerError::AlreadySubmitted);
        }
        let previous = self.record.slot_mut(field).take();
        self.rejections.insert(
            field,
            FieldRejection {
                field,
                value: previous.map(|v| v.value).unwrap_or_default(),
                reason: reason.into(),
            },
        );
        self.phase = LeadPhase::Collecting;
        Ok(())
    }
}
