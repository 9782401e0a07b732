//! Lead collection — turning free-form dialogue into a validated lead.
//!
//! Each user turn is sent through the `Extractor`, which asks the model for
//! field candidates plus the next reply. The `LeadTracker` validates and
//! merges candidates into the running `LeadRecord` and decides when the lead
//! is ready to submit.

pub mod extract;
pub mod model;
pub mod prompts;
pub mod state;
pub mod validate;

pub use extract::{Extraction, ExtractionResult, Extractor, ExtractorConfig, FieldCandidate, TokenUsage};
pub use model::{ConversationTurn, FieldValue, LeadField, LeadRecord, Speaker};
pub use state::{FieldRejection, LeadPhase, LeadTracker, MergeOutcome};
pub use validate::{validate_email, validate_field, validate_non_empty, validate_phone};
