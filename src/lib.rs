//! Lead intake — conversational lead capture feeding an Odoo CRM.

pub mod agent;
pub mod channels;
pub mod config;
pub mod crm;
pub mod error;
pub mod lead;
pub mod llm;
