//! Odoo `crm.lead` adapter over JSON-RPC.
//!
//! Every call is a `POST {url}/jsonrpc` with `method: "call"` and a
//! `service`/`method`/`args` triple. Login happens once per client and the
//! returned uid is reused for `object.execute_kw` calls.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::CrmError;
use crate::lead::LeadField;

use super::{CrmBackend, LeadId, LeadPayload};

const LEAD_MODEL: &str = "crm.lead";

/// Odoo JSON-RPC client.
pub struct OdooClient {
    http: reqwest::Client,
    url: String,
    db: String,
    user: String,
    password: SecretString,
    uid: Mutex<Option<i64>>,
    next_id: AtomicU64,
}

impl OdooClient {
    pub fn new(
        url: impl Into<String>,
        db: impl Into<String>,
        user: impl Into<String>,
        password: SecretString,
    ) -> Result<Self, CrmError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CrmError::RemoteUnavailable(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            db: db.into(),
            user: user.into(),
            password,
            uid: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, CrmError> {
        Self::new(
            &config.odoo_url,
            &config.odoo_db,
            &config.odoo_user,
            config.odoo_password.clone(),
        )
    }

    /// `common.version`, used as a reachability check.
    pub async fn server_version(&self) -> Result<String, CrmError> {
        let result = self.call("common", "version", json!([])).await?;
        Ok(result
            .get("server_version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// Log in, caching the uid for later calls.
    pub async fn authenticate(&self) -> Result<i64, CrmError> {
        let mut uid = self.uid.lock().await;
        if let Some(cached) = *uid {
            return Ok(cached);
        }

        let result = self
            .call(
                "common",
                "login",
                json!([self.db, self.user, self.password.expose_secret()]),
            )
            .await?;

        match result.as_i64() {
            Some(id) if id > 0 => {
                info!(uid = id, db = %self.db, "Authenticated with Odoo");
                *uid = Some(id);
                Ok(id)
            }
            _ => {
                warn!(user = %self.user, db = %self.db, "Odoo login rejected");
                Err(CrmError::Authentication(format!(
                    "Odoo rejected the credentials for user '{}' on database '{}'",
                    self.user, self.db
                )))
            }
        }
    }

    /// Read back selected fields of a lead.
    pub async fn read_lead(&self, id: LeadId) -> Result<Value, CrmError> {
        let result = self
            .execute_kw(
                LEAD_MODEL,
                "read",
                json!([[id.0]]),
                json!({"fields": ["name", "contact_name", "email_from", "phone", "description"]}),
            )
            .await?;
        result
            .as_array()
            .and_then(|rows| rows.first())
            .cloned()
            .ok_or_else(|| CrmError::SchemaRejection {
                message: format!("Lead {} not found", id),
                field: None,
            })
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, CrmError> {
        let uid = self.authenticate().await?;
        let result = self
            .call(
                "object",
                "execute_kw",
                json!([
                    self.db,
                    uid,
                    self.password.expose_secret(),
                    model,
                    method,
                    args,
                    kwargs
                ]),
            )
            .await;

        if matches!(result, Err(CrmError::Authentication(_))) {
            // Password changed since login; force a fresh login next time.
            *self.uid.lock().await = None;
        }
        result
    }

    async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, CrmError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": id,
        });

        debug!(service, method, id, "Odoo JSON-RPC call");

        let response = self
            .http
            .post(format!("{}/jsonrpc", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CrmError::RemoteUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrmError::RemoteUnavailable(format!(
                "Odoo returned HTTP {status}"
            )));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| CrmError::RemoteUnavailable(format!("Malformed JSON-RPC response: {e}")))?;

        match envelope.error {
            Some(fault) => Err(map_fault(service, &fault)),
            None => Ok(envelope.result),
        }
    }
}

#[async_trait]
impl CrmBackend for OdooClient {
    fn name(&self) -> &str {
        "odoo"
    }

    async fn create_lead(&self, payload: &LeadPayload) -> Result<LeadId, CrmError> {
        let result = self
            .execute_kw(LEAD_MODEL, "create", json!([lead_vals(payload)]), json!({}))
            .await?;

        let id = result
            .as_i64()
            .or_else(|| result.as_array()?.first()?.as_i64())
            .ok_or_else(|| {
                CrmError::RemoteUnavailable(format!("Unexpected create result: {result}"))
            })?;

        info!(lead_id = id, contact = %payload.name, "Lead created in Odoo");
        Ok(LeadId(id))
    }
}

/// Map a payload onto `crm.lead` columns.
pub(crate) fn lead_vals(payload: &LeadPayload) -> Value {
    json!({
        "name": format!("{} Lead", payload.name),
        "contact_name": payload.name,
        "email_from": payload.email,
        "phone": payload.phone,
        "description": payload.requirement,
    })
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcFault {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcFaultData>,
}

#[derive(Debug, Deserialize)]
struct RpcFaultData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

/// Odoo exceptions that mean the submitted values were refused.
const DATA_FAULTS: [&str; 4] = ["ValidationError", "UserError", "ValueError", "MissingError"];

/// Classify a JSON-RPC fault into the CRM error taxonomy.
///
/// Only data faults may implicate a lead field. Any `common` service fault
/// (login against a missing database, for instance) is a credentials problem;
/// anything else is treated as the server being unavailable.
pub(crate) fn map_fault(service: &str, fault: &RpcFault) -> CrmError {
    let (name, message) = match &fault.data {
        Some(data) => (data.name.as_str(), data.message.as_str()),
        None => ("", fault.message.as_str()),
    };
    let message = if message.is_empty() {
        fault.message.clone()
    } else {
        message.to_string()
    };
    let exception = name.rsplit('.').next().unwrap_or_default();

    if exception == "AccessDenied"
        || exception == "AccessError"
        || message.eq_ignore_ascii_case("access denied")
        || service == "common"
    {
        return CrmError::Authentication(message);
    }

    if DATA_FAULTS.contains(&exception) {
        return CrmError::SchemaRejection {
            field: implicated_field(&message),
            message,
        };
    }

    CrmError::RemoteUnavailable(message)
}

/// Guess which lead field a remote rejection is about.
fn implicated_field(message: &str) -> Option<LeadField> {
    let lower = message.to_ascii_lowercase();
    [
        ("email_from", LeadField::Email),
        ("email", LeadField::Email),
        ("phone", LeadField::Phone),
        ("contact_name", LeadField::Name),
        ("description", LeadField::Requirement),
    ]
    .into_iter()
    .find(|(needle, _)| lower.contains(needle))
    .map(|(_, field)| field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(raw: Value) -> RpcFault {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn vals_follow_crm_lead_columns() {
        let vals = lead_vals(&LeadPayload {
            name: "Alice".into(),
            email: "alice@example.com".into(),
            phone: "555-1234".into(),
            requirement: "need a website".into(),
        });
        assert_eq!(vals["name"], "Alice Lead");
        assert_eq!(vals["contact_name"], "Alice");
        assert_eq!(vals["email_from"], "alice@example.com");
        assert_eq!(vals["phone"], "555-1234");
        assert_eq!(vals["description"], "need a website");
    }

    #[test]
    fn access_denied_is_authentication() {
        let err = map_fault(
            "object",
            &fault(json!({
                "code": 200,
                "message": "Odoo Server Error",
                "data": {"name": "odoo.exceptions.AccessDenied", "message": "Access Denied"}
            })),
        );
        assert_eq!(err, CrmError::Authentication("Access Denied".into()));
    }

    #[test]
    fn login_fault_on_missing_database_is_authentication() {
        let err = map_fault(
            "common",
            &fault(json!({
                "code": 200,
                "message": "Odoo Server Error",
                "data": {
                    "name": "psycopg2.OperationalError",
                    "message": "connection failed: FATAL:  database \"sales\" does not exist"
                }
            })),
        );
        assert!(matches!(err, CrmError::Authentication(msg) if msg.contains("does not exist")));
    }

    #[test]
    fn validation_error_is_schema_rejection_with_field() {
        let err = map_fault(
            "object",
            &fault(json!({
                "code": 200,
                "message": "Odoo Server Error",
                "data": {
                    "name": "odoo.exceptions.ValidationError",
                    "message": "Invalid value for field email_from"
                }
            })),
        );
        assert_eq!(
            err,
            CrmError::SchemaRejection {
                message: "Invalid value for field email_from".into(),
                field: Some(LeadField::Email),
            }
        );
    }

    #[test]
    fn user_and_value_errors_are_schema_rejections() {
        for name in ["odoo.exceptions.UserError", "builtins.ValueError", "odoo.exceptions.MissingError"] {
            let err = map_fault(
                "object",
                &fault(json!({"code": 200, "message": "Odoo Server Error",
                    "data": {"name": name, "message": "Wrong value for phone"}})),
            );
            assert_eq!(
                err,
                CrmError::SchemaRejection {
                    message: "Wrong value for phone".into(),
                    field: Some(LeadField::Phone),
                },
                "{name}"
            );
        }
    }

    #[test]
    fn server_crash_is_remote_unavailable_and_blames_no_field() {
        let err = map_fault(
            "object",
            &fault(json!({
                "code": 200,
                "message": "Odoo Server Error",
                "data": {"name": "builtins.KeyError", "message": "'phone_sanitized'"}
            })),
        );
        assert_eq!(err, CrmError::RemoteUnavailable("'phone_sanitized'".into()));
    }

    #[test]
    fn database_error_on_create_is_remote_unavailable() {
        let err = map_fault(
            "object",
            &fault(json!({
                "code": 200,
                "message": "Odoo Server Error",
                "data": {
                    "name": "psycopg2.OperationalError",
                    "message": "database \"sales\" does not exist"
                }
            })),
        );
        assert!(matches!(err, CrmError::RemoteUnavailable(_)));
    }

    #[test]
    fn bare_fault_without_data_is_remote_unavailable() {
        let err = map_fault("object", &fault(json!({"code": 200, "message": "Odoo Server Error"})));
        assert_eq!(err, CrmError::RemoteUnavailable("Odoo Server Error".into()));
    }

    #[test]
    fn implicated_field_detection() {
        assert_eq!(implicated_field("bad phone format"), Some(LeadField::Phone));
        assert_eq!(
            implicated_field("description too long"),
            Some(LeadField::Requirement)
        );
        assert_eq!(implicated_field("something else"), None);
    }
}
