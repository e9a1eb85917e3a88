//! Wire types exchanged with the SSN API

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::presentation::DeliveryKind;

/// Body of the login call
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    #[serde(rename = "USER")]
    pub user: &'a str,
    #[serde(rename = "CIA")]
    pub cia: &'a str,
    #[serde(rename = "PASSWORD")]
    pub password: &'a str,
}

/// Fields we consume from a successful login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub fecha_expiracion: Option<String>,
}

/// Normalized result of an authenticate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityLogin {
    pub token: String,
    /// Expiration exactly as the regulator (or the mock config) reported it
    pub expiration: String,
    pub success: bool,
    pub mock: bool,
}

/// A holdings filing as sent to the regulator
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingPayload {
    pub codigo_compania: String,
    pub cronograma: String,
    pub tipo_entrega: &'static str,
    pub stocks: Vec<JsonValue>,
    #[serde(skip)]
    pub kind: DeliveryKind,
}

/// Request to reopen an accepted filing for amendment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RectificationRequest {
    pub codigo_compania: String,
    pub cronograma: String,
    pub tipo_entrega: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motivo: Option<String>,
    #[serde(skip)]
    pub kind: DeliveryKind,
}

/// Regulator acknowledgement of a filing or rectification request
#[derive(Debug, Clone, PartialEq)]
pub struct RegulatorReceipt {
    pub response_id: String,
    pub payload: JsonValue,
}

impl RegulatorReceipt {
    /// Pull the regulator-assigned id out of a response body.
    ///
    /// The SSN answers with `id` on some endpoints and `idPresentacion` on
    /// others; numeric ids are accepted too.
    pub fn from_body(payload: JsonValue) -> Option<Self> {
        let id = ["id", "idPresentacion"]
            .iter()
            .find_map(|key| match payload.get(*key) {
                Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(JsonValue::Number(n)) => Some(n.to_string()),
                _ => None,
            })?;
        Some(Self {
            response_id: id,
            payload,
        })
    }
}
