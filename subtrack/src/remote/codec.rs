//! Firestore document encoding
//!
//! Every subscription field is stored as a `stringValue`. Documents written
//! by other clients may carry `timestampValue` or `integerValue` entries;
//! those are read back as strings too.

use crate::database::{FieldChanges, Subscription, SubscriptionFields};
use crate::error::{RemoteError, RemoteResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// A document as returned by the REST API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// One element of a `:runQuery` response stream
#[derive(Debug, Deserialize)]
pub struct RunQueryItem {
    #[serde(default)]
    pub document: Option<Document>,
}

/// Error envelope returned on non-2xx responses
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// Request body for a write
#[derive(Debug, Serialize)]
pub struct DocumentBody {
    pub fields: Map<String, Value>,
}

/// Encode field changes as Firestore string values
pub fn encode_fields(changes: &FieldChanges) -> DocumentBody {
    let fields = changes
        .iter()
        .map(|(name, value)| (name.to_string(), json!({ "stringValue": value })))
        .collect();

    DocumentBody { fields }
}

pub fn encode_document(fields: &SubscriptionFields) -> DocumentBody {
    encode_fields(&fields.to_field_map())
}

/// Last path segment of a document name
pub fn document_id(name: &str) -> RemoteResult<String> {
    name.rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RemoteError::InvalidResponse(format!("bad document name: {}", name)))
}

pub fn decode_document(doc: &Document) -> RemoteResult<Subscription> {
    let id = document_id(&doc.name)?;

    let mut map = BTreeMap::new();
    for (name, value) in &doc.fields {
        if let Some(text) = scalar_text(value) {
            map.insert(name.clone(), text);
        }
    }

    let fields = SubscriptionFields::from_field_map(&map)
        .map_err(|e| RemoteError::InvalidResponse(format!("document {}: {}", id, e)))?;

    Ok(Subscription::from_fields(id, fields))
}

/// Decode a `:runQuery` response, skipping bodies without a document.
/// Documents that do not decode are logged and left out.
pub fn decode_query(items: Vec<RunQueryItem>) -> Vec<Subscription> {
    items
        .into_iter()
        .filter_map(|item| item.document)
        .filter_map(|doc| match decode_document(&doc) {
            Ok(sub) => Some(sub),
            Err(e) => {
                tracing::warn!("Skipping undecodable document: {}", e);
                None
            }
        })
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    let obj = value.as_object()?;

    if let Some(s) = obj.get("stringValue").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    if let Some(s) = obj.get("timestampValue").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    match obj.get("integerValue") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Query selecting the whole collection ordered by end date
pub fn ordered_query(collection: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "orderBy": [{
                "field": { "fieldPath": "endDate" },
                "direction": "ASCENDING"
            }]
        }
    })
}

/// Map an HTTP failure onto the remote error taxonomy
pub fn classify_failure(status: u16, body: &str) -> RemoteError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let (message, grpc_status) = match &parsed {
        Some(env) => (env.error.message.clone(), env.error.status.as_str()),
        None => (body.trim().to_string(), ""),
    };

    match (status, grpc_status) {
        (_, "PERMISSION_DENIED") | (_, "UNAUTHENTICATED") | (401, _) | (403, _) => {
            RemoteError::PermissionDenied(message)
        }
        (_, "NOT_FOUND") | (404, _) => RemoteError::NotFound(message),
        _ => RemoteError::Unavailable(format!("HTTP {}: {}", status, message)),
    }
}
