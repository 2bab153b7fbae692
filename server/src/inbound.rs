//! Inbound mail webhook: a mail provider posts a received message with its
//! attachments as multipart form data.

use axum::{
    extract::{Multipart, State},
    Json,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::errors::ApiError;
use crate::http_server::AppState;

type HmacSha256 = Hmac<Sha256>;

const ATTACHMENT_FIELD: &str = "attachment-1";

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum InboundResponse {
    Records {
        message: &'static str,
        records: Vec<Map<String, Value>>,
    },
    Content {
        message: &'static str,
        content: String,
    },
}

#[derive(Debug, Default)]
struct InboundForm {
    timestamp: Option<String>,
    token: Option<String>,
    signature: Option<String>,
    attachment: Option<Attachment>,
}

#[derive(Debug)]
struct Attachment {
    file_name: Option<String>,
    content_type: Option<String>,
    content: String,
}

impl Attachment {
    fn is_csv(&self) -> bool {
        self.content_type.as_deref() == Some("text/csv")
            || self
                .file_name
                .as_deref()
                .is_some_and(|name| name.ends_with(".csv"))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<InboundForm, ApiError> {
    let mut form = InboundForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "timestamp" => form.timestamp = Some(field.text().await?),
            "token" => form.token = Some(field.text().await?),
            "signature" => form.signature = Some(field.text().await?),
            ATTACHMENT_FIELD => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                form.attachment = Some(Attachment {
                    file_name,
                    content_type,
                    content: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Checks a webhook signature: hex HMAC-SHA256 of `timestamp` followed by `token`
pub fn verify_signature(signing_key: &str, timestamp: &str, token: &str, signature: &str) -> bool {
    let expected = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(signing_key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Parses CSV text with a header row into one object per record
pub fn parse_csv_records(text: &str) -> Result<Vec<Map<String, Value>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    reader
        .records()
        .map(|record| -> Result<Map<String, Value>, csv::Error> {
            let record = record?;
            Ok(headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.to_string(), Value::String(value.to_string())))
                .collect())
        })
        .collect()
}

/// Handler for `POST /api/mailgun-inbound`
pub async fn handle_inbound(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<InboundResponse>, ApiError> {
    let form = read_form(multipart).await?;

    if let Some(signing_key) = &state.config.mailgun_signing_key {
        let verified = match (&form.timestamp, &form.token, &form.signature) {
            (Some(timestamp), Some(token), Some(signature)) => {
                verify_signature(signing_key, timestamp, token, signature)
            }
            _ => false,
        };
        if !verified {
            warn!("Rejected inbound webhook with a bad signature");
            return Err(ApiError::Unauthorized("Invalid webhook signature".to_string()));
        }
    }

    let attachment = form
        .attachment
        .ok_or_else(|| ApiError::BadRequest("No attachment found".to_string()))?;

    if attachment.is_csv() {
        let records = parse_csv_records(&attachment.content)
            .map_err(|e| ApiError::BadRequest(format!("Failed to parse CSV: {}", e)))?;
        info!(records = records.len(), "Parsed inbound CSV attachment");
        return Ok(Json(InboundResponse::Records {
            message: "CSV parsed!",
            records,
        }));
    }

    info!(bytes = attachment.content.len(), "Read inbound attachment");
    Ok(Json(InboundResponse::Content {
        message: "File read!",
        content: attachment.content,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(key: &str, timestamp: &str, token: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{}{}", timestamp, token).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_valid() {
        let signature = sign("key-123", "1700000000", "abc");
        assert!(verify_signature("key-123", "1700000000", "abc", &signature));
    }

    #[test]
    fn test_signature_wrong_key_or_token() {
        let signature = sign("key-123", "1700000000", "abc");
        assert!(!verify_signature("other", "1700000000", "abc", &signature));
        assert!(!verify_signature("key-123", "1700000000", "abd", &signature));
        assert!(!verify_signature("key-123", "1700000000", "abc", "not-hex"));
    }

    #[test]
    fn test_csv_records_keyed_by_header() {
        let records = parse_csv_records("name,score\n민수,10\n지영,\"7\"\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "민수");
        assert_eq!(records[1]["score"], "7");
    }

    #[test]
    fn test_csv_ragged_rows_rejected() {
        assert!(parse_csv_records("a,b\n1,2,3\n").is_err());
    }
}
