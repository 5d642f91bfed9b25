// SPDX-License-Identifier: MIT

//! Webhook route for amoCRM events.
//!
//! amoCRM posts either JSON or a form-urlencoded body with bracketed keys
//! (`leads[add][0][name]=...`). Both are decoded into the same JSON tree
//! before classification, so the pipeline sees one payload shape.

use crate::services::webhook::classify;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/amocrm/webhook", post(handle_webhook))
}

/// Handle an inbound webhook delivery (POST).
///
/// Always answers 200 for anything the pipeline can process, including
/// unrecognized payloads; 500 only on an internal fault, which is logged
/// with the payload attached and never re-thrown.
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let payload = parse_payload(&headers, &body);
    tracing::debug!(payload = %payload, "Webhook payload received");

    let event = classify(&payload);
    match state.webhook_service.handle(event).await {
        Ok(()) => (StatusCode::OK, "Webhook обработан"),
        Err(e) => {
            tracing::error!(
                error = %e,
                payload = %payload,
                "Critical error while processing amoCRM webhook"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Ошибка обработки вебхука")
        }
    }
}

/// Decode the request body into a JSON tree. An undecodable body yields
/// `Value::Null`, which classifies as unrecognized downstream.
fn parse_payload(headers: &HeaderMap, body: &Bytes) -> Value {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.contains("json") {
        return serde_json::from_slice(body).unwrap_or(Value::Null);
    }

    match std::str::from_utf8(body) {
        Ok(text) => decode_form_payload(text),
        Err(_) => Value::Null,
    }
}

/// Decode a form-urlencoded body with PHP-style bracketed keys into nested
/// objects/arrays: `leads[add][0][id]=42` becomes `{"leads":{"add":[{"id":"42"}]}}`.
/// All scalar values stay strings, as the provider sends them.
fn decode_form_payload(body: &str) -> Value {
    let mut root = Value::Object(Map::new());

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = match urlencoding::decode(&raw_key.replace('+', " ")) {
            Ok(k) => k.into_owned(),
            Err(_) => continue,
        };
        let value = match urlencoding::decode(&raw_value.replace('+', " ")) {
            Ok(v) => v.into_owned(),
            Err(_) => continue,
        };

        let path = parse_bracket_path(&key);
        if !path.is_empty() {
            insert_at_path(&mut root, &path, Value::String(value));
        }
    }

    root
}

/// Split `leads[add][0][name]` into `["leads", "add", "0", "name"]`.
fn parse_bracket_path(key: &str) -> Vec<String> {
    let mut path = Vec::new();
    let head_end = key.find('[').unwrap_or(key.len());
    if head_end > 0 {
        path.push(key[..head_end].to_string());
    }

    let mut rest = &key[head_end..];
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else {
            break;
        };
        path.push(rest[open + 1..open + close].to_string());
        rest = &rest[open + close + 1..];
    }

    path
}

fn insert_at_path(node: &mut Value, path: &[String], value: Value) {
    let segment = &path[0];
    let is_leaf = path.len() == 1;

    if let Ok(index) = segment.parse::<usize>() {
        if !node.is_array() {
            *node = Value::Array(Vec::new());
        }
        if let Value::Array(items) = node {
            while items.len() <= index {
                items.push(Value::Null);
            }
            if is_leaf {
                items[index] = value;
            } else {
                if items[index].is_null() {
                    items[index] = Value::Object(Map::new());
                }
                insert_at_path(&mut items[index], &path[1..], value);
            }
        }
    } else {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            if is_leaf {
                map.insert(segment.clone(), value);
            } else {
                let child = map
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                insert_at_path(child, &path[1..], value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_bracketed_form_body() {
        let body = "leads%5Badd%5D%5B0%5D%5Bid%5D=42&leads%5Badd%5D%5B0%5D%5Bname%5D=Deal+A";
        let decoded = decode_form_payload(body);
        assert_eq!(
            decoded,
            json!({"leads": {"add": [{"id": "42", "name": "Deal A"}]}})
        );
    }

    #[test]
    fn test_decode_plain_bracket_keys() {
        let body = "contacts[update][0][id]=7&contacts[update][0][responsible_user_id]=3";
        let decoded = decode_form_payload(body);
        assert_eq!(
            decoded,
            json!({"contacts": {"update": [{"id": "7", "responsible_user_id": "3"}]}})
        );
    }

    #[test]
    fn test_decode_scalar_and_empty_pairs() {
        let decoded = decode_form_payload("a=1&&b=");
        assert_eq!(decoded, json!({"a": "1", "b": ""}));
    }

    #[test]
    fn test_parse_bracket_path() {
        assert_eq!(
            parse_bracket_path("leads[add][0][name]"),
            vec!["leads", "add", "0", "name"]
        );
        assert_eq!(parse_bracket_path("plain"), vec!["plain"]);
    }
}
