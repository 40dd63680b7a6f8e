//! `application/whoisi` response encoding: each item is JSON-serialized and
//! prefixed with its length as a 4-byte big-endian integer, concatenated
//! into a single binary body.

use actix_web::{HttpResponse, HttpResponseBuilder};
use serde::Serialize;

pub fn encode<T: Serialize>(builder: &mut HttpResponseBuilder, items: &[T]) -> HttpResponse {
    let mut body = Vec::new();
    for item in items {
        let encoded = serde_json::to_vec(item).unwrap_or_default();
        body.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
        body.extend_from_slice(&encoded);
    }
    builder
        .insert_header(("Content-Type", "application/whoisi"))
        .insert_header(("Content-Length", body.len().to_string()))
        .body(body)
}
