//! Types for parsing and authenticating Hawk headers.
//!
//! A Hawk `id` is a base64-encoded, HMAC-signed JSON payload minted by the
//! token-issuing service and handed back to us unmodified by the client.
//! Decoding it yields the `(user_id, node_name, request_key, principal)`
//! tuple the storage core treats as an opaque, pre-validated identity.

use actix_web::dev::ConnectionInfo;
use actix_web::http::Uri;
use base64::{engine, Engine};
use chrono::offset::Utc;
use hawk::{Header as HawkHeader, Key, RequestBuilder};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use syncserver_common::hkdf_expand_32;
use syncserver_settings::Secrets;
use time::Duration;

use super::error::HawkErrorKind;
use crate::error::{ApiError, ApiErrorKind};

/// Clock skew tolerance for the Hawk signature's timestamp.
const HAWK_SKEW: Duration = Duration::seconds(60);

/// A token up to this many seconds past its nominal expiry is still accepted,
/// but downgraded to the `expired:<uid>` principal.
const EXPIRY_GRACE_SECS: i64 = 300;

/// The identity a validated Hawk token resolves to.
///
/// `Expired` is returned for tokens within [`EXPIRY_GRACE_SECS`] of their
/// nominal expiry, letting read-only endpoints keep serving clients mid
/// token-rotation while writes are refused.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Principal {
    Current(u64),
    Expired(u64),
}

impl Default for Principal {
    fn default() -> Self {
        Principal::Current(0)
    }
}

impl Principal {
    pub fn user_id(&self) -> u64 {
        match *self {
            Principal::Current(uid) | Principal::Expired(uid) => uid,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Principal::Expired(_))
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::Current(uid) => write!(f, "{}", uid),
            Principal::Expired(uid) => write!(f, "expired:{}", uid),
        }
    }
}

/// A parsed and authenticated JSON payload extracted from the signed `id`
/// property of a Hawk `Authorization` header.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct HawkPayload {
    /// Nominal expiry time for the payload, in seconds since the epoch.
    pub expires: f64,

    /// Base URI for the storage node; must match the request's `Host`.
    pub node: String,

    /// Salt used during HKDF-expansion of the token secret.
    pub salt: String,

    /// User identifier.
    #[serde(rename = "uid")]
    pub user_id: u64,
}

impl HawkPayload {
    /// Parse, authenticate, and resolve the principal for a raw
    /// `Authorization` header.
    ///
    /// `header` is expected to include the `Hawk ` prefix, as delivered by
    /// the client. Returns `(user_id, node_name, request_key, principal)`.
    pub fn extrude(
        header: &str,
        method: &str,
        secrets: &Secrets,
        connection_info: &ConnectionInfo,
        uri: &Uri,
    ) -> Result<(u64, String, Vec<u8>, Principal), ApiError> {
        if header.len() < 5 || &header[0..5] != "Hawk " {
            Err(HawkErrorKind::MissingPrefix)?;
        }

        let host_port: Vec<_> = connection_info.host().splitn(2, ':').collect();
        let host = host_port[0];
        let port = if host_port.len() == 2 {
            host_port[1]
                .parse()
                .map_err(|_| -> ApiError { HawkErrorKind::InvalidHeader.into() })?
        } else if connection_info.scheme() == "https" {
            443
        } else {
            80
        };
        let path = uri
            .path_and_query()
            .ok_or(HawkErrorKind::MissingPath)?
            .as_str();

        let hawk_header: HawkHeader = header[5..]
            .parse()
            .map_err(|e| -> ApiError { HawkErrorKind::Parse(e).into() })?;
        let id = hawk_header.id.as_ref().ok_or(HawkErrorKind::MissingId)?;

        let (payload, request_key) = Self::extract_and_validate(id, secrets)?;

        if !payload.node.eq_ignore_ascii_case(connection_info.host()) {
            Err(HawkErrorKind::InvalidHeader)?;
        }

        let request = RequestBuilder::new(method, host, port, path).request();
        let key = Key::new(request_key.as_slice(), hawk::DigestAlgorithm::Sha256)?;
        if !request.validate_header(&hawk_header, &key, HAWK_SKEW) {
            Err(HawkErrorKind::InvalidHeader)?;
        }

        let principal = Self::resolve_principal(&payload, Utc::now().timestamp())?;
        Ok((payload.user_id, payload.node.clone(), request_key, principal))
    }

    /// Decode the `id` property of a Hawk header, verify the payload part
    /// against the signature part, and derive the per-request key.
    fn extract_and_validate(id: &str, secrets: &Secrets) -> Result<(Self, Vec<u8>), ApiError> {
        let decoded_id = engine::general_purpose::URL_SAFE
            .decode(id)
            .map_err(|e| -> ApiError { HawkErrorKind::Base64(e).into() })?;
        if decoded_id.len() <= 32 {
            Err(HawkErrorKind::TruncatedId)?;
        }

        let payload_length = decoded_id.len() - 32;
        let payload_bytes = &decoded_id[0..payload_length];
        let signature = &decoded_id[payload_length..];

        verify_hmac(payload_bytes, &secrets.signing_secret, signature)?;

        let payload: HawkPayload = serde_json::from_slice(payload_bytes)
            .map_err(|e| -> ApiError { HawkErrorKind::Json(e).into() })?;

        let request_key = hkdf_expand_32(
            format!("services.mozilla.com/tokenlib/v1/derive/{}", id).as_bytes(),
            Some(payload.salt.as_bytes()),
            &secrets.master_secret,
        )
        .map_err(|e| ApiError::from(ApiErrorKind::Internal(e)))?;

        Ok((payload, request_key.to_vec()))
    }

    /// Resolve the `(uid | expired:uid)` principal, rejecting tokens whose
    /// expiry is older than [`EXPIRY_GRACE_SECS`] outright.
    fn resolve_principal(payload: &HawkPayload, now: i64) -> Result<Principal, ApiError> {
        let expires = payload.expires.round() as i64;
        if expires > now {
            Ok(Principal::Current(payload.user_id))
        } else if now - expires <= EXPIRY_GRACE_SECS {
            Ok(Principal::Expired(payload.user_id))
        } else {
            Err(HawkErrorKind::Expired.into())
        }
    }

    #[cfg(test)]
    pub fn test_default(user_id: u64) -> Self {
        // Matches the `ConnectionInfo::host()` actix-web derives for a
        // `TestRequest` with no explicit `Host` header.
        HawkPayload {
            expires: Utc::now().timestamp() as f64 + 200_000.0,
            node: "localhost:8080".to_string(),
            salt: "saltysalt".to_string(),
            user_id,
        }
    }
}

fn verify_hmac(info: &[u8], key: &[u8], expected: &[u8]) -> Result<(), ApiError> {
    let mut hmac = Hmac::<Sha256>::new_from_slice(key)?;
    hmac.update(info);
    hmac.verify_slice(expected)
        .map_err(|e| -> ApiError { HawkErrorKind::Hmac(e).into() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_user_id_and_display() {
        assert_eq!(Principal::Current(42).user_id(), 42);
        assert_eq!(Principal::Expired(42).user_id(), 42);
        assert!(!Principal::Current(42).is_expired());
        assert!(Principal::Expired(42).is_expired());
        assert_eq!(Principal::Current(42).to_string(), "42");
        assert_eq!(Principal::Expired(42).to_string(), "expired:42");
    }

    #[test]
    fn resolve_principal_not_yet_expired() {
        let payload = HawkPayload::test_default(7);
        let now = Utc::now().timestamp();
        let principal = HawkPayload::resolve_principal(&payload, now).unwrap();
        assert_eq!(principal, Principal::Current(7));
    }

    #[test]
    fn resolve_principal_within_grace_period() {
        let mut payload = HawkPayload::test_default(7);
        let now = Utc::now().timestamp();
        payload.expires = (now - EXPIRY_GRACE_SECS + 1) as f64;
        let principal = HawkPayload::resolve_principal(&payload, now).unwrap();
        assert_eq!(principal, Principal::Expired(7));
    }

    #[test]
    fn resolve_principal_beyond_grace_period_is_rejected() {
        let mut payload = HawkPayload::test_default(7);
        let now = Utc::now().timestamp();
        payload.expires = (now - EXPIRY_GRACE_SECS - 1) as f64;
        assert!(HawkPayload::resolve_principal(&payload, now).is_err());
    }
}
