use std::fmt;

use backtrace::Backtrace;
use http::StatusCode;
use syncserver_common::{from_error, impl_fmt_display, InternalError, ReportableError};
use thiserror::Error;

/// Errors from the memcached client.
///
/// Per the fault-tolerance invariant, most of these are swallowed by the
/// `Cache` impl and never reach a caller: a `CacheError` only escapes
/// `Cache::get`/`Cache::set` when the caller has explicitly opted out of the
/// miss-on-error behavior (tabs' cache-is-authoritative callers).
#[derive(Debug)]
pub struct CacheError {
    kind: CacheErrorKind,
    pub status: StatusCode,
    pub backtrace: Box<Backtrace>,
}

#[derive(Debug, Error)]
enum CacheErrorKind {
    #[error("{}", _0)]
    Memcache(memcache::MemcacheError),

    #[error("error deserializing cached value: {}", _0)]
    Serde(serde_json::Error),

    #[error("{}", _0)]
    Internal(String),
}

impl CacheError {
    pub fn internal(msg: &str) -> Self {
        CacheErrorKind::Internal(msg.to_owned()).into()
    }
}

impl From<CacheErrorKind> for CacheError {
    fn from(kind: CacheErrorKind) -> Self {
        Self {
            kind,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            backtrace: Box::new(Backtrace::new()),
        }
    }
}

impl ReportableError for CacheError {
    fn error_backtrace(&self) -> String {
        format!("{:#?}", self.backtrace)
    }

    fn is_sentry_event(&self) -> bool {
        true
    }

    fn metric_label(&self) -> Option<String> {
        None
    }
}

impl InternalError for CacheError {
    fn internal_error(message: String) -> Self {
        CacheError::internal(&message)
    }
}

impl_fmt_display!(CacheError, CacheErrorKind);

from_error!(memcache::MemcacheError, CacheError, CacheErrorKind::Memcache);
from_error!(serde_json::Error, CacheError, CacheErrorKind::Serde);
