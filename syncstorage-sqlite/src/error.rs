use std::fmt;

use backtrace::Backtrace;
use http::StatusCode;
use syncserver_common::{from_error, impl_fmt_display, InternalError, ReportableError};
use syncstorage_db_common::error::{DbErrorIntrospect, SyncstorageDbError};
use thiserror::Error;

/// An error type wrapping the syncstorage application errors together with whatever
/// diesel/r2d2/sqlite specific errors bubble up while servicing a request.
#[derive(Debug)]
pub struct DbError {
    kind: DbErrorKind,
    pub status: StatusCode,
    pub backtrace: Box<Backtrace>,
}

#[derive(Debug, Error)]
enum DbErrorKind {
    #[error("{}", _0)]
    Common(SyncstorageDbError),

    #[error("{}", _0)]
    Sqlite(diesel::result::Error),

    #[error("{}", _0)]
    SqliteConnection(diesel::result::ConnectionError),

    #[error("{}", _0)]
    Pool(diesel::r2d2::PoolError),

    #[error("{}", _0)]
    Migration(diesel_migrations::RunMigrationsError),
}

impl DbError {
    pub fn batch_not_found() -> Self {
        DbErrorKind::Common(SyncstorageDbError::batch_not_found()).into()
    }

    pub fn bso_not_found() -> Self {
        DbErrorKind::Common(SyncstorageDbError::bso_not_found()).into()
    }

    pub fn collection_not_found() -> Self {
        DbErrorKind::Common(SyncstorageDbError::collection_not_found()).into()
    }

    pub fn conflict() -> Self {
        DbErrorKind::Common(SyncstorageDbError::conflict()).into()
    }

    pub fn internal(msg: String) -> Self {
        DbErrorKind::Common(SyncstorageDbError::internal(msg)).into()
    }

    pub fn quota() -> Self {
        DbErrorKind::Common(SyncstorageDbError::quota()).into()
    }
}

impl From<DbErrorKind> for DbError {
    fn from(kind: DbErrorKind) -> Self {
        let status = match &kind {
            DbErrorKind::Common(dbe) => dbe.status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            kind,
            status,
            backtrace: Box::new(Backtrace::new()),
        }
    }
}

impl DbErrorIntrospect for DbError {
    fn is_sentry_event(&self) -> bool {
        match &self.kind {
            DbErrorKind::Common(dbe) => dbe.is_sentry_event(),
            _ => true,
        }
    }

    fn metric_label(&self) -> Option<String> {
        match &self.kind {
            DbErrorKind::Common(dbe) => dbe.metric_label(),
            _ => None,
        }
    }

    fn is_collection_not_found(&self) -> bool {
        matches!(&self.kind, DbErrorKind::Common(dbe) if dbe.is_collection_not_found())
    }

    fn is_conflict(&self) -> bool {
        matches!(&self.kind, DbErrorKind::Common(dbe) if dbe.is_conflict())
    }

    fn is_quota(&self) -> bool {
        matches!(&self.kind, DbErrorKind::Common(dbe) if dbe.is_quota())
    }

    fn is_bso_not_found(&self) -> bool {
        matches!(&self.kind, DbErrorKind::Common(dbe) if dbe.is_bso_not_found())
    }

    fn is_batch_not_found(&self) -> bool {
        matches!(&self.kind, DbErrorKind::Common(dbe) if dbe.is_batch_not_found())
    }
}

impl ReportableError for DbError {
    fn error_backtrace(&self) -> String {
        format!("{:#?}", self.backtrace)
    }

    fn is_sentry_event(&self) -> bool {
        DbErrorIntrospect::is_sentry_event(self)
    }

    fn metric_label(&self) -> Option<String> {
        DbErrorIntrospect::metric_label(self)
    }
}

impl InternalError for DbError {
    fn internal_error(message: String) -> Self {
        DbError::internal(message)
    }
}

impl_fmt_display!(DbError, DbErrorKind);

from_error!(SyncstorageDbError, DbError, DbErrorKind::Common);
from_error!(diesel::result::Error, DbError, DbErrorKind::Sqlite);
from_error!(
    diesel::result::ConnectionError,
    DbError,
    DbErrorKind::SqliteConnection
);
from_error!(diesel::r2d2::PoolError, DbError, DbErrorKind::Pool);
from_error!(
    diesel_migrations::RunMigrationsError,
    DbError,
    DbErrorKind::Migration
);
