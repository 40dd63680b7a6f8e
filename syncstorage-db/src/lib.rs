//! Generic db abstration.

pub mod mock;

pub type DbPoolImpl = syncstorage_sqlite::SqliteDbPool;
pub use syncstorage_sqlite::DbError;
pub type DbImpl = syncstorage_sqlite::SqliteDb;

pub use syncserver_db_common::{GetPoolState, PoolState};
pub use syncstorage_db_common::error::DbErrorIntrospect;

pub use syncstorage_db_common::{
    params, results,
    util::{to_rfc3339, SyncTimestamp},
    Db, DbPool, Sorting, UserIdentifier,
};
