#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;
#[macro_use]
extern crate slog_scope;

#[macro_use]
mod batch;
pub mod error;
mod models;
mod pool;
mod schema;
#[cfg(test)]
mod test;

pub use error::DbError;
pub use models::SqliteDb;
pub use pool::SqliteDbPool;

pub(crate) type DbResult<T> = Result<T, DbError>;
