#![allow(proc_macro_derive_resolution_fallback)]

use std::{cell::RefCell, collections::HashMap, ops::Deref, sync::Arc};

use async_trait::async_trait;
use diesel::{
    connection::TransactionManager,
    delete,
    dsl::max,
    expression::sql_literal::sql,
    insert_into,
    r2d2::{ConnectionManager, PooledConnection},
    sql_query,
    sql_types::{BigInt, Integer, Nullable, Text},
    sqlite::SqliteConnection,
    update, Connection, ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl,
};
#[cfg(debug_assertions)]
use diesel_logger::LoggingConnection;
use syncserver_common::{BlockingThreadpool, Metrics};
use syncstorage_db_common::{
    error::DbErrorIntrospect, params, results, util::SyncTimestamp, BatchDb, Db, Sorting,
    UserIdentifier, DEFAULT_BSO_TTL,
};
use syncstorage_settings::Quota;

use super::{
    batch,
    pool::CollectionCache,
    schema::{batch_upload_items, bso, collections, user_collections},
    DbError, DbResult,
};

no_arg_sql_function!(last_insert_rowid, Integer);

type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
pub(super) enum CollectionLock {
    Read,
    Write,
}

/// Per session Db metadata
#[derive(Debug)]
struct SqliteDbSession {
    /// The "current time" on the server used for this session's operations
    timestamp: SyncTimestamp,
    /// Cache of collection modified timestamps per (user_id, collection_id)
    coll_modified_cache: HashMap<(u64, i32), SyncTimestamp>,
    /// Currently locked collections
    coll_locks: HashMap<(u64, i32), CollectionLock>,
    quota: Quota,
    in_transaction: bool,
}

impl Default for SqliteDbSession {
    fn default() -> Self {
        Self {
            timestamp: SyncTimestamp::default(),
            coll_modified_cache: Default::default(),
            coll_locks: Default::default(),
            quota: Quota::default(),
            in_transaction: false,
        }
    }
}

/// The `SqliteDb` needs to satisfy the [`Db`] trait's asynchronous interface
/// while the underlying diesel calls are synchronous and block their thread.
/// We run them on a shared `BlockingThreadpool` and serialize access to the
/// connection via the session RefCell.
#[derive(Clone)]
pub struct SqliteDb {
    pub(super) inner: Arc<SqliteDbInner>,
    coll_cache: Arc<CollectionCache>,
}

/// `SqliteDbInner` holds a `!Sync` diesel connection. We never run two calls
/// against the same `SqliteDb` concurrently (they're serialized through the
/// blocking threadpool), so it's sound to mark it `Send`.
unsafe impl Send for SqliteDb {}

pub struct SqliteDbInner {
    #[cfg(not(debug_assertions))]
    pub(super) conn: Conn,
    #[cfg(debug_assertions)]
    pub(super) conn: LoggingConnection<Conn>,

    session: RefCell<SqliteDbSession>,
    metrics: Metrics,
    blocking_threadpool: Arc<BlockingThreadpool>,
}

impl Deref for SqliteDb {
    type Target = SqliteDbInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::fmt::Debug for SqliteDb {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("SqliteDb").finish()
    }
}

impl SqliteDb {
    pub fn new(
        conn: Conn,
        coll_cache: Arc<CollectionCache>,
        metrics: &Metrics,
        quota: &Quota,
        blocking_threadpool: Arc<BlockingThreadpool>,
    ) -> Self {
        let inner = SqliteDbInner {
            #[cfg(not(debug_assertions))]
            conn,
            #[cfg(debug_assertions)]
            conn: LoggingConnection::new(conn),
            session: RefCell::new(SqliteDbSession {
                quota: *quota,
                ..Default::default()
            }),
            metrics: metrics.clone(),
            blocking_threadpool,
        };
        SqliteDb {
            inner: Arc::new(inner),
            coll_cache,
        }
    }

    async fn spawn<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(Self) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        self.blocking_threadpool.spawn(move || f(db)).await
    }

    /// APIs for collection-level locking
    ///
    /// Sqlite has no explicit shared/exclusive row locks. A read lock simply
    /// starts a (deferred) transaction so subsequent reads observe a
    /// consistent snapshot; a write lock starts an immediate transaction so
    /// sqlite takes the reserved lock up front, giving us the same
    /// serialization guarantee that `SELECT ... FOR UPDATE` gives on mysql.
    fn lock_for_read_sync(&self, params: params::LockCollection) -> DbResult<()> {
        let user_id = params.user_id.legacy_id;
        let collection_id =
            self.get_collection_id_sync(&params.collection)
                .or_else(|e| match e {
                    e if e.is_collection_not_found() => Ok(0),
                    e => Err(e),
                })?;
        if self
            .session
            .borrow()
            .coll_locks
            .contains_key(&(user_id, collection_id))
        {
            return Ok(());
        }

        self.begin_sync(false)?;
        let modified = user_collections::table
            .select(user_collections::modified)
            .filter(user_collections::user_id.eq(user_id as i64))
            .filter(user_collections::collection_id.eq(collection_id))
            .first(&self.conn)
            .optional()?;
        if let Some(modified) = modified {
            let modified = SyncTimestamp::from_i64(modified).map_err(DbError::internal)?;
            self.session
                .borrow_mut()
                .coll_modified_cache
                .insert((user_id, collection_id), modified);
        }
        self.session
            .borrow_mut()
            .coll_locks
            .insert((user_id, collection_id), CollectionLock::Read);
        Ok(())
    }

    fn lock_for_write_sync(&self, params: params::LockCollection) -> DbResult<()> {
        let user_id = params.user_id.legacy_id;
        let collection_id = self.get_or_create_collection_id_sync(&params.collection)?;
        if let Some(CollectionLock::Read) = self.session.borrow().coll_locks.get(&(user_id, collection_id)) {
            return Err(DbError::internal(
                "Can't escalate read-lock to write-lock".to_owned(),
            ));
        }

        self.begin_sync(true)?;
        let modified = user_collections::table
            .select(user_collections::modified)
            .filter(user_collections::user_id.eq(user_id as i64))
            .filter(user_collections::collection_id.eq(collection_id))
            .first(&self.conn)
            .optional()?;
        if let Some(modified) = modified {
            let modified = SyncTimestamp::from_i64(modified).map_err(DbError::internal)?;
            if modified >= self.timestamp() {
                return Err(DbError::conflict());
            }
            self.session
                .borrow_mut()
                .coll_modified_cache
                .insert((user_id, collection_id), modified);
        }
        self.session
            .borrow_mut()
            .coll_locks
            .insert((user_id, collection_id), CollectionLock::Write);
        Ok(())
    }

    fn begin_sync(&self, for_write: bool) -> DbResult<()> {
        if self.session.borrow().in_transaction {
            return Ok(());
        }
        if for_write {
            sql_query("BEGIN IMMEDIATE").execute(&self.conn)?;
        } else {
            self.conn.transaction_manager().begin_transaction(&self.conn)?;
        }
        self.session.borrow_mut().in_transaction = true;
        Ok(())
    }

    fn commit_sync(&self) -> DbResult<()> {
        if !self.session.borrow().in_transaction {
            return Ok(());
        }
        self.conn.transaction_manager().commit_transaction(&self.conn)?;
        self.session.borrow_mut().in_transaction = false;
        Ok(())
    }

    fn rollback_sync(&self) -> DbResult<()> {
        if !self.session.borrow().in_transaction {
            return Ok(());
        }
        self.conn.transaction_manager().rollback_transaction(&self.conn)?;
        self.session.borrow_mut().in_transaction = false;
        Ok(())
    }

    fn delete_storage_sync(&self, user_id: UserIdentifier) -> DbResult<()> {
        let user_id = user_id.legacy_id as i64;
        delete(bso::table)
            .filter(bso::user_id.eq(user_id))
            .execute(&self.conn)?;
        delete(user_collections::table)
            .filter(user_collections::user_id.eq(user_id))
            .execute(&self.conn)?;
        Ok(())
    }

    fn delete_collection_sync(&self, params: params::DeleteCollection) -> DbResult<SyncTimestamp> {
        let user_id = params.user_id.legacy_id as i64;
        let collection_id = self.get_collection_id_sync(&params.collection)?;
        let mut count = delete(bso::table)
            .filter(bso::user_id.eq(user_id))
            .filter(bso::collection_id.eq(collection_id))
            .execute(&self.conn)?;
        count += delete(user_collections::table)
            .filter(user_collections::user_id.eq(user_id))
            .filter(user_collections::collection_id.eq(collection_id))
            .execute(&self.conn)?;
        if count == 0 {
            return Err(DbError::collection_not_found());
        }
        self.get_storage_timestamp_sync(params.user_id)
    }

    pub(super) fn create_collection_sync(&self, name: &str) -> DbResult<i32> {
        // XXX: handle concurrent attempts at inserts
        let id = self.conn.transaction(|| -> DbResult<i32> {
            insert_into(collections::table)
                .values(collections::name.eq(name))
                .execute(&self.conn)?;
            collections::table
                .select(last_insert_rowid)
                .first(&self.conn)
                .map_err(DbError::from)
        })?;
        self.coll_cache.put(id, name.to_owned())?;
        Ok(id)
    }

    fn get_or_create_collection_id_sync(&self, name: &str) -> DbResult<i32> {
        self.get_collection_id_sync(name).or_else(|e| {
            if e.is_collection_not_found() {
                self.create_collection_sync(name)
            } else {
                Err(e)
            }
        })
    }

    pub(super) fn get_collection_id_sync(&self, name: &str) -> DbResult<i32> {
        if let Some(id) = self.coll_cache.get_id(name)? {
            return Ok(id);
        }

        let id = collections::table
            .select(collections::id)
            .filter(collections::name.eq(name))
            .first::<i32>(&self.conn)
            .optional()?
            .ok_or_else(DbError::collection_not_found)?;
        self.coll_cache.put(id, name.to_owned())?;
        Ok(id)
    }

    fn get_collection_name_sync(&self, id: i32) -> DbResult<String> {
        if let Some(name) = self.coll_cache.get_name(id)? {
            return Ok(name);
        }
        let name = collections::table
            .select(collections::name)
            .filter(collections::id.eq(id))
            .first::<String>(&self.conn)
            .optional()?
            .ok_or_else(DbError::collection_not_found)?;
        self.coll_cache.put(id, name.clone())?;
        Ok(name)
    }

    fn put_bso_sync(&self, bso: params::PutBso) -> DbResult<SyncTimestamp> {
        let collection_id = self.get_or_create_collection_id_sync(&bso.collection)?;
        let user_id = bso.user_id.legacy_id as i64;
        let timestamp = self.timestamp().as_i64();

        self.conn.transaction(|| -> DbResult<()> {
            let exists = bso::table
                .select(bso::id)
                .filter(bso::user_id.eq(user_id))
                .filter(bso::collection_id.eq(collection_id))
                .filter(bso::id.eq(&bso.id))
                .first::<String>(&self.conn)
                .optional()?
                .is_some();

            if exists {
                update(bso::table)
                    .filter(bso::user_id.eq(user_id))
                    .filter(bso::collection_id.eq(collection_id))
                    .filter(bso::id.eq(&bso.id))
                    .set(put_bso_as_changeset(&bso, timestamp))
                    .execute(&self.conn)?;
            } else {
                let payload = bso.payload.as_deref().unwrap_or_default();
                let ttl = bso.ttl.unwrap_or(DEFAULT_BSO_TTL);
                insert_into(bso::table)
                    .values((
                        bso::user_id.eq(user_id),
                        bso::collection_id.eq(collection_id),
                        bso::id.eq(&bso.id),
                        bso::sortindex.eq(bso.sortindex),
                        bso::payload.eq(payload),
                        bso::payload_size.eq(payload.len() as i64),
                        bso::modified.eq(timestamp),
                        bso::expiry.eq(timestamp + ttl as i64 * 1000),
                    ))
                    .execute(&self.conn)?;
            }
            Ok(())
        })?;
        self.touch_collection_sync(user_id, collection_id)
    }

    fn get_bsos_sync(&self, params: params::GetBsos) -> DbResult<results::GetBsos> {
        let user_id = params.user_id.legacy_id as i64;
        let collection_id = self.get_collection_id_sync(&params.collection)?;
        let params::GetBsos {
            mut ids,
            older,
            newer,
            sort,
            limit,
            offset,
            ..
        } = params;

        if ids.len() > 100 {
            ids.truncate(100);
        }

        let mut query = bso::table
            .select((
                bso::id,
                bso::modified,
                bso::payload,
                bso::sortindex,
                bso::expiry,
            ))
            .filter(bso::user_id.eq(user_id))
            .filter(bso::collection_id.eq(collection_id))
            .filter(bso::expiry.gt(self.timestamp().as_i64()))
            .into_boxed();

        if let Some(older) = older {
            query = query.filter(bso::modified.lt(older.as_i64()));
        }
        if let Some(newer) = newer {
            query = query.filter(bso::modified.gt(newer.as_i64()));
        }
        if !ids.is_empty() {
            query = query.filter(bso::id.eq_any(ids));
        }

        query = match sort {
            Sorting::Index => query.order(bso::sortindex.desc()),
            Sorting::Newest => query.order(bso::modified.desc()),
            Sorting::Oldest => query.order(bso::modified.asc()),
            Sorting::None => query,
        };

        let has_limit = limit.is_some();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let offset = offset.map(|o| o.offset).unwrap_or(0);
        // fetch an extra row to detect whether there are more rows available
        query = query.limit(if limit >= 0 { limit + 1 } else { limit });
        // offset without a limit is ignored, not applied, per the paging contract
        if has_limit && offset != 0 {
            query = query.offset(offset as i64);
        }
        let mut items = query.load::<results::GetBso>(&self.conn)?;

        let next_offset = if limit >= 0 && items.len() > limit as usize {
            items.pop();
            Some((limit as u64 + offset).to_string())
        } else {
            None
        };

        Ok(results::Paginated {
            items,
            offset: next_offset,
        })
    }

    fn get_bso_ids_sync(&self, params: params::GetBsos) -> DbResult<results::GetBsoIds> {
        let full = self.get_bsos_sync(params)?;
        Ok(results::Paginated {
            items: full.items.into_iter().map(|bso| bso.id).collect(),
            offset: full.offset,
        })
    }

    fn get_bso_sync(&self, params: params::GetBso) -> DbResult<Option<results::GetBso>> {
        let user_id = params.user_id.legacy_id as i64;
        let collection_id = self.get_collection_id_sync(&params.collection)?;
        Ok(bso::table
            .select((
                bso::id,
                bso::modified,
                bso::payload,
                bso::sortindex,
                bso::expiry,
            ))
            .filter(bso::user_id.eq(user_id))
            .filter(bso::collection_id.eq(collection_id))
            .filter(bso::id.eq(&params.id))
            .filter(bso::expiry.gt(self.timestamp().as_i64()))
            .first::<results::GetBso>(&self.conn)
            .optional()?)
    }

    fn get_bso_timestamp_sync(&self, params: params::GetBsoTimestamp) -> DbResult<SyncTimestamp> {
        let user_id = params.user_id.legacy_id as i64;
        let collection_id = self.get_collection_id_sync(&params.collection)?;
        let modified = bso::table
            .select(bso::modified)
            .filter(bso::user_id.eq(user_id))
            .filter(bso::collection_id.eq(collection_id))
            .filter(bso::id.eq(&params.id))
            .filter(bso::expiry.gt(self.timestamp().as_i64()))
            .first::<i64>(&self.conn)
            .optional()?;
        match modified {
            Some(modified) => SyncTimestamp::from_i64(modified).map_err(DbError::internal),
            None => Ok(SyncTimestamp::from_seconds(0f64)),
        }
    }

    fn delete_bso_sync(&self, params: params::DeleteBso) -> DbResult<SyncTimestamp> {
        self.delete_bsos_sync(params::DeleteBsos {
            user_id: params.user_id,
            collection: params.collection,
            ids: vec![params.id],
        })
    }

    fn delete_bsos_sync(&self, params: params::DeleteBsos) -> DbResult<SyncTimestamp> {
        let user_id = params.user_id.legacy_id as i64;
        let collection_id = self.get_collection_id_sync(&params.collection)?;
        delete(bso::table)
            .filter(bso::user_id.eq(user_id))
            .filter(bso::collection_id.eq(collection_id))
            .filter(bso::id.eq_any(params.ids))
            .execute(&self.conn)?;
        self.touch_collection_sync(user_id, collection_id)
    }

    fn post_bsos_sync(&self, input: params::PostBsos) -> DbResult<SyncTimestamp> {
        let collection_id = self.get_or_create_collection_id_sync(&input.collection)?;
        let user_id = input.user_id.legacy_id as i64;
        for pbso in input.bsos {
            self.put_bso_sync(params::PutBso {
                user_id: input.user_id.clone(),
                collection: input.collection.clone(),
                id: pbso.id,
                payload: pbso.payload,
                sortindex: pbso.sortindex,
                ttl: pbso.ttl,
            })?;
        }
        self.touch_collection_sync(user_id, collection_id)
    }

    fn get_storage_timestamp_sync(&self, user_id: UserIdentifier) -> DbResult<SyncTimestamp> {
        let user_id = user_id.legacy_id as i64;
        let modified = user_collections::table
            .select(max(user_collections::modified))
            .filter(user_collections::user_id.eq(user_id))
            .first::<Option<i64>>(&self.conn)?
            .unwrap_or_default();
        SyncTimestamp::from_i64(modified).map_err(DbError::internal)
    }

    fn get_collection_timestamp_sync(
        &self,
        params: params::GetCollectionTimestamp,
    ) -> DbResult<SyncTimestamp> {
        let user_id = params.user_id.legacy_id;
        let collection_id = self.get_collection_id_sync(&params.collection)?;
        if let Some(modified) = self
            .session
            .borrow()
            .coll_modified_cache
            .get(&(user_id, collection_id))
        {
            return Ok(*modified);
        }
        user_collections::table
            .select(user_collections::modified)
            .filter(user_collections::user_id.eq(user_id as i64))
            .filter(user_collections::collection_id.eq(collection_id))
            .first::<i64>(&self.conn)
            .optional()?
            .map(SyncTimestamp::from_i64)
            .transpose()
            .map_err(DbError::internal)?
            .ok_or_else(DbError::collection_not_found)
    }

    fn get_collection_timestamps_sync(
        &self,
        user_id: UserIdentifier,
    ) -> DbResult<HashMap<String, SyncTimestamp>> {
        let rows = user_collections::table
            .select((user_collections::collection_id, user_collections::modified))
            .filter(user_collections::user_id.eq(user_id.legacy_id as i64))
            .load::<(i32, i64)>(&self.conn)?;
        let by_id = rows
            .into_iter()
            .map(|(collection_id, modified)| {
                SyncTimestamp::from_i64(modified)
                    .map(|ts| (collection_id, ts))
                    .map_err(DbError::internal)
            })
            .collect::<DbResult<HashMap<_, _>>>()?;
        self.map_collection_names(by_id)
    }

    fn map_collection_names<T>(&self, by_id: HashMap<i32, T>) -> DbResult<HashMap<String, T>> {
        by_id
            .into_iter()
            .map(|(id, value)| {
                self.get_collection_name_sync(id)
                    .map(|name| (name, value))
            })
            .collect()
    }

    pub(super) fn touch_collection_sync(
        &self,
        user_id: i64,
        collection_id: i32,
    ) -> DbResult<SyncTimestamp> {
        let timestamp = self.timestamp().as_i64();
        let upsert = r#"
            INSERT INTO user_collections (userid, collection, last_modified)
            VALUES (?, ?, ?)
            ON CONFLICT(userid, collection) DO UPDATE SET last_modified = excluded.last_modified
        "#;
        sql_query(upsert)
            .bind::<BigInt, _>(user_id)
            .bind::<Integer, _>(collection_id)
            .bind::<BigInt, _>(timestamp)
            .execute(&self.conn)?;
        Ok(self.timestamp())
    }

    fn get_storage_usage_sync(&self, user_id: UserIdentifier) -> DbResult<u64> {
        let total_bytes = bso::table
            .select(sql::<Nullable<BigInt>>("SUM(LENGTH(payload))"))
            .filter(bso::user_id.eq(user_id.legacy_id as i64))
            .filter(bso::expiry.gt(self.timestamp().as_i64()))
            .first::<Option<i64>>(&self.conn)?;
        Ok(total_bytes.unwrap_or_default() as u64)
    }

    fn get_collection_usage_sync(
        &self,
        user_id: UserIdentifier,
    ) -> DbResult<HashMap<String, i64>> {
        let counts = bso::table
            .select((bso::collection_id, sql::<BigInt>("SUM(LENGTH(payload))")))
            .filter(bso::user_id.eq(user_id.legacy_id as i64))
            .filter(bso::expiry.gt(self.timestamp().as_i64()))
            .group_by(bso::collection_id)
            .load(&self.conn)?
            .into_iter()
            .collect();
        self.map_collection_names(counts)
    }

    fn get_collection_counts_sync(
        &self,
        user_id: UserIdentifier,
    ) -> DbResult<HashMap<String, i64>> {
        let counts = bso::table
            .select((bso::collection_id, sql::<BigInt>("COUNT(*)")))
            .filter(bso::user_id.eq(user_id.legacy_id as i64))
            .filter(bso::expiry.gt(self.timestamp().as_i64()))
            .group_by(bso::collection_id)
            .load(&self.conn)?
            .into_iter()
            .collect();
        self.map_collection_names(counts)
    }

    fn get_quota_usage_sync(
        &self,
        params: params::GetQuotaUsage,
    ) -> DbResult<results::GetQuotaUsage> {
        let (total_bytes, count): (Option<i64>, i64) = bso::table
            .select((
                sql::<Nullable<BigInt>>("SUM(LENGTH(payload))"),
                sql::<BigInt>("COUNT(*)"),
            ))
            .filter(bso::user_id.eq(params.user_id.legacy_id as i64))
            .filter(bso::collection_id.eq(params.collection_id))
            .filter(bso::expiry.gt(self.timestamp().as_i64()))
            .first(&self.conn)?;
        Ok(results::GetQuotaUsage {
            total_bytes: total_bytes.unwrap_or_default() as usize,
            count: count as i32,
        })
    }

    fn update_collection_sync(&self, params: params::UpdateCollection) -> DbResult<SyncTimestamp> {
        let user_id = params.user_id.legacy_id as i64;
        self.touch_collection_sync(user_id, params.collection_id)
    }

    fn check_sync(&self) -> DbResult<bool> {
        sql_query("SELECT 1").execute(&self.conn)?;
        Ok(true)
    }

    fn timestamp(&self) -> SyncTimestamp {
        self.session.borrow().timestamp
    }

    pub(super) fn quota(&self) -> Quota {
        self.session.borrow().quota
    }

    pub(super) fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Formats a BSO for UPDATEs
#[derive(AsChangeset)]
#[table_name = "bso"]
struct UpdateBSO<'a> {
    pub sortindex: Option<i32>,
    pub payload: Option<&'a str>,
    pub payload_size: Option<i64>,
    pub modified: Option<i64>,
    pub expiry: Option<i64>,
}

fn put_bso_as_changeset<'a>(bso: &'a params::PutBso, modified: i64) -> UpdateBSO<'a> {
    let payload = bso.payload.as_deref();
    UpdateBSO {
        sortindex: bso.sortindex,
        expiry: bso.ttl.map(|ttl| modified + ttl as i64 * 1000),
        payload,
        payload_size: payload.map(|p| p.len() as i64),
        modified: if payload.is_some() || bso.sortindex.is_some() {
            Some(modified)
        } else {
            None
        },
    }
}

macro_rules! sync_db_method {
    ($name:ident, $sync_name:ident, $type:ident) => {
        sync_db_method!($name, $sync_name, $type, results::$type);
    };
    ($name:ident, $sync_name:ident, $type:ident, $result:ty) => {
        async fn $name(&mut self, params: params::$type) -> DbResult<$result> {
            self.spawn(move |db| db.$sync_name(params)).await
        }
    };
}

#[async_trait(?Send)]
impl Db for SqliteDb {
    async fn lock_for_read(&mut self, params: params::LockCollection) -> DbResult<()> {
        self.spawn(move |db| db.lock_for_read_sync(params)).await
    }

    async fn lock_for_write(&mut self, params: params::LockCollection) -> DbResult<()> {
        self.spawn(move |db| db.lock_for_write_sync(params)).await
    }

    async fn begin(&mut self, for_write: bool) -> DbResult<()> {
        self.spawn(move |db| db.begin_sync(for_write)).await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.spawn(move |db| db.commit_sync()).await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.spawn(move |db| db.rollback_sync()).await
    }

    sync_db_method!(
        get_collection_timestamps,
        get_collection_timestamps_sync,
        GetCollectionTimestamps
    );
    sync_db_method!(
        get_collection_timestamp,
        get_collection_timestamp_sync,
        GetCollectionTimestamp
    );
    sync_db_method!(
        get_collection_counts,
        get_collection_counts_sync,
        GetCollectionCounts
    );
    sync_db_method!(
        get_collection_usage,
        get_collection_usage_sync,
        GetCollectionUsage
    );
    sync_db_method!(
        get_storage_timestamp,
        get_storage_timestamp_sync,
        GetStorageTimestamp
    );
    sync_db_method!(get_storage_usage, get_storage_usage_sync, GetStorageUsage);
    sync_db_method!(get_quota_usage, get_quota_usage_sync, GetQuotaUsage);
    sync_db_method!(delete_storage, delete_storage_sync, DeleteStorage);
    sync_db_method!(delete_collection, delete_collection_sync, DeleteCollection);
    sync_db_method!(delete_bsos, delete_bsos_sync, DeleteBsos);
    sync_db_method!(get_bsos, get_bsos_sync, GetBsos);
    sync_db_method!(get_bso_ids, get_bso_ids_sync, GetBsoIds);
    sync_db_method!(post_bsos, post_bsos_sync, PostBsos, SyncTimestamp);
    sync_db_method!(delete_bso, delete_bso_sync, DeleteBso);
    sync_db_method!(get_bso, get_bso_sync, GetBso, Option<results::GetBso>);
    sync_db_method!(get_bso_timestamp, get_bso_timestamp_sync, GetBsoTimestamp);
    sync_db_method!(put_bso, put_bso_sync, PutBso);

    async fn check(&mut self) -> DbResult<bool> {
        self.spawn(move |db| db.check_sync()).await
    }

    fn get_connection_info(&self) -> results::ConnectionInfo {
        results::ConnectionInfo::default()
    }

    async fn get_collection_id(&mut self, name: &str) -> DbResult<i32> {
        let name = name.to_owned();
        self.spawn(move |db| db.get_collection_id_sync(&name)).await
    }

    async fn create_collection(&mut self, name: &str) -> DbResult<i32> {
        let name = name.to_owned();
        self.spawn(move |db| db.create_collection_sync(&name)).await
    }

    async fn update_collection(&mut self, params: params::UpdateCollection) -> DbResult<SyncTimestamp> {
        self.spawn(move |db| db.update_collection_sync(params)).await
    }

    fn timestamp(&self) -> SyncTimestamp {
        SqliteDb::timestamp(self)
    }

    fn set_timestamp(&mut self, timestamp: SyncTimestamp) {
        self.session.borrow_mut().timestamp = timestamp;
    }

    async fn clear_coll_cache(&mut self) -> DbResult<()> {
        self.coll_cache.clear();
        Ok(())
    }

    fn set_quota(&mut self, enabled: bool, limit: usize, enforce: bool) {
        let mut session = self.session.borrow_mut();
        session.quota = Quota {
            size: limit,
            enabled,
            enforced: enforce,
        };
    }
}

#[async_trait(?Send)]
impl BatchDb for SqliteDb {
    type Error = DbError;

    batch_db_method!(create_batch, create, CreateBatch);
    batch_db_method!(validate_batch, validate, ValidateBatch);
    batch_db_method!(append_to_batch, append, AppendToBatch);
    batch_db_method!(get_batch, get, GetBatch, Option<results::GetBatch>);
    batch_db_method!(commit_batch, commit, CommitBatch);

    async fn delete_batch(&mut self, params: params::DeleteBatch) -> DbResult<()> {
        self.spawn(move |db| batch::delete(&db, params)).await
    }
}
