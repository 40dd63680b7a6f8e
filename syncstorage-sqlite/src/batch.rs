use diesel::{
    self, insert_into,
    sql_types::{BigInt, Integer},
    ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl,
};

use syncstorage_db_common::{params, results, util::SyncTimestamp, BATCH_LIFETIME, DEFAULT_BSO_TTL};

use super::{
    models::SqliteDb,
    schema::{batch_upload_items, batch_uploads},
    DbError, DbResult,
};

macro_rules! batch_db_method {
    ($name:ident, $batch_name:ident, $type:ident) => {
        batch_db_method!($name, $batch_name, $type, results::$type);
    };
    ($name:ident, $batch_name:ident, $type:ident, $result:ty) => {
        async fn $name(&mut self, params: params::$type) -> DbResult<$result> {
            self.spawn(move |db| batch::$batch_name(&db, params)).await
        }
    };
}

/// Decode a batch id into the raw i64 timestamp it was minted from.
///
/// The id as handed to clients is just the base64 of the decimal batch id;
/// fall back to treating it as raw bytes if it isn't valid base64 (clients
/// have historically sent either form).
pub fn decode_id(id: &str) -> DbResult<i64> {
    let bytes = base64::decode(id).unwrap_or_else(|_| id.as_bytes().to_vec());
    let decoded = std::str::from_utf8(&bytes).map_err(|e| DbError::internal(e.to_string()))?;
    decoded
        .parse::<i64>()
        .map_err(|e| DbError::internal(e.to_string()))
}

pub fn encode_id(id: i64) -> String {
    base64::encode(id.to_string())
}

pub fn validate_batch_id(id: &str) -> DbResult<()> {
    decode_id(id).map(|_| ())
}

pub fn create(db: &SqliteDb, params: params::CreateBatch) -> DbResult<results::CreateBatch> {
    let user_id = params.user_id.legacy_id;
    let collection_id = db.get_or_create_collection_id_sync(&params.collection)?;
    // mix in the low digit of the user id to spread batch ids across users
    // minted in the same millisecond
    let batch_id = db.timestamp().as_i64() + (user_id % 10) as i64;

    let inserted = insert_into(batch_uploads::table)
        .values((
            batch_uploads::batch_id.eq(batch_id),
            batch_uploads::user_id.eq(user_id as i64),
            batch_uploads::collection_id.eq(collection_id),
        ))
        .execute(&db.inner.conn);
    match inserted {
        Ok(_) => (),
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => return Err(DbError::conflict()),
        Err(e) => return Err(e.into()),
    }

    db.touch_collection_sync(user_id as i64, collection_id)?;

    let size = do_append(db, batch_id, user_id as i64, params.bsos, false)?;

    Ok(results::CreateBatch {
        id: encode_id(batch_id),
        size,
    })
}

pub fn validate(db: &SqliteDb, params: params::ValidateBatch) -> DbResult<bool> {
    let user_id = params.user_id.legacy_id as i64;
    let batch_id = match decode_id(&params.id) {
        Ok(id) => id,
        Err(_) => return Ok(false),
    };
    if batch_id + BATCH_LIFETIME < db.timestamp().as_i64() {
        return Ok(false);
    }

    let exists = batch_uploads::table
        .select(batch_uploads::batch_id)
        .filter(batch_uploads::batch_id.eq(batch_id))
        .filter(batch_uploads::user_id.eq(user_id))
        .first::<i64>(&db.inner.conn)
        .optional()?
        .is_some();
    Ok(exists)
}

pub fn append(db: &SqliteDb, params: params::AppendToBatch) -> DbResult<()> {
    let user_id = params.user_id.legacy_id as i64;
    let batch_id = decode_id(&params.batch.id)?;
    do_append(db, batch_id, user_id, params.bsos, true)?;
    Ok(())
}

pub fn get(db: &SqliteDb, params: params::GetBatch) -> DbResult<Option<results::GetBatch>> {
    let user_id = params.user_id.legacy_id as i64;
    let batch_id = match decode_id(&params.id) {
        Ok(id) => id,
        Err(_) => return Ok(None),
    };
    let exists = batch_uploads::table
        .select(batch_uploads::batch_id)
        .filter(batch_uploads::batch_id.eq(batch_id))
        .filter(batch_uploads::user_id.eq(user_id))
        .first::<i64>(&db.inner.conn)
        .optional()?
        .is_some();
    Ok(exists.then(|| results::GetBatch {
        id: encode_id(batch_id),
    }))
}

pub fn delete(db: &SqliteDb, params: params::DeleteBatch) -> DbResult<()> {
    let user_id = params.user_id.legacy_id as i64;
    let batch_id = decode_id(&params.id)?;
    diesel::delete(batch_upload_items::table)
        .filter(batch_upload_items::batch_id.eq(batch_id))
        .filter(batch_upload_items::user_id.eq(user_id))
        .execute(&db.inner.conn)?;
    diesel::delete(batch_uploads::table)
        .filter(batch_uploads::batch_id.eq(batch_id))
        .filter(batch_uploads::user_id.eq(user_id))
        .execute(&db.inner.conn)?;
    Ok(())
}

pub fn commit(db: &SqliteDb, params: params::CommitBatch) -> DbResult<SyncTimestamp> {
    let user_id = params.user_id.legacy_id as i64;
    let collection_id = db.get_or_create_collection_id_sync(&params.collection)?;
    let batch_id = decode_id(&params.batch.id)?;
    let timestamp = db.timestamp().as_i64();

    let default_expiry = timestamp + DEFAULT_BSO_TTL as i64 * 1000;
    let upsert = r#"
        INSERT INTO bso (userid, collection, id, sortindex, payload, payload_size, modified, ttl)
        SELECT
            userid,
            ?,
            id,
            sortindex,
            COALESCE(payload, ''),
            COALESCE(payload_size, 0),
            ?,
            COALESCE(? + ttl_offset * 1000, ?)
        FROM batch_upload_items
        WHERE batch = ? AND userid = ?
        ON CONFLICT(userid, collection, id) DO UPDATE SET
            sortindex = COALESCE(excluded.sortindex, bso.sortindex),
            payload = CASE WHEN excluded.payload = '' THEN bso.payload ELSE excluded.payload END,
            payload_size = CASE WHEN excluded.payload = '' THEN bso.payload_size ELSE excluded.payload_size END,
            modified = excluded.modified,
            ttl = excluded.ttl
    "#;
    diesel::sql_query(upsert)
        .bind::<Integer, _>(collection_id)
        .bind::<BigInt, _>(timestamp)
        .bind::<BigInt, _>(timestamp)
        .bind::<BigInt, _>(default_expiry)
        .bind::<BigInt, _>(batch_id)
        .bind::<BigInt, _>(user_id)
        .execute(&db.inner.conn)?;

    let result = db.touch_collection_sync(user_id, collection_id);
    self::delete(
        db,
        params::DeleteBatch {
            user_id: params.user_id,
            collection: params.collection,
            id: params.batch.id,
        },
    )?;
    result
}

fn do_append(
    db: &SqliteDb,
    batch_id: i64,
    user_id: i64,
    bsos: Vec<params::PostCollectionBso>,
    check_result: bool,
) -> DbResult<Option<usize>> {
    if bsos.is_empty() {
        return Ok(Some(0));
    }

    let to_insert: Vec<_> = bsos
        .into_iter()
        .map(|bso| {
            let payload_size = bso.payload.as_ref().map(|p| p.len() as i64);
            (
                batch_upload_items::batch_id.eq(batch_id),
                batch_upload_items::user_id.eq(user_id),
                batch_upload_items::id.eq(bso.id),
                batch_upload_items::sortindex.eq(bso.sortindex),
                batch_upload_items::payload.eq(bso.payload),
                batch_upload_items::payload_size.eq(payload_size),
                batch_upload_items::ttl_offset.eq(bso.ttl.map(|ttl| ttl as i32)),
            )
        })
        .collect();

    let inserted = insert_into(batch_upload_items::table)
        .values(&to_insert)
        .execute(&db.inner.conn)?;
    if check_result && inserted == 0 {
        return Err(DbError::batch_not_found());
    }
    Ok(Some(inserted))
}
