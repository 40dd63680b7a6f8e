use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use syncserver_common::{BlockingThreadpool, Metrics};
use syncstorage_db_common::{
    params::{self, PostCollectionBso},
    util::SyncTimestamp,
    BatchDb, Db, UserIdentifier,
};

use super::{pool::SqliteDbPool, SqliteDb};

/// A plain ":memory:" database is torn down once its one connection
/// closes, and run_embedded_migrations runs on a throwaway connection
/// of its own, so each test instead gets its own temp file on disk.
fn test_database_url() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "syncstorage-sqlite-test-{}-{}.db",
        std::process::id(),
        n
    ));
    path.to_str().expect("temp path not valid utf8").to_owned()
}

fn test_settings() -> syncstorage_settings::Settings {
    let _ = env_logger::try_init();
    let settings = syncserver_settings::Settings::with_env_and_config_file(None)
        .expect("could not load test settings")
        .syncstorage;
    syncstorage_settings::Settings {
        database_url: test_database_url(),
        database_pool_max_size: 1,
        database_use_test_transactions: true,
        ..settings
    }
}

async fn db() -> SqliteDb {
    let settings = test_settings();
    let threadpool = Arc::new(BlockingThreadpool::default());
    let pool = SqliteDbPool::new(&settings, &Metrics::default(), threadpool)
        .expect("could not create db pool");
    pool.get_sync().expect("could not check out a connection")
}

fn uid(legacy_id: u64) -> UserIdentifier {
    UserIdentifier { legacy_id }
}

fn pbso(id: &str, payload: Option<&str>, ttl: Option<u32>) -> PostCollectionBso {
    PostCollectionBso {
        id: id.to_owned(),
        payload: payload.map(str::to_owned),
        sortindex: None,
        ttl,
    }
}

#[actix_rt::test]
async fn static_collection_id() {
    let mut db = db().await;
    let id = db.get_collection_id("bookmarks").await.unwrap();
    assert_eq!(id, 7);
    // an unknown collection gets allocated a fresh, persisted id
    let custom = db.create_collection("my_custom_coll").await.unwrap();
    assert_eq!(
        db.get_collection_id("my_custom_coll").await.unwrap(),
        custom
    );
}

#[actix_rt::test]
async fn put_and_get_bso() {
    let mut db = db().await;
    let user_id = uid(1);

    db.put_bso(params::PutBso {
        user_id: user_id.clone(),
        collection: "clients".to_owned(),
        id: "bso1".to_owned(),
        sortindex: Some(1),
        payload: Some("payload data".to_owned()),
        ttl: Some(86400),
    })
    .await
    .unwrap();

    let bso = db
        .get_bso(params::GetBso {
            user_id: user_id.clone(),
            collection: "clients".to_owned(),
            id: "bso1".to_owned(),
        })
        .await
        .unwrap()
        .expect("bso should exist");
    assert_eq!(bso.payload, "payload data");
    assert_eq!(bso.sortindex, Some(1));

    let timestamp = db
        .get_collection_timestamp(params::GetCollectionTimestamp {
            user_id,
            collection: "clients".to_owned(),
        })
        .await
        .unwrap();
    assert!(timestamp > SyncTimestamp::from_seconds(0f64));
}

#[actix_rt::test]
async fn post_bsos_updates_collection_timestamp() {
    let mut db = db().await;
    let user_id = uid(2);

    let before = db.timestamp();
    let modified = db
        .post_bsos(params::PostBsos {
            user_id: user_id.clone(),
            collection: "history".to_owned(),
            bsos: vec![
                pbso("b0", Some("one"), None),
                pbso("b1", Some("two"), None),
            ],
            for_batch: false,
            failed: Default::default(),
        })
        .await
        .unwrap();
    assert!(modified >= before);

    let ids = db
        .get_bso_ids(params::GetBsos {
            user_id,
            collection: "history".to_owned(),
            newer: None,
            older: None,
            sort: Default::default(),
            limit: None,
            offset: None,
            ids: vec![],
            full: false,
        })
        .await
        .unwrap();
    assert_eq!(ids.items.len(), 2);
}

#[actix_rt::test]
async fn batch_lifecycle() {
    let mut db = db().await;
    let user_id = uid(3);

    let created = db
        .create_batch(params::CreateBatch {
            user_id: user_id.clone(),
            collection: "bookmarks".to_owned(),
            bsos: vec![pbso("b0", Some("first"), None)],
        })
        .await
        .unwrap();

    let valid = db
        .validate_batch(params::ValidateBatch {
            user_id: user_id.clone(),
            collection: "bookmarks".to_owned(),
            id: created.id.clone(),
        })
        .await
        .unwrap();
    assert!(valid);

    db.append_to_batch(params::AppendToBatch {
        user_id: user_id.clone(),
        collection: "bookmarks".to_owned(),
        batch: created.clone(),
        bsos: vec![pbso("b1", Some("second"), None)],
    })
    .await
    .unwrap();

    let fetched = db
        .get_batch(params::GetBatch {
            user_id: user_id.clone(),
            collection: "bookmarks".to_owned(),
            id: created.id.clone(),
        })
        .await
        .unwrap()
        .expect("batch should still exist");

    db.commit_batch(params::CommitBatch {
        user_id: user_id.clone(),
        collection: "bookmarks".to_owned(),
        batch: fetched,
    })
    .await
    .unwrap();

    // committing deletes the batch
    let gone = db
        .get_batch(params::GetBatch {
            user_id,
            collection: "bookmarks".to_owned(),
            id: created.id,
        })
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[actix_rt::test]
async fn quota_usage_tracks_payload_size() {
    let mut db = db().await;
    let user_id = uid(4);
    let collection_id = db.create_collection("addons").await.unwrap();

    db.put_bso(params::PutBso {
        user_id,
        collection: "addons".to_owned(),
        id: "q0".to_owned(),
        sortindex: None,
        payload: Some("0123456789".to_owned()),
        ttl: None,
    })
    .await
    .unwrap();

    let usage = db
        .get_quota_usage(params::GetQuotaUsage {
            user_id: UserIdentifier { legacy_id: 4 },
            collection: "addons".to_owned(),
            collection_id,
        })
        .await
        .unwrap();
    assert_eq!(usage.count, 1);
    assert_eq!(usage.total_bytes, 10);
}
