//! End-to-end tests against the storage core's `Db` trait, independent of
//! the HTTP layer. These exercise the invariants and scenarios the storage
//! core is expected to uphold regardless of backend.
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use syncserver_common::{BlockingThreadpool, Metrics};
use syncstorage_db::{params, Db, DbPool, DbPoolImpl, SyncTimestamp, UserIdentifier};

fn test_database_url() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!("db-tests-{}-{}.db", std::process::id(), n));
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

async fn db() -> Box<dyn Db<Error = syncstorage_db::DbError>> {
    let settings = test_settings();
    let threadpool = Arc::new(BlockingThreadpool::default());
    let pool =
        DbPoolImpl::new(&settings, &Metrics::default(), threadpool).expect("failed to open pool");
    pool.get().await.expect("failed to check out a connection")
}

fn uid(legacy_id: u64) -> UserIdentifier {
    UserIdentifier { legacy_id }
}

fn pbso(id: &str, payload: &str, ttl: Option<u32>) -> params::PostCollectionBso {
    params::PostCollectionBso {
        id: id.to_owned(),
        sortindex: None,
        payload: Some(payload.to_owned()),
        ttl,
    }
}

// Invariant 1: last_modified is strictly increasing across mutations of the
// same collection.
#[actix_rt::test]
async fn monotonic_timestamps() {
    let mut db = db().await;
    let user_id = uid(100);

    let mut previous = SyncTimestamp::from_seconds(0f64);
    for i in 0..5 {
        let modified = db
            .put_bso(params::PutBso {
                user_id: user_id.clone(),
                collection: "bookmarks".to_owned(),
                id: format!("b{}", i),
                sortindex: None,
                payload: Some("x".to_owned()),
                ttl: None,
            })
            .await
            .unwrap();
        assert!(modified > previous, "timestamps must strictly increase");
        previous = modified;
    }
}

// Invariant 2: get_collection_counts matches the number of live BSOs.
#[actix_rt::test]
async fn count_equals_cardinality() {
    let mut db = db().await;
    let user_id = uid(101);

    db.post_bsos(params::PostBsos {
        user_id: user_id.clone(),
        collection: "history".to_owned(),
        bsos: vec![pbso("h0", "a", None), pbso("h1", "b", None), pbso("h2", "c", None)],
        for_batch: false,
        failed: Default::default(),
    })
    .await
    .unwrap();

    let counts = db.get_collection_counts(user_id).await.unwrap();
    assert_eq!(counts.get("history").copied(), Some(3));
}

// Invariant 4: round trip preserves id/payload/sortindex.
#[actix_rt::test]
async fn put_get_round_trip() {
    let mut db = db().await;
    let user_id = uid(102);

    let modified = db
        .put_bso(params::PutBso {
            user_id: user_id.clone(),
            collection: "bookmarks".to_owned(),
            id: "aaa".to_owned(),
            sortindex: Some(10),
            payload: Some("hello".to_owned()),
            ttl: None,
        })
        .await
        .unwrap();

    let bso = db
        .get_bso(params::GetBso {
            user_id,
            collection: "bookmarks".to_owned(),
            id: "aaa".to_owned(),
        })
        .await
        .unwrap()
        .expect("bso should exist");
    assert_eq!(bso.id, "aaa");
    assert_eq!(bso.payload, "hello");
    assert_eq!(bso.sortindex, Some(10));
    assert_eq!(bso.modified, modified);
}

// Invariant 5: a second delete of an already-deleted item is a no-op, not
// an error, and still reports the (unchanged) collection timestamp.
#[actix_rt::test]
async fn idempotent_delete() {
    let mut db = db().await;
    let user_id = uid(103);

    db.put_bso(params::PutBso {
        user_id: user_id.clone(),
        collection: "bookmarks".to_owned(),
        id: "aaa".to_owned(),
        sortindex: None,
        payload: Some("hello".to_owned()),
        ttl: None,
    })
    .await
    .unwrap();

    let first = db
        .delete_bso(params::DeleteBso {
            user_id: user_id.clone(),
            collection: "bookmarks".to_owned(),
            id: "aaa".to_owned(),
        })
        .await
        .unwrap();
    let second = db
        .delete_bso(params::DeleteBso {
            user_id,
            collection: "bookmarks".to_owned(),
            id: "aaa".to_owned(),
        })
        .await
        .unwrap();
    assert_eq!(first, second);
}

// Scenario D: items staged in a batch are invisible until commit, then all
// appear atomically with a single collection timestamp.
#[actix_rt::test]
async fn batch_commit_is_atomic() {
    let mut db = db().await;
    let user_id = uid(104);

    let items: Vec<_> = (0..10).map(|i| pbso(&format!("i{}", i), "payload", None)).collect();
    let batch = db
        .create_batch(params::CreateBatch {
            user_id: user_id.clone(),
            collection: "history".to_owned(),
            bsos: items,
        })
        .await
        .unwrap();

    let before = db
        .get_bso_ids(params::GetBsos {
            user_id: user_id.clone(),
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
    assert_eq!(before.items.len(), 0, "batch items must not be visible before commit");

    let committed_at = db
        .commit_batch(params::CommitBatch {
            user_id: user_id.clone(),
            collection: "history".to_owned(),
            batch: params::Batch { id: batch.id },
        })
        .await
        .unwrap();

    let after = db
        .get_bso_ids(params::GetBsos {
            user_id: user_id.clone(),
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
    assert_eq!(after.items.len(), 10);

    let stamp = db
        .get_collection_timestamp(params::GetCollectionTimestamp {
            user_id,
            collection: "history".to_owned(),
        })
        .await
        .unwrap();
    assert_eq!(stamp, committed_at);
}

// Invariant 9 (approximation): get_quota_usage tracks payload bytes written
// so far, which is what the controller's quota check reads from.
#[actix_rt::test]
async fn quota_usage_tracks_writes() {
    let mut db = db().await;
    let user_id = uid(105);
    let collection_id = db.create_collection("bookmarks").await.unwrap();

    db.put_bso(params::PutBso {
        user_id: user_id.clone(),
        collection: "bookmarks".to_owned(),
        id: "q0".to_owned(),
        sortindex: None,
        payload: Some("0123456789".to_owned()),
        ttl: None,
    })
    .await
    .unwrap();

    let usage = db
        .get_quota_usage(params::GetQuotaUsage {
            user_id,
            collection: "bookmarks".to_owned(),
            collection_id,
        })
        .await
        .unwrap();
    assert_eq!(usage.count, 1);
    assert_eq!(usage.total_bytes, 10);
}
