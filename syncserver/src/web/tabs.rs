//! Cache-overlay handling for the `tabs` collection.
//!
//! `tabs` is specified as cache-authoritative: its rows never touch SQL, and
//! a cache miss (empty, or a memcached outage) is the correct "empty
//! collection" answer rather than a fallback to the SQL store.

use actix_web::{http::StatusCode, HttpResponse};
use syncserver_common::{X_LAST_MODIFIED, X_WEAVE_RECORDS};
use syncstorage_cache::{Cache, CachedTab};
use syncstorage_db::{
    results::{GetBso, Paginated},
    SyncTimestamp,
};

use crate::{
    error::{ApiError, ApiErrorKind},
    web::extractors::{BsoPutRequest, BsoRequest, CollectionRequest, ReplyFormat},
};

/// memcached's maximum relative ttl (30 days); tabs don't otherwise expire.
const TAB_TTL: u32 = 2_592_000;

fn cache_err(e: impl std::fmt::Display) -> ApiError {
    ApiErrorKind::Internal(e.to_string()).into()
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Advances and persists the tabs collection's last-modified stamp,
/// guaranteeing monotonicity the way the SQL store's collection timestamps
/// do, since writes here have no database clock to rely on.
fn bump_stamp(cache: &dyn Cache, user_id: u64) -> Result<SyncTimestamp, ApiError> {
    let previous = cache.get_tabs_stamp(user_id).map_err(cache_err)?.unwrap_or(0);
    let stamp = previous.max(now_ms()).max(previous + 1);
    cache.set_tabs_stamp(user_id, stamp).map_err(cache_err)?;
    Ok(SyncTimestamp::from_milliseconds(stamp))
}

fn current_stamp(cache: &dyn Cache, user_id: u64) -> Result<SyncTimestamp, ApiError> {
    let ms = cache.get_tabs_stamp(user_id).map_err(cache_err)?.unwrap_or(0);
    Ok(SyncTimestamp::from_milliseconds(ms))
}

pub fn get_bso(cache: &dyn Cache, req: &BsoRequest) -> Result<HttpResponse, ApiError> {
    let tab = cache
        .get_tab(req.user_id.legacy_id, &req.bso)
        .map_err(cache_err)?;
    Ok(match tab {
        Some(tab) => HttpResponse::Ok().json(GetBso {
            id: req.bso.clone(),
            modified: current_stamp(cache, req.user_id.legacy_id)?,
            payload: tab.payload,
            sortindex: tab.sortindex,
            expiry: 0,
        }),
        None => HttpResponse::NotFound().finish(),
    })
}

pub fn put_bso(cache: &dyn Cache, req: &BsoPutRequest) -> Result<HttpResponse, ApiError> {
    let tab = CachedTab {
        payload: req.body.payload.clone().unwrap_or_default(),
        sortindex: req.body.sortindex,
    };
    cache
        .set_tab(req.user_id.legacy_id, &req.bso, tab, TAB_TTL)
        .map_err(cache_err)?;
    let modified = bump_stamp(cache, req.user_id.legacy_id)?;
    Ok(HttpResponse::build(StatusCode::OK)
        .insert_header((X_LAST_MODIFIED, modified.as_header()))
        .json(modified))
}

pub fn delete_bso(cache: &dyn Cache, req: &BsoRequest) -> Result<HttpResponse, ApiError> {
    cache
        .delete_tab(req.user_id.legacy_id, &req.bso)
        .map_err(cache_err)?;
    let modified = bump_stamp(cache, req.user_id.legacy_id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "modified": modified })))
}

/// Lists (and optionally deletes) the user's live tabs. Cache has no real
/// pagination, so `newer`/`older`/`sort`/`limit`/`offset` are accepted but
/// not applied; `ids` still filters, matching the `?ids=` contract.
fn matching_ids(cache: &dyn Cache, coll: &CollectionRequest) -> Result<Vec<String>, ApiError> {
    let ids = cache.get_tab_ids(coll.user_id.legacy_id).map_err(cache_err)?;
    Ok(if coll.query.ids.is_empty() {
        ids
    } else {
        ids.into_iter()
            .filter(|id| coll.query.ids.contains(id))
            .collect()
    })
}

pub fn delete_collection(cache: &dyn Cache, coll: &CollectionRequest) -> Result<HttpResponse, ApiError> {
    let user_id = coll.user_id.legacy_id;
    let delete_bsos = !coll.query.ids.is_empty();
    let ids = matching_ids(cache, coll)?;
    for id in &ids {
        cache.delete_tab(user_id, id).map_err(cache_err)?;
    }
    let modified = bump_stamp(cache, user_id)?;

    let mut resp = HttpResponse::Ok();
    if delete_bsos {
        resp.insert_header((X_LAST_MODIFIED, modified.as_header()));
    }
    Ok(resp.json(modified))
}

pub fn get_collection(cache: &dyn Cache, coll: &CollectionRequest) -> Result<HttpResponse, ApiError> {
    let user_id = coll.user_id.legacy_id;
    let ids = matching_ids(cache, coll)?;
    let modified = current_stamp(cache, user_id)?;

    let response = if coll.query.full {
        let items: Vec<GetBso> = ids
            .into_iter()
            .filter_map(|id| {
                cache
                    .get_tab(user_id, &id)
                    .ok()
                    .flatten()
                    .map(|tab| GetBso {
                        id,
                        modified,
                        payload: tab.payload,
                        sortindex: tab.sortindex,
                        expiry: 0,
                    })
            })
            .collect();
        build_response(coll, modified, Paginated { items, offset: None })
    } else {
        build_response(
            coll,
            modified,
            Paginated {
                items: ids,
                offset: None,
            },
        )
    };
    Ok(response)
}

fn build_response<T: serde::Serialize>(
    coll: &CollectionRequest,
    modified: SyncTimestamp,
    result: Paginated<T>,
) -> HttpResponse {
    let mut builder = HttpResponse::build(StatusCode::OK);
    let resp = builder
        .insert_header((X_LAST_MODIFIED, modified.as_header()))
        .insert_header((X_WEAVE_RECORDS, result.items.len().to_string()));

    match coll.reply {
        ReplyFormat::Json => resp.json(result.items),
        ReplyFormat::Newlines => {
            let items: String = result
                .items
                .iter()
                .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "".to_string()))
                .filter(|v| !v.is_empty())
                .map(|v| v.replace('\n', "\\u000a") + "\n")
                .collect();
            resp.insert_header(("Content-Type", "application/newlines"))
                .insert_header(("Content-Length", format!("{}", items.len())))
                .body(items)
        }
        ReplyFormat::Whoisi => crate::web::whoisi::encode(resp, &result.items),
    }
}
