//! Consults the cache overlay's `status:<host>` signal before dispatching a
//! request, and fuzzes `Retry-After` on any 503 response.

use actix_web::{
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse},
    http::header::{HeaderName, HeaderValue, RETRY_AFTER},
    HttpResponse,
};
use futures::future::LocalBoxFuture;
use rand::{thread_rng, Rng};
use syncstorage_cache::NodeStatus;

use crate::server::ServerState;
use syncserver_common::X_BACKOFF;

/// `mozsvc.retry_after`'s default, in seconds.
const RETRY_AFTER_BASE_SECS: u64 = 1800;

pub fn check_node_status<B>(
    request: ServiceRequest,
    service: &(impl Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>
          + 'static),
) -> LocalBoxFuture<'static, Result<ServiceResponse<EitherBody<B>>, actix_web::Error>> {
    let state = request
        .app_data::<actix_web::web::Data<ServerState>>()
        .cloned();
    let host = request.connection_info().host().to_owned();

    let status = state
        .as_ref()
        .filter(|state| state.check_node_status)
        .and_then(|state| state.cache.as_ref())
        .and_then(|cache| cache.check_node_status(&host).ok())
        .unwrap_or(NodeStatus::Unknown);

    match status {
        NodeStatus::Down | NodeStatus::Draining | NodeStatus::Unhealthy => {
            let message = match status {
                NodeStatus::Down => "database marked as down",
                NodeStatus::Draining => "node reassignment",
                _ => "database is not healthy",
            };
            let (req, payload) = request.into_parts();
            let sreq = ServiceRequest::from_parts(req, payload);
            Box::pin(async move {
                Ok(sreq.into_response(
                    HttpResponse::ServiceUnavailable()
                        .insert_header((RETRY_AFTER, fuzzed_retry_after().to_string()))
                        .body(message)
                        .map_into_right_body(),
                ))
            })
        }
        other => {
            let fut = service.call(request);
            Box::pin(async move {
                let mut res = fut.await?.map_into_left_body();

                if let NodeStatus::Backoff(seconds) = other {
                    let seconds = seconds.unwrap_or(RETRY_AFTER_BASE_SECS);
                    res.headers_mut().insert(
                        HeaderName::from_static(X_BACKOFF),
                        HeaderValue::from_str(&seconds.to_string())
                            .expect("backoff seconds is a valid header value"),
                    );
                }

                if res.status().is_server_error()
                    && res.status().as_u16() == 503
                    && !res.headers().contains_key(RETRY_AFTER)
                {
                    res.headers_mut().insert(
                        RETRY_AFTER,
                        HeaderValue::from_str(&fuzzed_retry_after().to_string())
                            .expect("retry-after seconds is a valid header value"),
                    );
                }

                Ok(res)
            })
        }
    }
}

/// Small random jitter avoids every backed-off client retrying in lockstep.
fn fuzzed_retry_after() -> u64 {
    RETRY_AFTER_BASE_SECS + thread_rng().gen_range(0..5)
}
