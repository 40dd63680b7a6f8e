pub mod node_status;
pub mod rejectua;
pub mod sentry;

// # Web Middleware
//
// Matches the Sync Storage middleware (tweens) run around every request.

use std::future::Future;

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse},
    http::header::{HeaderName, HeaderValue},
    web::Data,
};
use syncserver_common::{Metrics, X_TIMESTAMP};

use crate::error::{ApiError, ApiErrorKind};
use crate::server::ServerState;

pub fn emit_http_status<B>(
    req: ServiceRequest,
    srv: &impl Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
) -> impl Future<Output = Result<ServiceResponse<B>, actix_web::Error>> {
    let fut = srv.call(req);

    async move {
        let res = fut.await?;
        let req = res.request();
        let metrics = {
            let statsd_client = req
                .app_data::<Data<ServerState>>()
                .map(|state| state.metrics.clone())
                .ok_or_else(|| ApiError::from(ApiErrorKind::NoServerState))?;

            Metrics::from(&statsd_client)
        };

        if res.status().is_informational() {
            metrics.incr("http_1XX");
        } else if res.status().is_success() {
            metrics.incr("http_2XX");
        } else if res.status().is_redirection() {
            metrics.incr("http_3XX");
        } else if res.status().is_client_error() {
            metrics.incr("http_4XX");
        } else if res.status().is_server_error() {
            metrics.incr("http_5XX");
        }

        Ok(res)
    }
}

/// Stamps every outgoing response with `X-Timestamp`, the server time (in
/// milliseconds) at which the request was admitted. Registered as the
/// outermost wrapper so the header is present even on responses other
/// middleware short-circuits with (e.g. a 503 from [`node_status`]).
pub fn stamp_timestamp<B>(
    req: ServiceRequest,
    srv: &impl Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
) -> impl Future<Output = Result<ServiceResponse<B>, actix_web::Error>> {
    let server_time_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let fut = srv.call(req);

    async move {
        let mut res = fut.await?;
        res.headers_mut().insert(
            HeaderName::from_static(X_TIMESTAMP),
            HeaderValue::from_str(&server_time_ms.to_string())
                .expect("timestamp string is valid header value"),
        );
        Ok(res)
    }
}
