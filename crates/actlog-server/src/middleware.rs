//! Audit middleware.
//!
//! Opens the request context scope around every request, fires the CORS
//! trigger before the handler and the request trigger after it.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use actlog_audit::context::{self, Headers, RequestContext};
use actlog_audit::AuditError;

use crate::state::AppState;

pub async fn audit_requests(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let ctx = request_context(&req);
    let auditor = state.auditor.clone();

    context::scope(ctx, async move {
        if let Err(e) = auditor.request_started().await {
            return audit_failure(e);
        }

        let response = next.run(req).await;

        match auditor.request_finished().await {
            Ok(_) => response,
            Err(e) => audit_failure(e),
        }
    })
    .await
}

/// Transport view of an axum request.
pub fn request_context(req: &Request) -> RequestContext {
    let uri = req.uri();
    let mut ctx = RequestContext::new(req.method().as_str(), uri.path())
        .with_headers(collect_headers(req.headers()));
    if let Some(query) = uri.query() {
        ctx = ctx.with_query(query);
    }
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        ctx = ctx.with_peer_addr(addr.ip());
    }
    ctx
}

fn collect_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

/// Only reached when `propagate_errors` is on.
fn audit_failure(e: AuditError) -> Response {
    tracing::error!(error = %e, "Audit failure");
    (StatusCode::INTERNAL_SERVER_ERROR, "audit failure").into_response()
}
