use axum::Router;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    validate_request::ValidateRequestHeaderLayer,
};

use crate::AppState;

pub mod auth;
pub mod review;
pub mod tx;
pub mod user;
pub mod utils;

const BODY_LIMIT: usize = 16 * 1024;

/// Every route under `/v1`, with the shared layers applied.
pub fn build_router(state: AppState) -> Router {
    let wallet_routes = tx::tx_routes()
        .merge(tx::stream_routes().route_layer(ValidateRequestHeaderLayer::accept("text/event-stream")))
        .route_layer(CompressionLayer::new().gzip(true));

    let api = Router::new()
        .merge(auth::auth_routes())
        .merge(user::user_routes())
        .merge(wallet_routes)
        .merge(review::review_routes())
        .merge(review::reputation_routes());

    Router::new()
        .nest("/v1", api)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
