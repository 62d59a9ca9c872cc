use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ThrottlerError;
use crate::key_generator::Identifiers;
use crate::rate_limit_config::BucketSet;
use crate::response::RateLimitResponse;
use crate::throttler::Throttler;
use crate::validation::RequestValidator;

/// Shared application state
pub type SharedState = Throttler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub route: Option<String>,
    #[serde(flatten)]
    pub identifiers: Identifiers,
}

#[derive(Debug, Deserialize)]
pub struct BucketsQuery {
    pub route: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BucketsResponse {
    pub route: String,
    pub enabled: bool,
    pub buckets: BucketSet,
}

/// Check and consume the rate limit for a request
pub async fn check_rate_limit(
    State(throttler): State<SharedState>,
    Json(payload): Json<CheckRequest>,
) -> Result<impl IntoResponse, ThrottlerError> {
    let route = RequestValidator::validate_route(payload.route.as_deref())?;
    RequestValidator::validate_identifiers(&payload.identifiers)?;

    let outcome = throttler.check(&route, &payload.identifiers).await;

    let buckets = throttler.buckets_for(&route);
    let response =
        RateLimitResponse::from_outcome(outcome, |bucket| buckets.refill_interval_ms(bucket));

    let mut resp = Json(&response).into_response();

    if let Some(retry_after) = response.retry_after {
        *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        resp.headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    }

    Ok(resp)
}

/// Effective bucket configuration for a route
pub async fn get_buckets(
    State(throttler): State<SharedState>,
    Query(query): Query<BucketsQuery>,
) -> Result<impl IntoResponse, ThrottlerError> {
    let route = RequestValidator::validate_route(query.route.as_deref())?;

    Ok(Json(BucketsResponse {
        enabled: throttler.config().enabled,
        buckets: throttler.buckets_for(&route).clone(),
        route,
    }))
}

/// Health check endpoint.
///
/// Answers 200 even when the store is down: the limiter keeps serving
/// decisions through its failure policy.
pub async fn health_check(State(throttler): State<SharedState>) -> impl IntoResponse {
    Json(throttler.health_check().await)
}
