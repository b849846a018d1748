//! HTTP API handlers for EcoCode.
//!
//! Thin layer over [`MetricStore`]: handlers extract parameters, call one
//! store operation and map [`MetricError`] onto a status code. Validation
//! failures become `400`, an unreachable database `503`. An empty result is
//! always a `200` with an empty body collection. Bodies and query strings
//! axum cannot decode are validation failures too, with the same JSON body.

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tracing::{info, instrument, warn};

use crate::error::MetricError;
use crate::model::{
    EndpointEmissions, MetricRecord, MetricView, MetricsQuery, PurgeResponse, RankingQuery,
    RawSample, ReportSummary,
};
use crate::store::MetricStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: MetricStore,
}

/// `Json` extractor whose rejection is a [`MetricError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(MetricError))]
pub struct ApiJson<T>(pub T);

/// `Query` extractor whose rejection is a [`MetricError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(MetricError))]
pub struct ApiQuery<T>(pub T);

/// Build the router with every route mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/metrics", get(get_metrics).post(post_metric).delete(delete_metrics))
        .route("/api/metrics/applications", get(get_applications))
        .route("/api/metrics/report", get(get_report))
        .route("/api/metrics/ranking", get(get_ranking))
        .route("/health", get(health_check))
        .with_state(state)
}

/// POST /api/metrics - Record a resource-usage sample.
///
/// # Request Body
///
/// ```json
/// {
///     "applicationName": "shop",
///     "endpoint": "/checkout",
///     "environment": "staging",
///     "cpuUsagePercent": 50.0,
///     "memoryUsedMB": 500,
///     "durationMs": 200,
///     "requestCount": 1
/// }
/// ```
///
/// `environment`, `requestCount` and `operationType` are optional.
///
/// # Response
///
/// Returns `201 Created` with the enriched record.
#[instrument(skip(state, sample), fields(application, endpoint))]
pub async fn post_metric(
    State(state): State<AppState>,
    ApiJson(sample): ApiJson<RawSample>,
) -> Result<(StatusCode, Json<MetricRecord>), MetricError> {
    let span = tracing::Span::current();
    span.record("application", sample.application_name.as_str());
    span.record("endpoint", sample.endpoint.as_str());

    match state.store.create(sample).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(e) => {
            warn!(error = %e, "Failed to record metric");
            Err(e)
        }
    }
}

/// GET /api/metrics - Page through recorded metrics, newest first.
///
/// # Query Parameters
///
/// - `page` (optional): 1-indexed page number (default: 1)
/// - `pageSize` (optional): Records per page (default: 20)
/// - `application`, `environment` (optional): Exact-match filters
/// - `startTime`, `endTime` (optional): Inclusive bounds, RFC 3339,
///   `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`. Values without an offset are
///   server-local time, matching the `capturedAt` display.
#[instrument(skip(state))]
pub async fn get_metrics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MetricsQuery>,
) -> Result<Json<Vec<MetricView>>, MetricError> {
    match state.store.list_query(&query).await {
        Ok(views) => {
            info!(
                page = query.page,
                page_size = query.page_size,
                returned = views.len(),
                "Metrics queried"
            );
            Ok(Json(views))
        }
        Err(e) => {
            warn!(error = %e, "Failed to query metrics");
            Err(e)
        }
    }
}

/// GET /api/metrics/applications - Every application name seen so far.
#[instrument(skip(state))]
pub async fn get_applications(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, MetricError> {
    let applications = state.store.distinct_applications().await.map_err(|e| {
        warn!(error = %e, "Failed to list applications");
        e
    })?;

    Ok(Json(applications))
}

/// GET /api/metrics/report - Aggregate footprint summary.
///
/// # Response
///
/// ```json
/// {
///     "totalEnergyKwh": 0.0417,
///     "totalCo2Kg": 0.0016,
///     "treeDaysEquivalent": 0.0268,
///     "totalRequests": 11,
///     "totalRecords": 2,
///     "averageScore": 3.0,
///     "worstEndpoint": "/checkout"
/// }
/// ```
///
/// `worstEndpoint` is `null` when nothing has been recorded.
#[instrument(skip(state))]
pub async fn get_report(State(state): State<AppState>) -> Result<Json<ReportSummary>, MetricError> {
    match state.store.report().await {
        Ok(report) => {
            info!(
                total_records = report.total_records,
                total_co2_kg = report.total_co2_kg,
                worst_endpoint = ?report.worst_endpoint,
                "Report generated"
            );
            Ok(Json(report))
        }
        Err(e) => {
            warn!(error = %e, "Failed to generate report");
            Err(e)
        }
    }
}

/// GET /api/metrics/ranking - Endpoints by cumulative emissions.
///
/// # Query Parameters
///
/// - `limit` (optional): Maximum endpoints returned (default: 10)
#[instrument(skip(state))]
pub async fn get_ranking(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RankingQuery>,
) -> Result<Json<Vec<EndpointEmissions>>, MetricError> {
    let ranking = state
        .store
        .endpoint_ranking(query.limit)
        .await
        .map_err(|e| {
            warn!(limit = query.limit, error = %e, "Failed to rank endpoints");
            e
        })?;

    Ok(Json(ranking))
}

/// DELETE /api/metrics - Remove every record. Development and maintenance only.
#[instrument(skip(state))]
pub async fn delete_metrics(
    State(state): State<AppState>,
) -> Result<Json<PurgeResponse>, MetricError> {
    match state.store.purge_all().await {
        Ok(deleted) => Ok(Json(PurgeResponse { deleted })),
        Err(e) => {
            warn!(error = %e, "Failed to purge metrics");
            Err(e)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
