//! The metric store: the only way records get in or out.
//!
//! `create` is the single write path. It validates the sample, stamps it with
//! the server clock, runs the impact calculator and appends the result, so a
//! record can never carry caller-supplied or stale footprint figures.
//! There is no update path; `purge_all` is the only deletion.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use tracing::{debug, info};

use crate::error::{MetricError, Result};
use crate::impact::ImpactCalculator;
use crate::model::{
    EndpointEmissions, MetricFilter, MetricRecord, MetricView, MetricsQuery, RawSample,
    ReportSummary,
};
use crate::report::build_report;
use crate::storage::Storage;

/// Shared handle over storage plus the calculator. Cheap to clone.
#[derive(Clone)]
pub struct MetricStore {
    storage: Storage,
    calculator: ImpactCalculator,
}

impl MetricStore {
    pub fn new(storage: Storage, calculator: ImpactCalculator) -> Self {
        Self {
            storage,
            calculator,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Enrich and persist a sample.
    pub async fn create(&self, sample: RawSample) -> Result<MetricRecord> {
        sample.validate()?;

        // Storage keeps microseconds; return exactly what is stored.
        let captured_at = Utc::now().trunc_subsecs(6);
        let impact = self.calculator.assess(&sample);

        let record = MetricRecord {
            id: uuid::Uuid::new_v4().to_string(),
            application_name: sample.application_name,
            endpoint: sample.endpoint,
            environment: sample.environment,
            version: sample.version,
            cpu_usage_percent: sample.cpu_usage_percent,
            memory_used_mb: sample.memory_used_mb,
            duration_ms: sample.duration_ms,
            request_count: sample.request_count,
            operation_type: sample.operation_type,
            energy_consumed_wh: impact.energy_wh,
            emissions_co2_grams: impact.total_co2_grams,
            carbon_score: impact.score,
            captured_at,
            additional_data: sample.additional_data,
        };

        self.storage.insert_record(&record).await?;

        info!(
            id = %record.id,
            application = %record.application_name,
            endpoint = %record.endpoint,
            score = %record.carbon_score,
            co2_grams = record.emissions_co2_grams,
            "Metric recorded"
        );

        Ok(record)
    }

    /// One page of matching records, newest first, as display projections.
    ///
    /// `page` is 1-indexed. A page past the end yields an empty list.
    pub async fn list(
        &self,
        page: i64,
        page_size: i64,
        filter: &MetricFilter,
    ) -> Result<Vec<MetricView>> {
        if page < 1 {
            return Err(MetricError::validation("page must be at least 1"));
        }
        if page_size < 1 {
            return Err(MetricError::validation("pageSize must be at least 1"));
        }
        if let (Some(start), Some(end)) = (filter.start_time, filter.end_time)
            && start > end
        {
            return Err(MetricError::validation(
                "startTime must not be later than endTime",
            ));
        }

        let offset = (page - 1).saturating_mul(page_size);
        let records = self.storage.query_records(filter, offset, page_size).await?;

        debug!(page, page_size, returned = records.len(), "Metrics page read");

        Ok(records.iter().map(MetricView::from).collect())
    }

    /// Parse raw query parameters, then [`MetricStore::list`].
    pub async fn list_query(&self, query: &MetricsQuery) -> Result<Vec<MetricView>> {
        let filter = parse_filter(query)?;
        self.list(query.page, query.page_size, &filter).await
    }

    /// Every application name present in the collection, sorted.
    pub async fn distinct_applications(&self) -> Result<Vec<String>> {
        self.storage.get_distinct_applications().await
    }

    /// Aggregate footprint over every record.
    pub async fn report(&self) -> Result<ReportSummary> {
        let totals = self.storage.compute_totals().await?;
        let worst_endpoint = self
            .storage
            .rank_endpoints(1)
            .await?
            .into_iter()
            .next()
            .map(|e| e.endpoint);

        Ok(build_report(
            &totals,
            worst_endpoint,
            self.calculator.factors(),
        ))
    }

    /// Endpoints ordered by cumulative emissions, highest first.
    pub async fn endpoint_ranking(&self, limit: i64) -> Result<Vec<EndpointEmissions>> {
        if limit < 1 {
            return Err(MetricError::validation("limit must be at least 1"));
        }
        self.storage.rank_endpoints(limit).await
    }

    /// Irreversibly delete every record. Maintenance use only.
    pub async fn purge_all(&self) -> Result<u64> {
        let deleted = self.storage.delete_all().await?;
        info!(deleted, "All metric records purged");
        Ok(deleted)
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Turn raw query strings into a [`MetricFilter`].
///
/// Empty strings count as absent. Dates that fail to parse are rejected.
pub fn parse_filter(query: &MetricsQuery) -> Result<MetricFilter> {
    Ok(MetricFilter {
        application: non_empty(query.application.as_deref()),
        environment: non_empty(query.environment.as_deref()),
        start_time: parse_time_bound("startTime", query.start_time.as_deref(), Bound::Start)?,
        end_time: parse_time_bound("endTime", query.end_time.as_deref(), Bound::End)?,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]` or a bare `YYYY-MM-DD`.
///
/// Values without an offset are read in server-local time, the same zone
/// listings are displayed in. A bare end date covers the whole day.
fn parse_time_bound(
    name: &str,
    value: Option<&str>,
    bound: Bound,
) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
            match bound {
                Bound::Start => date.and_hms_opt(0, 0, 0),
                Bound::End => date.and_hms_micro_opt(23, 59, 59, 999_999),
            }
        });

    // A wall-clock time skipped by a DST jump has no instant; reject it.
    if let Some(local) = naive.and_then(|n| local_to_utc(&n, bound)) {
        return Ok(Some(local));
    }

    Err(MetricError::validation(format!(
        "{name} is not a valid date or timestamp: '{value}'"
    )))
}

/// Resolve a local wall-clock time, picking the wider side when ambiguous.
fn local_to_utc(naive: &NaiveDateTime, bound: Bound) -> Option<DateTime<Utc>> {
    let mapped = naive.and_local_timezone(Local);
    let local = match bound {
        Bound::Start => mapped.earliest(),
        Bound::End => mapped.latest(),
    }?;
    Some(local.with_timezone(&Utc))
}
