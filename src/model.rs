//! Data models for EcoCode.
//!
//! A [`RawSample`] is what an instrumented application submits. The store
//! enriches it into a [`MetricRecord`], which is append-only once written.
//! Everything else here is a read-side view derived from stored records.
//!
//! JSON field names follow the persisted schema contract (camelCase, with
//! `memoryUsedMB` and `emissionsCO2Grams` spelled out explicitly).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetricError;

/// Default environment tag for samples that do not name one.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Default operation type for samples that do not name one.
pub const DEFAULT_OPERATION_TYPE: &str = "Processing";

/// A single resource-usage observation submitted for one logical operation.
///
/// `application_name` and `endpoint` default to empty when absent from the
/// payload so that [`RawSample::validate`] can reject them by name instead of
/// failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    #[serde(default)]
    pub application_name: String,

    #[serde(default)]
    pub endpoint: String,

    /// Deployment environment, e.g. "dev", "staging", "production".
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub version: Option<String>,

    /// CPU usage in percent. Expected in 0..=100, not enforced.
    #[serde(default)]
    pub cpu_usage_percent: f64,

    #[serde(default, rename = "memoryUsedMB")]
    pub memory_used_mb: i64,

    #[serde(default)]
    pub duration_ms: i64,

    /// Number of requests this sample stands for (default 1).
    #[serde(default = "default_request_count")]
    pub request_count: i64,

    /// Free-form tag such as "Query", "Processing", "I/O", "Network".
    #[serde(default = "default_operation_type")]
    pub operation_type: String,

    #[serde(default)]
    pub additional_data: Option<BTreeMap<String, String>>,
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_request_count() -> i64 {
    1
}

fn default_operation_type() -> String {
    DEFAULT_OPERATION_TYPE.to_string()
}

impl RawSample {
    /// Build a sample with the given identity and all other fields defaulted.
    pub fn new(application_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            endpoint: endpoint.into(),
            environment: default_environment(),
            version: None,
            cpu_usage_percent: 0.0,
            memory_used_mb: 0,
            duration_ms: 0,
            request_count: default_request_count(),
            operation_type: default_operation_type(),
            additional_data: None,
        }
    }

    /// Reject samples missing a required identity field.
    ///
    /// Numeric fields are not range-checked; negative values flow through
    /// the calculator unchanged.
    pub fn validate(&self) -> Result<(), MetricError> {
        if self.application_name.trim().is_empty() {
            return Err(MetricError::Validation(
                "applicationName is required".to_string(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(MetricError::Validation("endpoint is required".to_string()));
        }
        Ok(())
    }
}

/// Five-letter qualitative classification of a single request's emissions.
///
/// `A` is the most efficient, `E` the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CarbonScore {
    A,
    B,
    C,
    D,
    E,
}

impl CarbonScore {
    /// Classify grams of CO2 emitted by one request.
    ///
    /// # Thresholds
    ///
    /// - `A`: x < 0.001 g
    /// - `B`: 0.001 <= x < 0.01
    /// - `C`: 0.01 <= x < 0.1
    /// - `D`: 0.1 <= x < 1.0
    /// - `E`: x >= 1.0
    pub fn classify(co2_per_request_grams: f64) -> Self {
        if co2_per_request_grams < 0.001 {
            CarbonScore::A
        } else if co2_per_request_grams < 0.01 {
            CarbonScore::B
        } else if co2_per_request_grams < 0.1 {
            CarbonScore::C
        } else if co2_per_request_grams < 1.0 {
            CarbonScore::D
        } else {
            CarbonScore::E
        }
    }

    /// Position on the 1..=5 scale used for averaging (A = 1, E = 5).
    pub fn ordinal(self) -> u8 {
        match self {
            CarbonScore::A => 1,
            CarbonScore::B => 2,
            CarbonScore::C => 3,
            CarbonScore::D => 4,
            CarbonScore::E => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CarbonScore::A => "A",
            CarbonScore::B => "B",
            CarbonScore::C => "C",
            CarbonScore::D => "D",
            CarbonScore::E => "E",
        }
    }

    /// Inverse of [`CarbonScore::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "A" => Some(CarbonScore::A),
            "B" => Some(CarbonScore::B),
            "C" => Some(CarbonScore::C),
            "D" => Some(CarbonScore::D),
            "E" => Some(CarbonScore::E),
            _ => None,
        }
    }
}

impl std::fmt::Display for CarbonScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted, enriched sample.
///
/// `energy_consumed_wh`, `emissions_co2_grams` and `carbon_score` are only
/// ever produced by the impact calculator from this record's own fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub id: String,
    pub application_name: String,
    pub endpoint: String,
    pub environment: String,
    pub version: Option<String>,
    pub cpu_usage_percent: f64,
    #[serde(rename = "memoryUsedMB")]
    pub memory_used_mb: i64,
    pub duration_ms: i64,
    pub request_count: i64,
    pub operation_type: String,
    pub energy_consumed_wh: f64,
    #[serde(rename = "emissionsCO2Grams")]
    pub emissions_co2_grams: f64,
    pub carbon_score: CarbonScore,
    /// Server-assigned capture time (UTC).
    pub captured_at: DateTime<Utc>,
    pub additional_data: Option<BTreeMap<String, String>>,
}

/// Display projection returned by the paginated listing.
///
/// Numbers are rounded for display and the capture time is rendered as
/// `dd/mm/yyyy HH:MM:SS` in local time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricView {
    pub id: String,
    pub application_name: String,
    pub endpoint: String,
    pub environment: String,
    pub cpu_usage_percent: f64,
    #[serde(rename = "memoryUsedMB")]
    pub memory_used_mb: i64,
    pub duration_ms: i64,
    pub request_count: i64,
    pub operation_type: String,
    pub energy_consumed_wh: f64,
    #[serde(rename = "emissionsCO2Grams")]
    pub emissions_co2_grams: f64,
    pub carbon_score: CarbonScore,
    pub captured_at: String,
}

/// Display format for capture timestamps in [`MetricView`].
pub const DISPLAY_TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

impl From<&MetricRecord> for MetricView {
    fn from(record: &MetricRecord) -> Self {
        Self {
            id: record.id.clone(),
            application_name: record.application_name.clone(),
            endpoint: record.endpoint.clone(),
            environment: record.environment.clone(),
            cpu_usage_percent: round_to(record.cpu_usage_percent, 2),
            memory_used_mb: record.memory_used_mb,
            duration_ms: record.duration_ms,
            request_count: record.request_count,
            operation_type: record.operation_type.clone(),
            energy_consumed_wh: round_to(record.energy_consumed_wh, 4),
            emissions_co2_grams: round_to(record.emissions_co2_grams, 4),
            carbon_score: record.carbon_score,
            captured_at: record
                .captured_at
                .with_timezone(&chrono::Local)
                .format(DISPLAY_TIME_FORMAT)
                .to_string(),
        }
    }
}

/// Round `value` to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Conjunctive filter for record listings. `None` imposes no constraint.
///
/// Both time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricFilter {
    pub application: Option<String>,
    pub environment: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Aggregate view over every stored record, recomputed on each request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_energy_kwh: f64,
    pub total_co2_kg: f64,
    /// Days of CO2 absorption by one reference tree.
    pub tree_days_equivalent: f64,
    pub total_requests: i64,
    pub total_records: i64,
    /// Mean of carbon scores on the 1..=5 scale, 0 when there are no records.
    pub average_score: f64,
    /// Endpoint with the highest cumulative emissions; `None` when empty.
    pub worst_endpoint: Option<String>,
}

/// Cumulative footprint of one endpoint across all of its records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointEmissions {
    pub endpoint: String,
    #[serde(rename = "totalEmissionsCO2Grams")]
    pub total_emissions_co2_grams: f64,
    pub total_energy_wh: f64,
    pub total_requests: i64,
    pub record_count: i64,
}

/// Query parameters for `GET /api/metrics`.
///
/// Dates arrive as raw strings and are parsed by the store so that a bad
/// value is reported as a validation failure rather than silently dropped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_page_size")]
    pub page_size: i64,

    pub application: Option<String>,
    pub environment: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// First page number; pages are 1-indexed.
pub fn default_page() -> i64 {
    1
}

pub fn default_page_size() -> i64 {
    20
}

/// Query parameters for `GET /api/metrics/ranking`.
#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    #[serde(default = "default_ranking_limit")]
    pub limit: i64,
}

pub fn default_ranking_limit() -> i64 {
    10
}

/// Response body for `DELETE /api/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_classify_lower_bounds_are_inclusive() {
        assert_eq!(CarbonScore::classify(0.0), CarbonScore::A);
        assert_eq!(CarbonScore::classify(0.000_999), CarbonScore::A);
        assert_eq!(CarbonScore::classify(0.001), CarbonScore::B);
        assert_eq!(CarbonScore::classify(0.01), CarbonScore::C);
        assert_eq!(CarbonScore::classify(0.1), CarbonScore::D);
        assert_eq!(CarbonScore::classify(1.0), CarbonScore::E);
    }

    #[test]
    fn test_classify_upper_bounds_are_exclusive() {
        assert_eq!(CarbonScore::classify(0.009_999), CarbonScore::B);
        assert_eq!(CarbonScore::classify(0.099_999), CarbonScore::C);
        assert_eq!(CarbonScore::classify(0.999_999), CarbonScore::D);
        assert_eq!(CarbonScore::classify(1_000.0), CarbonScore::E);
    }

    #[test]
    fn test_score_ordinals_and_parse() {
        let all = [
            CarbonScore::A,
            CarbonScore::B,
            CarbonScore::C,
            CarbonScore::D,
            CarbonScore::E,
        ];
        for (i, score) in all.iter().enumerate() {
            assert_eq!(score.ordinal() as usize, i + 1);
            assert_eq!(CarbonScore::parse(score.as_str()), Some(*score));
        }
        assert_eq!(CarbonScore::parse("F"), None);
    }

    #[test]
    fn test_sample_defaults_from_json() {
        let sample: RawSample = serde_json::from_str(
            r#"{"applicationName": "shop", "endpoint": "/cart", "cpuUsagePercent": 12.5, "memoryUsedMB": 256}"#,
        )
        .unwrap();

        assert_eq!(sample.environment, "production");
        assert_eq!(sample.operation_type, "Processing");
        assert_eq!(sample.request_count, 1);
        assert_eq!(sample.memory_used_mb, 256);
        assert!(sample.version.is_none());
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn test_validate_names_missing_field() {
        let err = RawSample::new("", "/cart").validate().unwrap_err();
        assert!(err.to_string().contains("applicationName"));

        let err = RawSample::new("shop", "  ").validate().unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_view_rounds_and_formats() {
        let record = MetricRecord {
            id: "abc".to_string(),
            application_name: "shop".to_string(),
            endpoint: "/cart".to_string(),
            environment: "production".to_string(),
            version: None,
            cpu_usage_percent: 33.33333,
            memory_used_mb: 100,
            duration_ms: 250,
            request_count: 1,
            operation_type: "Query".to_string(),
            energy_consumed_wh: 0.129_870_129,
            emissions_co2_grams: 0.005_000_4,
            carbon_score: CarbonScore::B,
            captured_at: Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap(),
            additional_data: None,
        };

        let view = MetricView::from(&record);

        assert_eq!(view.cpu_usage_percent, 33.33);
        assert_eq!(view.energy_consumed_wh, 0.1299);
        assert_eq!(view.emissions_co2_grams, 0.005);
        // dd/mm/yyyy HH:MM:SS
        let bytes = view.captured_at.as_bytes();
        assert_eq!(view.captured_at.len(), 19);
        assert_eq!(bytes[2], b'/');
        assert_eq!(bytes[5], b'/');
        assert_eq!(bytes[10], b' ');
        assert_eq!(bytes[13], b':');
    }
}
