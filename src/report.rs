//! Aggregate reporting over the whole record collection.
//!
//! The storage layer sums raw figures in their stored units (Wh, g). This
//! module converts them into the reporting units (kWh, kg) and derives the
//! tree-day equivalence. The report is advisory: concurrent writes may land
//! between the totals query and the ranking query.

use crate::impact::ImpactFactors;
use crate::model::ReportSummary;
use crate::storage::CollectionTotals;

const WH_PER_KWH: f64 = 1000.0;
const GRAMS_PER_KG: f64 = 1000.0;

/// Build the report from collection totals and the worst endpoint, if any.
///
/// # Arguments
///
/// * `totals` - Raw sums over every stored record
/// * `worst_endpoint` - Endpoint with the highest cumulative emissions
/// * `factors` - Supplies the tree absorption constant
pub fn build_report(
    totals: &CollectionTotals,
    worst_endpoint: Option<String>,
    factors: &ImpactFactors,
) -> ReportSummary {
    let total_co2_kg = totals.co2_grams / GRAMS_PER_KG;

    ReportSummary {
        total_energy_kwh: totals.energy_wh / WH_PER_KWH,
        total_co2_kg,
        tree_days_equivalent: tree_days(total_co2_kg, factors.tree_absorption_kg_per_day),
        total_requests: totals.requests,
        total_records: totals.records,
        average_score: totals.average_score,
        worst_endpoint,
    }
}

/// Days one reference tree needs to absorb `co2_kg`.
fn tree_days(co2_kg: f64, absorption_kg_per_day: f64) -> f64 {
    if absorption_kg_per_day > 0.0 {
        co2_kg / absorption_kg_per_day
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_all_zero() {
        let report = build_report(&CollectionTotals::default(), None, &ImpactFactors::default());

        assert_eq!(report.total_energy_kwh, 0.0);
        assert_eq!(report.total_co2_kg, 0.0);
        assert_eq!(report.tree_days_equivalent, 0.0);
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.total_records, 0);
        assert_eq!(report.average_score, 0.0);
        assert!(report.worst_endpoint.is_none());
    }

    #[test]
    fn test_unit_conversion() {
        let totals = CollectionTotals {
            energy_wh: 2_500.0,
            co2_grams: 120.0,
            requests: 42,
            records: 7,
            average_score: 2.5,
        };

        let report = build_report(&totals, Some("/checkout".to_string()), &ImpactFactors::default());

        assert!((report.total_energy_kwh - 2.5).abs() < 1e-12);
        assert!((report.total_co2_kg - 0.12).abs() < 1e-12);
        // 0.12 kg / 0.06 kg per tree-day
        assert!((report.tree_days_equivalent - 2.0).abs() < 1e-9);
        assert_eq!(report.total_requests, 42);
        assert_eq!(report.total_records, 7);
        assert_eq!(report.worst_endpoint.as_deref(), Some("/checkout"));
    }

    #[test]
    fn test_zero_absorption_does_not_divide() {
        let factors = ImpactFactors {
            tree_absorption_kg_per_day: 0.0,
            ..ImpactFactors::default()
        };
        let totals = CollectionTotals {
            co2_grams: 10.0,
            ..CollectionTotals::default()
        };

        assert_eq!(build_report(&totals, None, &factors).tree_days_equivalent, 0.0);
    }
}
