//! Impact calculator: turns a sample's technical fields into an estimated
//! energy and CO2 footprint plus a carbon score.
//!
//! The formula is a fixed heuristic, not a certified carbon-accounting model:
//!
//! ```text
//! points        = (cpu% / 10) * (duration_ms / 100) * (memory_mb / 1000)
//! co2_per_req_g = points * base_factor
//! score         = classify(co2_per_req_g)
//! total_co2_g   = co2_per_req_g * request_count
//! energy_wh     = total_co2_g / grid_intensity
//! ```
//!
//! The score is taken from the per-request figure, before scaling by the
//! request count, so volume does not change how a single call is rated.

use serde::{Deserialize, Serialize};

use crate::model::{CarbonScore, RawSample};

/// Grams of CO2 per impact point.
pub const BASE_FACTOR_G_PER_POINT: f64 = 0.001;

/// Grams of CO2 per watt-hour equivalent.
pub const GRID_INTENSITY_G_PER_WH: f64 = 0.0385;

/// Kilograms of CO2 one reference tree absorbs per day (~22 kg per year).
pub const TREE_ABSORPTION_KG_PER_DAY: f64 = 0.06;

/// Tunable constants behind the impact formula and the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactFactors {
    pub base_factor_g_per_point: f64,
    pub grid_intensity_g_per_wh: f64,
    pub tree_absorption_kg_per_day: f64,
}

impl Default for ImpactFactors {
    fn default() -> Self {
        Self {
            base_factor_g_per_point: BASE_FACTOR_G_PER_POINT,
            grid_intensity_g_per_wh: GRID_INTENSITY_G_PER_WH,
            tree_absorption_kg_per_day: TREE_ABSORPTION_KG_PER_DAY,
        }
    }
}

/// Footprint of one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub points: f64,
    pub co2_per_request_grams: f64,
    pub total_co2_grams: f64,
    pub energy_wh: f64,
    pub score: CarbonScore,
}

/// Pure, stateless calculator. Cheap to copy and safe to share.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpactCalculator {
    factors: ImpactFactors,
}

impl ImpactCalculator {
    pub fn new(factors: ImpactFactors) -> Self {
        Self { factors }
    }

    pub fn factors(&self) -> &ImpactFactors {
        &self.factors
    }

    /// Compute the footprint from raw technical figures.
    pub fn compute(
        &self,
        cpu_usage_percent: f64,
        duration_ms: i64,
        memory_used_mb: i64,
        request_count: i64,
    ) -> Impact {
        let points = (cpu_usage_percent / 10.0)
            * (duration_ms as f64 / 100.0)
            * (memory_used_mb as f64 / 1000.0);

        let co2_per_request_grams = points * self.factors.base_factor_g_per_point;

        // Score before scaling by request count.
        let score = CarbonScore::classify(co2_per_request_grams);

        let total_co2_grams = co2_per_request_grams * request_count as f64;
        let energy_wh = total_co2_grams / self.factors.grid_intensity_g_per_wh;

        Impact {
            points,
            co2_per_request_grams,
            total_co2_grams,
            energy_wh,
            score,
        }
    }

    pub fn assess(&self, sample: &RawSample) -> Impact {
        self.compute(
            sample.cpu_usage_percent,
            sample.duration_ms,
            sample.memory_used_mb,
            sample.request_count,
        )
    }
}
