//! Process configuration, read from the environment.
//!
//! Every variable is optional. A missing or unparsable value falls back to
//! its default.

use std::env;
use std::str::FromStr;

use crate::impact::ImpactFactors;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 5000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_URL: &str = "sqlite:ecocode.db?mode=rwc";

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub factors: ImpactFactors,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            factors: ImpactFactors::default(),
        }
    }
}

impl Settings {
    /// Load settings from `ECOCODE_*` environment variables.
    ///
    /// - `ECOCODE_PORT`
    /// - `ECOCODE_DATABASE_URL`
    /// - `ECOCODE_MAX_CONNECTIONS`
    /// - `ECOCODE_BASE_FACTOR` (g CO2 per impact point)
    /// - `ECOCODE_GRID_INTENSITY` (g CO2 per Wh equivalent)
    /// - `ECOCODE_TREE_ABSORPTION` (kg CO2 per tree per day)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        Self {
            port: parsed(&lookup, "ECOCODE_PORT").unwrap_or(defaults.port),
            database_url: lookup("ECOCODE_DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: parsed::<u32, _>(&lookup, "ECOCODE_MAX_CONNECTIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            factors: ImpactFactors {
                base_factor_g_per_point: positive(parsed(&lookup, "ECOCODE_BASE_FACTOR"))
                    .unwrap_or(defaults.factors.base_factor_g_per_point),
                grid_intensity_g_per_wh: positive(parsed(&lookup, "ECOCODE_GRID_INTENSITY"))
                    .unwrap_or(defaults.factors.grid_intensity_g_per_wh),
                tree_absorption_kg_per_day: positive(parsed(&lookup, "ECOCODE_TREE_ABSORPTION"))
                    .unwrap_or(defaults.factors.tree_absorption_kg_per_day),
            },
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Factors must be finite and above zero to be used as divisors.
fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(lookup_from(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.factors.base_factor_g_per_point, 0.001);
        assert_eq!(settings.factors.grid_intensity_g_per_wh, 0.0385);
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("ECOCODE_PORT", "8080"),
            ("ECOCODE_DATABASE_URL", "sqlite::memory:"),
            ("ECOCODE_GRID_INTENSITY", "0.5"),
        ]));

        assert_eq!(settings.port, 8080);
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.factors.grid_intensity_g_per_wh, 0.5);
        assert_eq!(settings.factors.base_factor_g_per_point, 0.001);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("ECOCODE_PORT", "not-a-port"),
            ("ECOCODE_MAX_CONNECTIONS", "0"),
            ("ECOCODE_GRID_INTENSITY", "-1"),
            ("ECOCODE_TREE_ABSORPTION", "NaN"),
        ]));

        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(settings.factors, ImpactFactors::default());
    }
}
