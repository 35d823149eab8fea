//! Engine configuration.
//!
//! Everything tunable lives here, including the domain weighting tables.
//! The district affluence map and seasonal factors ship with Warsaw
//! defaults but are plain data: a deployment overrides them at engine
//! construction without touching weighting logic.

use std::collections::HashMap;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-adapter call timeout; independently applied to every backend.
    pub adapter_timeout: Duration,
    /// Whole-pipeline wall-clock budget. When exceeded the pipeline still
    /// finishes on whatever data settled, flagged partial.
    pub execution_budget: Duration,
    /// Default minimum cosine similarity for semantic ranking.
    pub semantic_similarity_floor: f64,
    pub cache: CacheConfig,
    pub weighting: WeightingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            adapter_timeout: Duration::from_secs(10),
            execution_budget: Duration::from_secs(30),
            semantic_similarity_floor: 0.35,
            cache: CacheConfig::default(),
            weighting: WeightingConfig::default(),
        }
    }
}

/// Result cache sizing and expiry.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Capacity in serialized bytes; least-recently-accessed entries are
    /// evicted once the total would exceed it.
    pub max_bytes: usize,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: 256,
            max_bytes: 64 * 1024 * 1024,
            default_ttl: Duration::from_secs(300),
        }
    }
}

/// Domain weighting tables.
#[derive(Debug, Clone)]
pub struct WeightingConfig {
    /// District name to affluence factor.
    pub affluence: HashMap<String, f64>,
    /// Factor for districts absent from the table.
    pub default_affluence: f64,
    /// Seasonal demand factors indexed by month, January first.
    pub seasonal: [f64; 12],
    /// Fraction of a cost column recoverable at perfect route efficiency.
    pub route_discount_rate: f64,
}

impl WeightingConfig {
    /// Affluence factor for a district, falling back to the configured
    /// default for unknown names.
    pub fn affluence_factor(&self, district: &str) -> f64 {
        self.affluence
            .get(district)
            .copied()
            .unwrap_or(self.default_affluence)
    }

    /// Seasonal factor for a 1-based month; out-of-range months are
    /// treated as neutral.
    pub fn seasonal_factor(&self, month: u32) -> f64 {
        match month {
            1..=12 => self.seasonal[(month - 1) as usize],
            _ => 1.0,
        }
    }
}

impl Default for WeightingConfig {
    fn default() -> Self {
        // Warsaw districts scaled 0.3-1.0 by purchasing power. The table is
        // ordinary configuration; unknown districts fall back to 0.5.
        let affluence = [
            ("Wilanów", 1.0),
            ("Śródmieście", 0.95),
            ("Mokotów", 0.9),
            ("Żoliborz", 0.85),
            ("Ursynów", 0.8),
            ("Ochota", 0.75),
            ("Wola", 0.7),
            ("Bemowo", 0.65),
            ("Bielany", 0.6),
            ("Włochy", 0.6),
            ("Wawer", 0.55),
            ("Ursus", 0.5),
            ("Targówek", 0.45),
            ("Białołęka", 0.45),
            ("Praga-Południe", 0.4),
            ("Rembertów", 0.4),
            ("Wesoła", 0.4),
            ("Praga-Północ", 0.35),
        ]
        .into_iter()
        .map(|(name, factor)| (name.to_owned(), factor))
        .collect();

        WeightingConfig {
            affluence,
            default_affluence: 0.5,
            // Heating season peaks December-February, shoulders in November
            // and March; cooling season June-August.
            seasonal: [
                1.35, // Jan
                1.3,  // Feb
                1.15, // Mar
                1.0,  // Apr
                1.0,  // May
                1.2,  // Jun
                1.25, // Jul
                1.2,  // Aug
                1.0,  // Sep
                1.0,  // Oct
                1.15, // Nov
                1.35, // Dec
            ],
            route_discount_rate: 0.15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affluence_lookup_with_default() {
        let cfg = WeightingConfig::default();
        assert_eq!(cfg.affluence_factor("Wilanów"), 1.0);
        assert_eq!(cfg.affluence_factor("Praga-Północ"), 0.35);
        assert_eq!(cfg.affluence_factor("Radom"), 0.5);
    }

    #[test]
    fn seasonal_peaks() {
        let cfg = WeightingConfig::default();
        assert!(cfg.seasonal_factor(1) >= 1.3);
        assert!(cfg.seasonal_factor(12) >= 1.3);
        assert!(cfg.seasonal_factor(7) >= 1.2);
        assert_eq!(cfg.seasonal_factor(4), 1.0);
        assert_eq!(cfg.seasonal_factor(0), 1.0);
        assert_eq!(cfg.seasonal_factor(13), 1.0);
    }
}
