//! Domain weighting: district affluence, seasonal demand, route efficiency.
//!
//! Three independent numeric transforms, each gated by its settings flag
//! and applied in a fixed order: affluence, then seasonal, then the
//! route-efficiency discount. The pass works on a copy of the merged rows
//! so re-weighting the same merge output with different settings is
//! deterministic and replayable.
//!
//! Which columns each transform touches comes from catalog field roles,
//! and every factor comes from [`WeightingConfig`]; nothing here names a
//! district or a month.

use std::collections::{HashMap, HashSet};

use aeris_report_core::{
    DomainWeightingSettings, FieldDef, FieldRole, RowSet, ScalarValue, WarsawMetrics,
};

use crate::config::WeightingConfig;

/// Apply the enabled transforms to a copy of `rows`.
///
/// `roles` maps namespaced column names to their catalog definitions;
/// `district_column` is the namespaced district column, when the report
/// has one; `month` is the 1-based month the seasonal factor keys off
/// (already resolved by the orchestrator: override, date range, or
/// generation time).
pub fn apply(
    rows: &RowSet,
    settings: &DomainWeightingSettings,
    config: &WeightingConfig,
    roles: &HashMap<String, FieldDef>,
    district_column: Option<&str>,
    month: u32,
) -> (RowSet, WarsawMetrics) {
    let span = tracing::debug_span!(
        "weighting",
        rows = rows.len(),
        affluence = settings.affluence_weighting,
        seasonal = settings.seasonal_adjustment,
        route = settings.route_efficiency_weighting,
    );
    let _enter = span.enter();

    let mut out = rows.clone();
    let mut metrics = WarsawMetrics::default();

    let columns_with_role = |role: FieldRole| -> Vec<&str> {
        roles
            .iter()
            .filter(|(_, def)| def.role == role)
            .map(|(name, _)| name.as_str())
            .collect()
    };
    let demand_columns = columns_with_role(FieldRole::Demand);
    let cost_columns = columns_with_role(FieldRole::Cost);
    let efficiency_columns = columns_with_role(FieldRole::RouteEfficiency);
    // Cost columns are money amounts too: the affluence pass scales them
    // alongside currency columns, which is why running affluence before
    // the route discount gives a different answer than the reverse.
    let mut money_columns = columns_with_role(FieldRole::Currency);
    money_columns.extend(&cost_columns);

    if settings.affluence_weighting {
        let mut districts: HashSet<String> = HashSet::new();
        for row in out.rows_mut() {
            let district = district_column
                .and_then(|column| row.get(column))
                .and_then(|v| v.as_str().map(str::to_owned));
            if let Some(filter) = &settings.district_filter {
                if district.as_deref() != Some(filter.as_str()) {
                    continue;
                }
            }
            let factor = match &district {
                Some(name) => config.affluence_factor(name),
                None => config.default_affluence,
            };
            let mut touched = false;
            for column in &money_columns {
                if let Some(value) = row.get(column).and_then(ScalarValue::as_f64) {
                    row.set(column.to_owned(), value * factor);
                    touched = true;
                }
            }
            if touched {
                if let Some(name) = district {
                    districts.insert(name);
                }
            }
        }
        metrics.affluence_applied = true;
        metrics.districts_weighted = districts.len();
    }

    if settings.seasonal_adjustment {
        let factor = config.seasonal_factor(month);
        metrics.seasonal_factor = Some(factor);
        for row in out.rows_mut() {
            for column in &demand_columns {
                if let Some(value) = row.get(column).and_then(ScalarValue::as_f64) {
                    row.set(column.to_owned(), value * factor);
                }
            }
        }
    }

    if settings.route_efficiency_weighting {
        for row in out.rows_mut() {
            // A row has route data when it carries an efficiency score in
            // [0, 1]; rows without one pass through untouched.
            let efficiency = efficiency_columns
                .iter()
                .find_map(|column| row.get(column).and_then(ScalarValue::as_f64))
                .filter(|e| (0.0..=1.0).contains(e));
            let Some(efficiency) = efficiency else { continue };
            for column in &cost_columns {
                if let Some(cost) = row.get(column).and_then(ScalarValue::as_f64) {
                    let discount = cost * config.route_discount_rate * efficiency;
                    let discounted = (cost - discount).max(0.0);
                    metrics.route_discount_total += cost - discounted;
                    row.set(column.to_owned(), discounted);
                }
            }
        }
    }

    (out, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_report_core::{FieldType, Row};

    fn roles() -> HashMap<String, FieldDef> {
        [
            ("jobs.district", FieldType::Text, FieldRole::District),
            ("jobs.revenue", FieldType::Double, FieldRole::Currency),
            ("jobs.units", FieldType::Double, FieldRole::Demand),
            ("jobs.cost", FieldType::Double, FieldRole::Cost),
            (
                "jobs.route_efficiency",
                FieldType::Double,
                FieldRole::RouteEfficiency,
            ),
        ]
        .into_iter()
        .map(|(name, field_type, role)| {
            (
                name.to_owned(),
                FieldDef::new(name.rsplit('.').next().unwrap(), field_type).with_role(role),
            )
        })
        .collect()
    }

    fn base_rows() -> RowSet {
        let mut wilanow = Row::new();
        wilanow.set("jobs.district", "Wilanów");
        wilanow.set("jobs.revenue", 1000.0);
        wilanow.set("jobs.units", 10.0);
        wilanow.set("jobs.cost", 400.0);
        wilanow.set("jobs.route_efficiency", 0.8);
        let mut praga = Row::new();
        praga.set("jobs.district", "Praga-Północ");
        praga.set("jobs.revenue", 1000.0);
        praga.set("jobs.units", 10.0);
        praga.set("jobs.cost", 400.0);
        RowSet::from_rows(vec![wilanow, praga])
    }

    fn settings(affluence: bool, seasonal: bool, route: bool) -> DomainWeightingSettings {
        DomainWeightingSettings {
            district_filter: None,
            affluence_weighting: affluence,
            seasonal_adjustment: seasonal,
            route_efficiency_weighting: route,
        }
    }

    fn get(rows: &RowSet, index: usize, column: &str) -> f64 {
        rows.rows()[index].get(column).unwrap().as_f64().unwrap()
    }

    #[test]
    fn affluence_scales_currency_by_district() {
        let (out, metrics) = apply(
            &base_rows(),
            &settings(true, false, false),
            &WeightingConfig::default(),
            &roles(),
            Some("jobs.district"),
            4,
        );
        assert_eq!(get(&out, 0, "jobs.revenue"), 1000.0); // Wilanów factor 1.0
        assert_eq!(get(&out, 1, "jobs.revenue"), 350.0); // Praga-Północ 0.35
        // non-currency columns untouched
        assert_eq!(get(&out, 0, "jobs.units"), 10.0);
        assert!(metrics.affluence_applied);
        assert_eq!(metrics.districts_weighted, 2);
    }

    #[test]
    fn unknown_district_gets_the_default_factor() {
        let mut rows = base_rows();
        rows.rows_mut()[0].set("jobs.district", "Radom");
        let (out, _) = apply(
            &rows,
            &settings(true, false, false),
            &WeightingConfig::default(),
            &roles(),
            Some("jobs.district"),
            4,
        );
        assert_eq!(get(&out, 0, "jobs.revenue"), 500.0);
    }

    #[test]
    fn district_filter_restricts_the_pass() {
        let (out, metrics) = apply(
            &base_rows(),
            &DomainWeightingSettings {
                district_filter: Some("Wilanów".into()),
                ..settings(true, false, false)
            },
            &WeightingConfig::default(),
            &roles(),
            Some("jobs.district"),
            4,
        );
        assert_eq!(get(&out, 0, "jobs.revenue"), 1000.0);
        // filtered-out row passes through unweighted
        assert_eq!(get(&out, 1, "jobs.revenue"), 1000.0);
        assert_eq!(metrics.districts_weighted, 1);
    }

    #[test]
    fn seasonal_scales_demand_by_month() {
        let config = WeightingConfig::default();
        let (january, metrics) = apply(
            &base_rows(),
            &settings(false, true, false),
            &config,
            &roles(),
            Some("jobs.district"),
            1,
        );
        assert_eq!(get(&january, 0, "jobs.units"), 10.0 * config.seasonal_factor(1));
        assert_eq!(metrics.seasonal_factor, Some(config.seasonal_factor(1)));

        let (april, _) = apply(
            &base_rows(),
            &settings(false, true, false),
            &config,
            &roles(),
            Some("jobs.district"),
            4,
        );
        assert_eq!(get(&april, 0, "jobs.units"), 10.0);
    }

    #[test]
    fn route_discount_needs_route_data() {
        let (out, metrics) = apply(
            &base_rows(),
            &settings(false, false, true),
            &WeightingConfig::default(),
            &roles(),
            Some("jobs.district"),
            4,
        );
        // cost - cost * 0.15 * 0.8
        assert_eq!(get(&out, 0, "jobs.cost"), 400.0 - 400.0 * 0.15 * 0.8);
        // no efficiency column on the second row: untouched
        assert_eq!(get(&out, 1, "jobs.cost"), 400.0);
        assert!((metrics.route_discount_total - 48.0).abs() < 1e-9);
    }

    #[test]
    fn combined_equals_sequential_in_fixed_order() {
        let config = WeightingConfig::default();
        let roles = roles();
        let month = 1;

        let (combined, _) = apply(
            &base_rows(),
            &settings(true, true, true),
            &config,
            &roles,
            Some("jobs.district"),
            month,
        );

        let (step1, _) = apply(
            &base_rows(),
            &settings(true, false, false),
            &config,
            &roles,
            Some("jobs.district"),
            month,
        );
        let (step2, _) = apply(
            &step1,
            &settings(false, true, false),
            &config,
            &roles,
            Some("jobs.district"),
            month,
        );
        let (sequential, _) = apply(
            &step2,
            &settings(false, false, true),
            &config,
            &roles,
            Some("jobs.district"),
            month,
        );
        assert_eq!(combined, sequential);
    }

    #[test]
    fn affluence_scales_cost_before_the_discount_is_measured() {
        let config = WeightingConfig::default();
        let roles = roles();
        let mut rows = base_rows();
        rows.rows_mut()[0].set("jobs.district", "Mokotów"); // factor 0.9

        // fixed order: affluence scales cost to 360, then the discount
        // comes off the scaled amount
        let (out, metrics) = apply(
            &rows,
            &settings(true, false, true),
            &config,
            &roles,
            Some("jobs.district"),
            4,
        );
        assert_eq!(get(&out, 0, "jobs.cost"), 360.0 - 360.0 * 0.15 * 0.8);
        assert!((metrics.route_discount_total - 360.0 * 0.15 * 0.8).abs() < 1e-9);

        // reversed by hand the discount is measured off the raw cost; the
        // reported total differs, which is why the order is fixed
        let (_, reversed) = apply(
            &rows,
            &settings(false, false, true),
            &config,
            &roles,
            Some("jobs.district"),
            4,
        );
        assert!((reversed.route_discount_total - 400.0 * 0.15 * 0.8).abs() < 1e-9);
        assert_ne!(metrics.route_discount_total, reversed.route_discount_total);
    }

    #[test]
    fn input_rows_are_never_mutated() {
        let rows = base_rows();
        let before = rows.clone();
        let _ = apply(
            &rows,
            &settings(true, true, true),
            &WeightingConfig::default(),
            &roles(),
            Some("jobs.district"),
            1,
        );
        assert_eq!(rows, before);
    }
}
