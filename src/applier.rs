// 🎚️ Ramp Applier - interpolate targeted columns from baseline to target
//
// For every row with period t >= baseline (and region in the optional filter):
//   scalar_of_baseline:  out = x * (1 - r) + x * m * r
//   absolute_bounded:    out = x * (1 - r) + m * r
// where r = ramp[offset of t], then clamp to the entry's bounds.
// Every other cell is copied untouched.

use crate::error::{Result, TransformError};
use crate::magnitude::{Bounds, DescriptorMap, MagnitudeKind};
use crate::ramp::RampVector;
use crate::table::{Column, Table};
use crate::taxonomy::TaxonomyIndex;
use crate::time_periods::TimePeriods;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Column names the applier needs to find its way around a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFields {
    pub time_period: String,
    pub region: String,
    pub strategy_id: String,
}

impl Default for TableFields {
    fn default() -> Self {
        TableFields {
            time_period: "time_period".to_string(),
            region: "region".to_string(),
            strategy_id: "strategy_id".to_string(),
        }
    }
}

/// Per-call options that do not change the plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOptions {
    /// Only rows for these regions are transformed; others pass through
    pub regions: Option<BTreeSet<String>>,

    /// Appended as an integer column with the same value on every row
    pub strategy_id: Option<i64>,
}

/// One interpolated value, before clamping
pub fn interpolate(kind: MagnitudeKind, baseline_value: f64, magnitude: f64, ramp: f64) -> f64 {
    match kind {
        MagnitudeKind::ScalarOfBaseline => {
            baseline_value * (1.0 - ramp) + baseline_value * magnitude * ramp
        }
        MagnitudeKind::AbsoluteBounded => baseline_value * (1.0 - ramp) + magnitude * ramp,
    }
}

pub struct RampApplier {
    fields: TableFields,
}

impl RampApplier {
    pub fn new(fields: TableFields) -> Self {
        RampApplier { fields }
    }

    pub fn fields(&self) -> &TableFields {
        &self.fields
    }

    /// Apply a descriptor mapping to `table`, returning a new table with the
    /// same schema (plus the strategy column when requested)
    pub fn apply(
        &self,
        table: &Table,
        descriptors: &DescriptorMap,
        taxonomy: &dyn TaxonomyIndex,
        ramp: &RampVector,
        periods: &TimePeriods,
        options: &ApplyOptions,
    ) -> Result<Table> {
        if let Some(entry) = descriptors
            .iter()
            .find(|e| e.baseline_period != periods.baseline)
        {
            return Err(TransformError::BaselineMismatch {
                variable: entry.variable.clone(),
                expected: periods.baseline,
                found: entry.baseline_period,
            });
        }

        let time = table.integer_column(&self.fields.time_period)?;

        let active_periods = periods.periods_from_baseline(time);
        if active_periods.len() != ramp.len() {
            return Err(TransformError::ramp(format!(
                "ramp has {} values but the table has {} periods from baseline {}",
                ramp.len(),
                active_periods.len(),
                periods.baseline
            )));
        }

        let offsets: HashMap<i64, usize> = active_periods
            .iter()
            .enumerate()
            .map(|(i, t)| (*t, i))
            .collect();

        // ramp value per row; None = row left untouched
        let region_mask = self.region_mask(table, options.regions.as_ref())?;
        let row_ramp: Vec<Option<f64>> = time
            .iter()
            .enumerate()
            .map(|(row, t)| {
                if !region_mask[row] {
                    return None;
                }
                offsets.get(t).and_then(|offset| ramp.at(*offset))
            })
            .collect();

        let mut out = table.clone();

        for entry in descriptors.iter() {
            for (category, magnitude) in &entry.magnitudes {
                let field = taxonomy
                    .field_name(&entry.variable, category)
                    .ok_or_else(|| TransformError::MissingColumn {
                        column: format!("{} ({})", entry.variable, category),
                    })?;

                let values = table.float_column(&field)?;
                let transformed =
                    transform_values(values, &row_ramp, entry.kind, *magnitude, &entry.bounds);

                out.set_column(field, Column::Float(transformed))?;
            }
        }

        if let Some(strategy_id) = options.strategy_id {
            out.set_column(
                self.fields.strategy_id.clone(),
                Column::Integer(vec![strategy_id; table.n_rows()]),
            )?;
        }

        debug!(
            rows = table.n_rows(),
            cells = descriptors.cell_count(),
            periods = active_periods.len(),
            "ramp applied"
        );

        Ok(out)
    }

    fn region_mask(&self, table: &Table, regions: Option<&BTreeSet<String>>) -> Result<Vec<bool>> {
        match regions {
            None => Ok(vec![true; table.n_rows()]),
            Some(regions) => Ok(table
                .text_column(&self.fields.region)?
                .iter()
                .map(|r| regions.contains(r))
                .collect()),
        }
    }
}

impl Default for RampApplier {
    fn default() -> Self {
        Self::new(TableFields::default())
    }
}

fn transform_values(
    values: &[f64],
    row_ramp: &[Option<f64>],
    kind: MagnitudeKind,
    magnitude: f64,
    bounds: &Bounds,
) -> Vec<f64> {
    values
        .iter()
        .zip(row_ramp)
        .map(|(x, r)| match r {
            Some(r) => bounds.clamp(interpolate(kind, *x, magnitude, *r)),
            None => *x,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::magnitude::TransformationEntry;
    use crate::taxonomy::{Taxonomy, TaxonomyBuilder, VariableDefinition};

    fn taxonomy() -> Taxonomy {
        TaxonomyBuilder::new()
            .variable(VariableDefinition::new("ef", ["c1", "c2"]))
            .build()
            .unwrap()
    }

    /// Two regions × periods 0..=3
    fn table() -> Table {
        let regions = ["a", "a", "a", "a", "b", "b", "b", "b"];
        Table::new()
            .with_column("region", Column::Text(regions.iter().map(|r| r.to_string()).collect()))
            .unwrap()
            .with_column("time_period", Column::Integer(vec![0, 1, 2, 3, 0, 1, 2, 3]))
            .unwrap()
            .with_column("ef_c1", Column::Float(vec![10.0; 8]))
            .unwrap()
            .with_column("ef_c2", Column::Float(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]))
            .unwrap()
    }

    fn plan(magnitude: f64, kind: MagnitudeKind, bounds: Bounds) -> DescriptorMap {
        let mut map = DescriptorMap::new();
        map.merge_entry(TransformationEntry {
            variable: "ef".to_string(),
            magnitudes: [("c1".to_string(), magnitude)].into_iter().collect(),
            kind,
            bounds,
            baseline_period: 1,
        });
        map
    }

    #[test]
    fn test_interpolation_endpoints() {
        let kind = MagnitudeKind::ScalarOfBaseline;
        let bounds = Bounds::non_negative();

        assert_eq!(bounds.clamp(interpolate(kind, 10.0, 0.1, 1.0)), 1.0);
        assert_eq!(bounds.clamp(interpolate(kind, 10.0, 0.1, 0.0)), 10.0);
        assert_eq!(interpolate(MagnitudeKind::AbsoluteBounded, 10.0, 4.0, 0.5), 7.0);
    }

    #[test]
    fn test_apply_scalar_of_baseline() {
        let tax = taxonomy();
        let ramp = RampVector::new(vec![0.0, 0.5, 1.0]).unwrap();
        let out = RampApplier::default()
            .apply(
                &table(),
                &plan(0.1, MagnitudeKind::ScalarOfBaseline, Bounds::non_negative()),
                &tax,
                &ramp,
                &TimePeriods::new(1),
                &ApplyOptions::default(),
            )
            .unwrap();

        // period 0 is before the baseline
        let c1 = out.float_column("ef_c1").unwrap();
        assert_eq!(&c1[0..4], &[10.0, 10.0, 5.5, 1.0]);
        assert_eq!(&c1[4..8], &[10.0, 10.0, 5.5, 1.0]);
    }

    #[test]
    fn test_untouched_columns_are_identical() {
        let tax = taxonomy();
        let input = table();
        let ramp = RampVector::new(vec![0.0, 0.5, 1.0]).unwrap();
        let out = RampApplier::default()
            .apply(
                &input,
                &plan(3.0, MagnitudeKind::ScalarOfBaseline, Bounds::non_negative()),
                &tax,
                &ramp,
                &TimePeriods::new(1),
                &ApplyOptions::default(),
            )
            .unwrap();

        for name in ["region", "time_period", "ef_c2"] {
            assert_eq!(input.column(name), out.column(name), "column {} changed", name);
        }
        let before: Vec<u64> = input.float_column("ef_c2").unwrap().iter().map(|v| v.to_bits()).collect();
        let after: Vec<u64> = out.float_column("ef_c2").unwrap().iter().map(|v| v.to_bits()).collect();
        assert_eq!(before, after);
        assert_eq!(input.field_names(), out.field_names());
    }

    #[test]
    fn test_bounds_clamp_every_period() {
        let tax = taxonomy();
        let ramp = RampVector::new(vec![0.0, 0.5, 1.0]).unwrap();
        let bounds = Bounds::new(0.0, Some(12.0)).unwrap();
        let out = RampApplier::default()
            .apply(
                &table(),
                &plan(2.0, MagnitudeKind::ScalarOfBaseline, bounds),
                &tax,
                &ramp,
                &TimePeriods::new(1),
                &ApplyOptions::default(),
            )
            .unwrap();

        assert_eq!(&out.float_column("ef_c1").unwrap()[0..4], &[10.0, 10.0, 12.0, 12.0]);
    }

    #[test]
    fn test_region_filter_and_strategy_column() {
        let tax = taxonomy();
        let ramp = RampVector::new(vec![0.0, 0.5, 1.0]).unwrap();
        let options = ApplyOptions {
            regions: Some(BTreeSet::from(["b".to_string()])),
            strategy_id: Some(1005),
        };
        let out = RampApplier::default()
            .apply(
                &table(),
                &plan(0.1, MagnitudeKind::ScalarOfBaseline, Bounds::non_negative()),
                &tax,
                &ramp,
                &TimePeriods::new(1),
                &options,
            )
            .unwrap();

        let c1 = out.float_column("ef_c1").unwrap();
        assert_eq!(&c1[0..4], &[10.0; 4]);
        assert_eq!(&c1[4..8], &[10.0, 10.0, 5.5, 1.0]);
        assert_eq!(out.integer_column("strategy_id").unwrap(), &[1005; 8]);
        assert_eq!(out.n_columns(), 5);
    }

    #[test]
    fn test_ramp_length_must_match_periods() {
        let tax = taxonomy();
        let ramp = RampVector::new(vec![0.0, 1.0]).unwrap();
        let err = RampApplier::default()
            .apply(
                &table(),
                &plan(0.1, MagnitudeKind::ScalarOfBaseline, Bounds::non_negative()),
                &tax,
                &ramp,
                &TimePeriods::new(1),
                &ApplyOptions::default(),
            )
            .unwrap_err();

        assert!(matches!(err, TransformError::InvalidRamp { .. }));
    }

    #[test]
    fn test_entries_must_share_the_applied_baseline() {
        let tax = taxonomy();
        let mut map = DescriptorMap::new();
        map.merge_entry(TransformationEntry {
            variable: "ef".to_string(),
            magnitudes: [("c1".to_string(), 0.1)].into_iter().collect(),
            kind: MagnitudeKind::ScalarOfBaseline,
            bounds: Bounds::non_negative(),
            baseline_period: 5,
        });

        let ramp = RampVector::new(vec![0.0, 0.5, 1.0]).unwrap();
        let err = RampApplier::default()
            .apply(&table(), &map, &tax, &ramp, &TimePeriods::new(1), &ApplyOptions::default())
            .unwrap_err();

        assert_eq!(
            err,
            TransformError::BaselineMismatch {
                variable: "ef".to_string(),
                expected: 1,
                found: 5,
            }
        );
    }

    #[test]
    fn test_missing_cells_stay_missing() {
        let tax = taxonomy();
        let mut input = table();
        input
            .set_column(
                "ef_c1",
                Column::Float(vec![10.0, 10.0, f64::NAN, 10.0, 10.0, 10.0, 10.0, 10.0]),
            )
            .unwrap();

        let ramp = RampVector::new(vec![0.0, 0.5, 1.0]).unwrap();
        let out = RampApplier::default()
            .apply(
                &input,
                &plan(0.5, MagnitudeKind::ScalarOfBaseline, Bounds::non_negative()),
                &tax,
                &ramp,
                &TimePeriods::new(1),
                &ApplyOptions::default(),
            )
            .unwrap();

        let c1 = out.float_column("ef_c1").unwrap();
        assert!(c1[2].is_nan());
        assert_eq!(c1[3], 5.0);
        assert_eq!(&c1[4..8], &[10.0, 10.0, 7.5, 5.0]);
    }

    #[test]
    fn test_missing_target_column() {
        let tax = TaxonomyBuilder::new()
            .variable(VariableDefinition::new("ef", ["c1", "c9"]))
            .build()
            .unwrap();
        let mut map = plan(0.5, MagnitudeKind::ScalarOfBaseline, Bounds::non_negative());
        map.merge_entry(TransformationEntry {
            variable: "ef".to_string(),
            magnitudes: [("c9".to_string(), 0.5)].into_iter().collect(),
            kind: MagnitudeKind::ScalarOfBaseline,
            bounds: Bounds::non_negative(),
            baseline_period: 1,
        });

        let ramp = RampVector::new(vec![0.0, 0.5, 1.0]).unwrap();
        let err = RampApplier::default()
            .apply(&table(), &map, &tax, &ramp, &TimePeriods::new(1), &ApplyOptions::default())
            .unwrap_err();

        assert_eq!(
            err,
            TransformError::MissingColumn {
                column: "ef_c9".to_string()
            }
        );
    }
}
