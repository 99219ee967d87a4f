// 🔁 Transform - the caller-facing entry points
//
// scale_by_magnitude:         magnitudes are multiplicative targets on the baseline
// reduce_demand_by_magnitude: magnitudes are fractional reductions (m → 1 - m)
//
// Both build a MagnitudeSpec, resolve it into a DescriptorMap, and hand the
// plan to the RampApplier. Each call is independent; only the taxonomy is shared.

use crate::applier::{ApplyOptions, RampApplier, TableFields};
use crate::builder::DescriptorBuilder;
use crate::error::{Result, TransformError};
use crate::filter::CategoryFilter;
use crate::magnitude::{Bounds, DescriptorMap, MagnitudeKind, MagnitudeSpec, MagnitudeValue};
use crate::ramp::RampVector;
use crate::table::Table;
use crate::taxonomy::TaxonomyIndex;
use crate::time_periods::{BaselinePeriod, TimePeriods};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    Scale,
    ReduceDemand,
}

impl TransformMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMode::Scale => "scale",
            TransformMode::ReduceDemand => "reduce_demand",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scale" => Some(TransformMode::Scale),
            "reduce" | "reduce_demand" => Some(TransformMode::ReduceDemand),
            _ => None,
        }
    }
}

/// Everything one call needs besides the table and the magnitudes
#[derive(Debug, Clone, Default)]
pub struct TransformRequest {
    /// Caller category allow-list; `None` = every declared category
    pub categories: Option<BTreeSet<String>>,

    /// Rows for other regions pass through unchanged
    pub regions: Option<BTreeSet<String>>,

    /// Tag appended to every output row
    pub strategy_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub table: Table,
    pub descriptors: DescriptorMap,
}

/// Shared, read-only inputs of the engine
pub struct TransformContext {
    taxonomy: Arc<dyn TaxonomyIndex>,
    variables: BTreeSet<String>,
    periods: TimePeriods,
    applier: RampApplier,
}

impl TransformContext {
    pub fn new(
        taxonomy: Arc<dyn TaxonomyIndex>,
        variables: BTreeSet<String>,
        baseline: &dyn BaselinePeriod,
    ) -> Self {
        TransformContext {
            taxonomy,
            variables,
            periods: TimePeriods::new(baseline.baseline_period()),
            applier: RampApplier::default(),
        }
    }

    /// Builder: table field names
    pub fn with_fields(mut self, fields: TableFields) -> Self {
        self.applier = RampApplier::new(fields);
        self
    }

    pub fn taxonomy(&self) -> &dyn TaxonomyIndex {
        self.taxonomy.as_ref()
    }

    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    pub fn periods(&self) -> &TimePeriods {
        &self.periods
    }

    /// Number of periods at or after the baseline in `table`
    pub fn active_period_count(&self, table: &Table) -> Result<usize> {
        let time = table.integer_column(&self.applier.fields().time_period)?;
        Ok(self.periods.periods_from_baseline(time).len())
    }

    // ========================================================================
    // PLANNING
    // ========================================================================

    /// Resolve a scaling specification without touching any table
    pub fn plan_scale(
        &self,
        spec: &MagnitudeSpec,
        categories: Option<&BTreeSet<String>>,
    ) -> Result<DescriptorMap> {
        DescriptorBuilder::new(self.taxonomy.as_ref(), &self.variables, &self.periods)
            .with_filter(CategoryFilter::from_option(categories.cloned()))
            .with_kind(MagnitudeKind::ScalarOfBaseline)
            .with_bounds(Bounds::non_negative())
            .build(spec)
    }

    /// Resolve a demand-reduction specification; each reduction `m` in [0, 1]
    /// becomes the scalar `1 - m`
    pub fn plan_reduce_demand(
        &self,
        spec: &MagnitudeSpec,
        categories: Option<&BTreeSet<String>>,
    ) -> Result<DescriptorMap> {
        spec.validate()?;
        for (key, value) in spec.iter() {
            let out_of_range = match value {
                MagnitudeValue::Scalar(m) => vec![*m],
                MagnitudeValue::PerCategory(values) => values.values().copied().collect(),
            }
            .into_iter()
            .find(|m| !(0.0..=1.0).contains(m));

            if let Some(value) = out_of_range {
                return Err(TransformError::InvalidMagnitude {
                    key: key.to_string(),
                    value,
                });
            }
        }

        self.plan_scale(&spec.map_values(|m| 1.0 - m), categories)
    }

    pub fn plan(
        &self,
        mode: TransformMode,
        spec: &MagnitudeSpec,
        categories: Option<&BTreeSet<String>>,
    ) -> Result<DescriptorMap> {
        match mode {
            TransformMode::Scale => self.plan_scale(spec, categories),
            TransformMode::ReduceDemand => self.plan_reduce_demand(spec, categories),
        }
    }

    // ========================================================================
    // ENTRY POINTS
    // ========================================================================

    pub fn scale_by_magnitude(
        &self,
        table: &Table,
        spec: &MagnitudeSpec,
        ramp: &RampVector,
        request: &TransformRequest,
    ) -> Result<TransformOutcome> {
        self.run(TransformMode::Scale, table, spec, ramp, request)
    }

    pub fn reduce_demand_by_magnitude(
        &self,
        table: &Table,
        spec: &MagnitudeSpec,
        ramp: &RampVector,
        request: &TransformRequest,
    ) -> Result<TransformOutcome> {
        self.run(TransformMode::ReduceDemand, table, spec, ramp, request)
    }

    pub fn run(
        &self,
        mode: TransformMode,
        table: &Table,
        spec: &MagnitudeSpec,
        ramp: &RampVector,
        request: &TransformRequest,
    ) -> Result<TransformOutcome> {
        let descriptors = self.plan(mode, spec, request.categories.as_ref())?;

        let options = ApplyOptions {
            regions: request.regions.clone(),
            strategy_id: request.strategy_id,
        };
        let table = self.applier.apply(
            table,
            &descriptors,
            self.taxonomy.as_ref(),
            ramp,
            &self.periods,
            &options,
        )?;

        info!(
            mode = mode.as_str(),
            keys = spec.len(),
            variables = descriptors.len(),
            cells = descriptors.cell_count(),
            "transformation applied"
        );

        Ok(TransformOutcome { table, descriptors })
    }
}

// ============================================================================
// TESTS
// ============================================================================
