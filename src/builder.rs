// 🏗️ Magnitude Descriptor Builder - magnitude spec → flat descriptor mapping
//
// For every key: resolve (leaf | group | variable), filter each target
// variable's categories, then emit one entry per (variable, category subset)
// and merge it into the plan in key order.

use crate::error::{Result, TransformError};
use crate::filter::CategoryFilter;
use crate::magnitude::{
    Bounds, DescriptorMap, MagnitudeKind, MagnitudeSpec, MagnitudeValue, TransformationEntry,
};
use crate::resolver::{KeyResolver, ResolvedKey};
use crate::taxonomy::TaxonomyIndex;
use crate::time_periods::BaselinePeriod;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub struct DescriptorBuilder<'a> {
    taxonomy: &'a dyn TaxonomyIndex,
    resolver: KeyResolver<'a>,
    filter: CategoryFilter,
    kind: MagnitudeKind,
    bounds: Bounds,
    baseline_period: i64,
}

impl<'a> DescriptorBuilder<'a> {
    /// Scalar-of-baseline magnitudes bounded to [0, +∞), no category restriction
    pub fn new(
        taxonomy: &'a dyn TaxonomyIndex,
        variables: &'a BTreeSet<String>,
        baseline: &dyn BaselinePeriod,
    ) -> Self {
        DescriptorBuilder {
            taxonomy,
            resolver: KeyResolver::new(taxonomy, variables),
            filter: CategoryFilter::all(),
            kind: MagnitudeKind::ScalarOfBaseline,
            bounds: Bounds::non_negative(),
            baseline_period: baseline.baseline_period(),
        }
    }

    /// Builder: caller category allow-list
    pub fn with_filter(mut self, filter: CategoryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Builder: magnitude kind
    pub fn with_kind(mut self, kind: MagnitudeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder: value bounds
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Resolve every key of `spec` and merge the results into one plan
    pub fn build(&self, spec: &MagnitudeSpec) -> Result<DescriptorMap> {
        spec.validate()?;

        let mut plan = DescriptorMap::new();
        for (key, value) in spec.iter() {
            for entry in self.entries_for_key(key, value)? {
                plan.merge_entry(entry);
            }
        }

        debug!(
            keys = spec.len(),
            variables = plan.len(),
            cells = plan.cell_count(),
            "descriptor mapping built"
        );

        Ok(plan)
    }

    /// Entries produced by a single key, before merging
    pub fn entries_for_key(
        &self,
        key: &str,
        value: &MagnitudeValue,
    ) -> Result<Vec<TransformationEntry>> {
        let resolved = self.resolver.resolve(key);

        if !resolved.is_match() {
            debug!(key, "magnitude key matches no leaf, group or variable; skipped");
            return Ok(Vec::new());
        }

        let targets = resolved.variables();
        if targets.is_empty() {
            debug!(key, namespace = resolved.namespace(), "key resolves to no variable in scope");
            return Ok(Vec::new());
        }

        if value.is_per_category() {
            check_per_category(key, &resolved, targets.len())?;
        }

        let implied = resolved.implied_restriction();
        let mut entries = Vec::new();

        for variable in targets {
            let declared = match self.taxonomy.categories_of(variable) {
                Some(declared) => declared,
                None => continue,
            };

            let subset = self.filter.apply(declared, implied.as_ref());
            if subset.is_empty() {
                debug!(key, variable, "empty category intersection; variable skipped");
                continue;
            }

            let magnitudes = match value {
                MagnitudeValue::Scalar(m) => subset.into_iter().map(|c| (c, *m)).collect(),
                MagnitudeValue::PerCategory(values) => {
                    per_category_magnitudes(key, variable, declared, &subset, values)?
                }
            };

            if magnitudes.is_empty() {
                debug!(key, variable, "per-category magnitudes cover no selected category");
                continue;
            }

            entries.push(TransformationEntry {
                variable: variable.to_string(),
                magnitudes,
                kind: self.kind,
                bounds: self.bounds,
                baseline_period: self.baseline_period,
            });
        }

        Ok(entries)
    }
}

/// Per-category values are only meaningful under a single leaf that lands on
/// exactly one variable
fn check_per_category(key: &str, resolved: &ResolvedKey, n_targets: usize) -> Result<()> {
    let reason = match resolved {
        ResolvedKey::Leaf { .. } if n_targets == 1 => return Ok(()),
        ResolvedKey::Leaf { .. } => format!("leaf resolves to {} variables", n_targets),
        ResolvedKey::Group { group, .. } => format!("key names group '{}'", group),
        ResolvedKey::Variable { variable } => format!("key names variable '{}'", variable),
        ResolvedKey::Unmatched => return Ok(()),
    };

    Err(TransformError::PerCategoryMagnitude {
        key: key.to_string(),
        reason,
    })
}

fn per_category_magnitudes(
    key: &str,
    variable: &str,
    declared: &BTreeSet<String>,
    subset: &BTreeSet<String>,
    values: &BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>> {
    if let Some(unknown) = values.keys().find(|c| !declared.contains(*c)) {
        return Err(TransformError::UnknownCategoryInMagnitude {
            key: key.to_string(),
            variable: variable.to_string(),
            category: unknown.clone(),
        });
    }

    Ok(values
        .iter()
        .filter(|(c, _)| subset.contains(*c))
        .map(|(c, m)| (c.clone(), *m))
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{Taxonomy, TaxonomyBuilder, VariableDefinition};
    use crate::time_periods::TimePeriods;

    fn taxonomy() -> Taxonomy {
        TaxonomyBuilder::new()
            .leaf("cf4", Some("c3"))
            .leaf("c2f6", None)
            .leaf("sf6", None)
            .leaf("nf3", None)
            .group("pfc", ["cf4", "c2f6"])
            .group("other_fc", ["sf6", "nf3"])
            .variable(VariableDefinition::new("ef_cf4", ["c1", "c2", "c3"]).with_leaf("cf4"))
            .variable(VariableDefinition::new("ef_c2f6", ["c1", "c2"]).with_leaf("c2f6"))
            .variable(VariableDefinition::new("ef_sf6", ["c2", "c4"]).with_leaf("sf6"))
            .variable(VariableDefinition::new("ef_nf3", ["c4"]).with_leaf("nf3"))
            .variable(VariableDefinition::new("ef_nf3_alt", ["c5"]).with_leaf("nf3"))
            .build()
            .unwrap()
    }

    fn build(spec: &MagnitudeSpec, filter: CategoryFilter) -> Result<DescriptorMap> {
        let tax = taxonomy();
        let vars = tax.all_variables(None);
        DescriptorBuilder::new(&tax, &vars, &TimePeriods::new(5))
            .with_filter(filter)
            .build(spec)
    }

    fn cats(map: &DescriptorMap, variable: &str) -> Vec<String> {
        map.get(variable)
            .map(|e| e.magnitudes.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_variable_key_scalar() {
        let plan = build(&MagnitudeSpec::new().scalar("ef_c2f6", 0.5), CategoryFilter::all()).unwrap();

        let entry = plan.get("ef_c2f6").unwrap();
        assert_eq!(entry.magnitude("c1"), Some(0.5));
        assert_eq!(entry.magnitude("c2"), Some(0.5));
        assert_eq!(entry.kind, MagnitudeKind::ScalarOfBaseline);
        assert_eq!(entry.bounds, Bounds::non_negative());
        assert_eq!(entry.baseline_period, 5);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_group_key_expands_to_members() {
        let plan = build(&MagnitudeSpec::new().scalar("pfc", 0.8), CategoryFilter::all()).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(cats(&plan, "ef_cf4"), vec!["c1", "c2", "c3"]);
        assert_eq!(cats(&plan, "ef_c2f6"), vec!["c1", "c2"]);
    }

    #[test]
    fn test_category_intersection() {
        // declared {c1, c2, c3} ∩ allow {c2, c3} ∩ implied by leaf {c3}
        let plan = build(
            &MagnitudeSpec::new().scalar("cf4", 0.5),
            CategoryFilter::allow(["c2", "c3"]),
        )
        .unwrap();

        assert_eq!(cats(&plan, "ef_cf4"), vec!["c3"]);
    }

    #[test]
    fn test_empty_intersection_drops_variable() {
        let plan = build(
            &MagnitudeSpec::new().scalar("ef_cf4", 0.5),
            CategoryFilter::allow(["c4"]),
        )
        .unwrap();

        assert!(plan.is_empty());
    }

    #[test]
    fn test_unknown_key_is_silent() {
        let base = MagnitudeSpec::new().scalar("pfc", 0.5);
        let with_unknown = MagnitudeSpec::new()
            .scalar("pfc", 0.5)
            .scalar("not_a_thing", 0.1);

        assert_eq!(
            build(&base, CategoryFilter::all()).unwrap(),
            build(&with_unknown, CategoryFilter::all()).unwrap()
        );
    }

    #[test]
    fn test_later_key_overwrites_shared_categories() {
        // group first, then the variable alone with a different magnitude
        let spec = MagnitudeSpec::new()
            .scalar("other_fc", 0.5)
            .scalar("ef_sf6", 0.9);
        let plan = build(&spec, CategoryFilter::all()).unwrap();

        let sf6 = plan.get("ef_sf6").unwrap();
        assert_eq!(sf6.magnitude("c2"), Some(0.9));
        assert_eq!(sf6.magnitude("c4"), Some(0.9));
        assert_eq!(plan.get("ef_nf3").unwrap().magnitude("c4"), Some(0.5));
    }

    #[test]
    fn test_first_writer_kept_outside_overlap() {
        let spec = MagnitudeSpec::new()
            .scalar("ef_cf4", 0.5)
            .scalar("cf4", 0.2);
        let plan = build(&spec, CategoryFilter::all()).unwrap();

        let cf4 = plan.get("ef_cf4").unwrap();
        assert_eq!(cf4.magnitude("c1"), Some(0.5));
        assert_eq!(cf4.magnitude("c2"), Some(0.5));
        assert_eq!(cf4.magnitude("c3"), Some(0.2));
    }

    #[test]
    fn test_per_category_under_single_leaf() {
        let spec = MagnitudeSpec::new().per_category("sf6", [("c2", 0.3), ("c4", 0.6)]);
        let plan = build(&spec, CategoryFilter::allow(["c4"])).unwrap();

        let sf6 = plan.get("ef_sf6").unwrap();
        assert_eq!(sf6.magnitude("c4"), Some(0.6));
        assert_eq!(sf6.magnitude("c2"), None);
    }

    #[test]
    fn test_per_category_under_group_fails() {
        let spec = MagnitudeSpec::new().per_category("pfc", [("c1", 0.3)]);
        let err = build(&spec, CategoryFilter::all()).unwrap_err();

        match err {
            TransformError::PerCategoryMagnitude { key, reason } => {
                assert_eq!(key, "pfc");
                assert!(reason.contains("group"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_per_category_under_variable_fails() {
        let spec = MagnitudeSpec::new().per_category("ef_cf4", [("c1", 0.3)]);
        assert!(matches!(
            build(&spec, CategoryFilter::all()),
            Err(TransformError::PerCategoryMagnitude { .. })
        ));
    }

    #[test]
    fn test_per_category_under_multi_variable_leaf_fails() {
        let spec = MagnitudeSpec::new().per_category("nf3", [("c4", 0.3)]);
        let err = build(&spec, CategoryFilter::all()).unwrap_err();

        assert!(err.to_string().contains("'nf3'"));
        assert!(err.to_string().contains("2 variables"));
    }

    #[test]
    fn test_per_category_unknown_category_fails() {
        let spec = MagnitudeSpec::new().per_category("sf6", [("c9", 0.3)]);
        assert!(matches!(
            build(&spec, CategoryFilter::all()),
            Err(TransformError::UnknownCategoryInMagnitude { ref category, .. }) if category == "c9"
        ));
    }

    #[test]
    fn test_idempotent_rebuild_and_merge() {
        let spec = MagnitudeSpec::new().scalar("pfc", 0.5);
        let once = build(&spec, CategoryFilter::all()).unwrap();

        let mut merged = build(&spec, CategoryFilter::all()).unwrap();
        merged.merge(build(&spec, CategoryFilter::all()).unwrap());

        assert_eq!(once, merged);
    }

    #[test]
    fn test_non_finite_magnitude_fails_fast() {
        let spec = MagnitudeSpec::new().scalar("pfc", f64::INFINITY);
        assert!(matches!(
            build(&spec, CategoryFilter::all()),
            Err(TransformError::InvalidMagnitude { .. })
        ));
    }

    #[test]
    fn test_custom_kind_and_bounds() {
        let tax = taxonomy();
        let vars = tax.all_variables(None);
        let bounds = Bounds::new(0.0, Some(1.0)).unwrap();

        let plan = DescriptorBuilder::new(&tax, &vars, &0i64)
            .with_kind(MagnitudeKind::AbsoluteBounded)
            .with_bounds(bounds)
            .build(&MagnitudeSpec::new().scalar("ef_nf3", 0.25))
            .unwrap();

        let entry = plan.get("ef_nf3").unwrap();
        assert_eq!(entry.kind, MagnitudeKind::AbsoluteBounded);
        assert_eq!(entry.bounds, bounds);
        assert_eq!(entry.baseline_period, 0);
    }
}
