// 🔎 Key Resolver - decide which namespace a magnitude key belongs to
//
// Lookups are tried in a fixed order and the first hit wins:
//   1. leaf identifier
//   2. named group
//   3. variable identifier
// A key that hits none of them resolves to `Unmatched` (not an error).

use crate::taxonomy::TaxonomyIndex;
use std::collections::BTreeSet;

// ============================================================================
// RESOLVED KEY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedKey {
    Leaf {
        leaf: String,
        variables: BTreeSet<String>,
        /// The leaf's own category, when it has one
        implied_category: Option<String>,
    },
    Group {
        group: String,
        variables: BTreeSet<String>,
    },
    Variable {
        variable: String,
    },
    Unmatched,
}

impl ResolvedKey {
    pub fn namespace(&self) -> &'static str {
        match self {
            ResolvedKey::Leaf { .. } => "leaf",
            ResolvedKey::Group { .. } => "group",
            ResolvedKey::Variable { .. } => "variable",
            ResolvedKey::Unmatched => "unmatched",
        }
    }

    /// Target variables, in deterministic order
    pub fn variables(&self) -> Vec<&str> {
        match self {
            ResolvedKey::Leaf { variables, .. } | ResolvedKey::Group { variables, .. } => {
                variables.iter().map(String::as_str).collect()
            }
            ResolvedKey::Variable { variable } => vec![variable.as_str()],
            ResolvedKey::Unmatched => Vec::new(),
        }
    }

    /// Category restriction implied by the key itself (leaf keys only)
    pub fn implied_restriction(&self) -> Option<BTreeSet<String>> {
        match self {
            ResolvedKey::Leaf {
                implied_category: Some(category),
                ..
            } => Some(BTreeSet::from([category.clone()])),
            _ => None,
        }
    }

    pub fn is_match(&self) -> bool {
        !matches!(self, ResolvedKey::Unmatched)
    }
}

// ============================================================================
// KEY RESOLVER
// ============================================================================

/// Resolves keys against a taxonomy, restricted to the variables the caller
/// cares about (e.g. all emission-factor variables of a subsector)
pub struct KeyResolver<'a> {
    taxonomy: &'a dyn TaxonomyIndex,
    variables: &'a BTreeSet<String>,
}

impl<'a> KeyResolver<'a> {
    pub fn new(taxonomy: &'a dyn TaxonomyIndex, variables: &'a BTreeSet<String>) -> Self {
        KeyResolver {
            taxonomy,
            variables,
        }
    }

    pub fn resolve(&self, key: &str) -> ResolvedKey {
        if let Some(vars) = self.taxonomy.variables_of_leaf(key) {
            return ResolvedKey::Leaf {
                leaf: key.to_string(),
                variables: self.in_scope(vars),
                implied_category: self.taxonomy.leaf_category(key).map(str::to_string),
            };
        }

        if let Some(vars) = self.taxonomy.group_variables(key) {
            return ResolvedKey::Group {
                group: key.to_string(),
                variables: self.in_scope(vars),
            };
        }

        if self.taxonomy.is_variable(key) && self.variables.contains(key) {
            return ResolvedKey::Variable {
                variable: key.to_string(),
            };
        }

        ResolvedKey::Unmatched
    }

    fn in_scope(&self, vars: &BTreeSet<String>) -> BTreeSet<String> {
        vars.intersection(self.variables).cloned().collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{Taxonomy, TaxonomyBuilder, VariableDefinition};

    fn taxonomy() -> Taxonomy {
        TaxonomyBuilder::new()
            .leaf("cf4", Some("aluminum"))
            .leaf("sf6", None)
            // "pfc" is both a leaf and a group name
            .leaf("pfc", Some("electronics"))
            .group("pfc", ["cf4"])
            .group("fgas", ["cf4", "sf6"])
            .variable(VariableDefinition::new("ef_cf4", ["aluminum", "electronics"]).with_leaf("cf4"))
            .variable(VariableDefinition::new("ef_sf6", ["electrical"]).with_leaf("sf6"))
            .variable(VariableDefinition::new("ef_pfc_mix", ["electronics"]).with_leaf("pfc"))
            .variable(VariableDefinition::new("ef_co2", ["cement"]))
            .build()
            .unwrap()
    }

    fn all(taxonomy: &Taxonomy) -> BTreeSet<String> {
        taxonomy.all_variables(None)
    }

    #[test]
    fn test_leaf_resolution() {
        let tax = taxonomy();
        let vars = all(&tax);
        let resolver = KeyResolver::new(&tax, &vars);

        let resolved = resolver.resolve("cf4");
        assert_eq!(resolved.namespace(), "leaf");
        assert_eq!(resolved.variables(), vec!["ef_cf4"]);
        assert_eq!(
            resolved.implied_restriction(),
            Some(BTreeSet::from(["aluminum".to_string()]))
        );
    }

    #[test]
    fn test_leaf_wins_over_group() {
        let tax = taxonomy();
        let vars = all(&tax);
        let resolver = KeyResolver::new(&tax, &vars);

        let resolved = resolver.resolve("pfc");
        assert!(matches!(resolved, ResolvedKey::Leaf { .. }));
        assert_eq!(resolved.variables(), vec!["ef_pfc_mix"]);
    }

    #[test]
    fn test_group_resolution_has_no_implied_restriction() {
        let tax = taxonomy();
        let vars = all(&tax);
        let resolver = KeyResolver::new(&tax, &vars);

        let resolved = resolver.resolve("fgas");
        assert_eq!(resolved.namespace(), "group");
        assert_eq!(resolved.variables(), vec!["ef_cf4", "ef_sf6"]);
        assert_eq!(resolved.implied_restriction(), None);
    }

    #[test]
    fn test_variable_resolution() {
        let tax = taxonomy();
        let vars = all(&tax);
        let resolver = KeyResolver::new(&tax, &vars);

        let resolved = resolver.resolve("ef_co2");
        assert_eq!(
            resolved,
            ResolvedKey::Variable {
                variable: "ef_co2".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_key_is_unmatched() {
        let tax = taxonomy();
        let vars = all(&tax);
        let resolver = KeyResolver::new(&tax, &vars);

        let resolved = resolver.resolve("n2o");
        assert_eq!(resolved, ResolvedKey::Unmatched);
        assert!(!resolved.is_match());
        assert!(resolved.variables().is_empty());
    }

    #[test]
    fn test_scope_limits_targets() {
        let tax = taxonomy();
        let scope = BTreeSet::from(["ef_sf6".to_string()]);
        let resolver = KeyResolver::new(&tax, &scope);

        // group still matches but only in-scope variables survive
        assert_eq!(resolver.resolve("fgas").variables(), vec!["ef_sf6"]);

        // leaf matches first and does not fall through, even with nothing in scope
        let leaf = resolver.resolve("cf4");
        assert!(matches!(leaf, ResolvedKey::Leaf { .. }));
        assert!(leaf.variables().is_empty());

        // a real variable outside the caller's scope is not a match
        assert_eq!(resolver.resolve("ef_co2"), ResolvedKey::Unmatched);
    }
}
