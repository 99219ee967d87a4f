// 🌳 Taxonomy Index - leaf identifiers, named groups, variables by category
//
// Three namespaces, each queried by exact key:
// - leaf:     finest-grained entity (e.g. a single gas), optionally tied to a category
// - group:    closed, named set of leaves (e.g. "pfc")
// - variable: quantity defined per category, referencing one or more leaves
//
// Built once, then read-only. Reverse indexes (leaf → variables,
// group → variables) are computed at construction time.

use crate::error::{Result, TransformError};
use anyhow::Context as AnyhowContext;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Placeholder replaced by the variable id in a column template
pub const TEMPLATE_VARIABLE: &str = "{var}";

/// Placeholder replaced by the category in a column template
pub const TEMPLATE_CATEGORY: &str = "{cat}";

fn default_field_template() -> String {
    format!("{}_{}", TEMPLATE_VARIABLE, TEMPLATE_CATEGORY)
}

// ============================================================================
// TAXONOMY INDEX (read-only contract)
// ============================================================================

/// Read-only lookups the resolution engine needs. Absence is `None`, never an error.
pub trait TaxonomyIndex: Send + Sync {
    /// Declared categories of a variable
    fn categories_of(&self, variable: &str) -> Option<&BTreeSet<String>>;

    /// Variables referencing a leaf. `None` means the key is not a leaf.
    fn variables_of_leaf(&self, leaf: &str) -> Option<&BTreeSet<String>>;

    /// The leaf's own category, if it has one
    fn leaf_category(&self, leaf: &str) -> Option<&str>;

    /// Variables reachable through a named group. `None` means the key is not a group.
    fn group_variables(&self, group: &str) -> Option<&BTreeSet<String>>;

    /// All variables, optionally restricted to one namespace (e.g. a subsector)
    fn all_variables(&self, namespace: Option<&str>) -> BTreeSet<String>;

    /// Table column holding `variable` for `category`
    fn field_name(&self, variable: &str, category: &str) -> Option<String>;

    fn is_variable(&self, variable: &str) -> bool {
        self.categories_of(variable).is_some()
    }
}

// ============================================================================
// DEFINITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafDefinition {
    pub id: String,

    /// Category implied when a magnitude key names this leaf
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    pub leaves: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub id: String,

    /// Categories the variable is defined over
    pub categories: BTreeSet<String>,

    /// Leaves this variable references
    #[serde(default)]
    pub leaves: BTreeSet<String>,

    /// Optional namespace tag (e.g. the subsector that owns the variable)
    #[serde(default)]
    pub namespace: Option<String>,

    /// Column template; `{var}` and `{cat}` are substituted
    #[serde(default = "default_field_template")]
    pub field_template: String,
}

impl VariableDefinition {
    pub fn new<I, S>(id: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VariableDefinition {
            id: id.into(),
            categories: categories.into_iter().map(Into::into).collect(),
            leaves: BTreeSet::new(),
            namespace: None,
            field_template: default_field_template(),
        }
    }

    /// Builder: reference a leaf
    pub fn with_leaf(mut self, leaf: impl Into<String>) -> Self {
        self.leaves.insert(leaf.into());
        self
    }

    /// Builder: set namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Builder: set column template
    pub fn with_field_template(mut self, template: impl Into<String>) -> Self {
        self.field_template = template.into();
        self
    }

    pub fn field_name(&self, category: &str) -> String {
        self.field_template
            .replace(TEMPLATE_VARIABLE, &self.id)
            .replace(TEMPLATE_CATEGORY, category)
    }
}

/// On-disk shape of a taxonomy file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyDefinition {
    #[serde(default)]
    pub leaves: Vec<LeafDefinition>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
}

// ============================================================================
// TAXONOMY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    leaves: BTreeMap<String, LeafDefinition>,
    groups: BTreeMap<String, GroupDefinition>,
    variables: BTreeMap<String, VariableDefinition>,

    leaf_to_variables: BTreeMap<String, BTreeSet<String>>,
    group_to_variables: BTreeMap<String, BTreeSet<String>>,
}

impl Taxonomy {
    /// Build and validate a taxonomy from its definition
    pub fn from_definition(definition: TaxonomyDefinition) -> Result<Self> {
        let mut taxonomy = Taxonomy::default();

        for leaf in definition.leaves {
            if taxonomy.leaves.contains_key(&leaf.id) {
                return Err(TransformError::taxonomy(format!("duplicate leaf '{}'", leaf.id)));
            }
            taxonomy.leaves.insert(leaf.id.clone(), leaf);
        }

        for group in definition.groups {
            if taxonomy.groups.contains_key(&group.name) {
                return Err(TransformError::taxonomy(format!("duplicate group '{}'", group.name)));
            }
            taxonomy.groups.insert(group.name.clone(), group);
        }

        for variable in definition.variables {
            if taxonomy.variables.contains_key(&variable.id) {
                return Err(TransformError::taxonomy(format!(
                    "duplicate variable '{}'",
                    variable.id
                )));
            }
            taxonomy.variables.insert(variable.id.clone(), variable);
        }

        taxonomy.validate()?;
        taxonomy.build_indexes();

        Ok(taxonomy)
    }

    /// Load a taxonomy from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read taxonomy file: {:?}", path.as_ref()))?;

        let definition: TaxonomyDefinition =
            serde_json::from_str(&content).context("Failed to parse taxonomy JSON")?;

        Ok(Taxonomy::from_definition(definition)?)
    }

    /// Reject references to undeclared leaves and variables without categories
    pub fn validate(&self) -> Result<()> {
        for group in self.groups.values() {
            if let Some(leaf) = group.leaves.iter().find(|l| !self.leaves.contains_key(*l)) {
                return Err(TransformError::taxonomy(format!(
                    "group '{}' references undeclared leaf '{}'",
                    group.name, leaf
                )));
            }
        }

        for variable in self.variables.values() {
            if variable.categories.is_empty() {
                return Err(TransformError::taxonomy(format!(
                    "variable '{}' declares no categories",
                    variable.id
                )));
            }
            if let Some(leaf) = variable.leaves.iter().find(|l| !self.leaves.contains_key(*l)) {
                return Err(TransformError::taxonomy(format!(
                    "variable '{}' references undeclared leaf '{}'",
                    variable.id, leaf
                )));
            }
            if !variable.field_template.contains(TEMPLATE_CATEGORY) && variable.categories.len() > 1 {
                return Err(TransformError::taxonomy(format!(
                    "variable '{}' has several categories but its field template lacks {}",
                    variable.id, TEMPLATE_CATEGORY
                )));
            }
        }

        Ok(())
    }

    fn build_indexes(&mut self) {
        self.leaf_to_variables = self
            .leaves
            .keys()
            .map(|leaf| (leaf.clone(), BTreeSet::new()))
            .collect();

        for variable in self.variables.values() {
            for leaf in &variable.leaves {
                if let Some(vars) = self.leaf_to_variables.get_mut(leaf) {
                    vars.insert(variable.id.clone());
                }
            }
        }

        self.group_to_variables = self
            .groups
            .values()
            .map(|group| {
                let vars = group
                    .leaves
                    .iter()
                    .filter_map(|leaf| self.leaf_to_variables.get(leaf))
                    .flatten()
                    .cloned()
                    .collect();
                (group.name.clone(), vars)
            })
            .collect();
    }

    pub fn variable(&self, id: &str) -> Option<&VariableDefinition> {
        self.variables.get(id)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }
}

impl TaxonomyIndex for Taxonomy {
    fn categories_of(&self, variable: &str) -> Option<&BTreeSet<String>> {
        self.variables.get(variable).map(|v| &v.categories)
    }

    fn variables_of_leaf(&self, leaf: &str) -> Option<&BTreeSet<String>> {
        self.leaf_to_variables.get(leaf)
    }

    fn leaf_category(&self, leaf: &str) -> Option<&str> {
        self.leaves.get(leaf).and_then(|l| l.category.as_deref())
    }

    fn group_variables(&self, group: &str) -> Option<&BTreeSet<String>> {
        self.group_to_variables.get(group)
    }

    fn all_variables(&self, namespace: Option<&str>) -> BTreeSet<String> {
        self.variables
            .values()
            .filter(|v| namespace.map_or(true, |ns| v.namespace.as_deref() == Some(ns)))
            .map(|v| v.id.clone())
            .collect()
    }

    fn field_name(&self, variable: &str, category: &str) -> Option<String> {
        self.variables.get(variable).map(|v| v.field_name(category))
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Incremental construction, mostly for tests and embedding callers
#[derive(Debug, Default)]
pub struct TaxonomyBuilder {
    definition: TaxonomyDefinition,
}

impl TaxonomyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf(mut self, id: impl Into<String>, category: Option<&str>) -> Self {
        self.definition.leaves.push(LeafDefinition {
            id: id.into(),
            category: category.map(str::to_string),
        });
        self
    }

    pub fn group<I, S>(mut self, name: impl Into<String>, leaves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition.groups.push(GroupDefinition {
            name: name.into(),
            leaves: leaves.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn variable(mut self, variable: VariableDefinition) -> Self {
        self.definition.variables.push(variable);
        self
    }

    pub fn build(self) -> Result<Taxonomy> {
        Taxonomy::from_definition(self.definition)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Taxonomy {
        TaxonomyBuilder::new()
            .leaf("cf4", Some("aluminum"))
            .leaf("sf6", None)
            .leaf("hfc23", None)
            .group("pfc", ["cf4"])
            .group("other_fc", ["sf6", "hfc23"])
            .variable(
                VariableDefinition::new("ef_cf4", ["aluminum", "electronics"])
                    .with_leaf("cf4")
                    .with_namespace("ippu"),
            )
            .variable(
                VariableDefinition::new("ef_sf6", ["electronics", "electrical"])
                    .with_leaf("sf6")
                    .with_namespace("ippu"),
            )
            .variable(
                VariableDefinition::new("ef_hfc23", ["chemicals"])
                    .with_leaf("hfc23")
                    .with_field_template("ef_ippu_tonne_hfc23_per_tonne_{cat}"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_reverse_indexes() {
        let taxonomy = sample();

        let vars = taxonomy.variables_of_leaf("cf4").unwrap();
        assert_eq!(vars.iter().collect::<Vec<_>>(), vec!["ef_cf4"]);

        let group = taxonomy.group_variables("other_fc").unwrap();
        assert!(group.contains("ef_sf6"));
        assert!(group.contains("ef_hfc23"));
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_absence_is_not_found() {
        let taxonomy = sample();

        assert!(taxonomy.variables_of_leaf("co2").is_none());
        assert!(taxonomy.group_variables("hfc").is_none());
        assert!(taxonomy.categories_of("ef_co2").is_none());
        assert!(!taxonomy.is_variable("ef_co2"));
        assert_eq!(taxonomy.leaf_category("sf6"), None);
        assert_eq!(taxonomy.leaf_category("cf4"), Some("aluminum"));
    }

    #[test]
    fn test_all_variables_by_namespace() {
        let taxonomy = sample();

        assert_eq!(taxonomy.all_variables(None).len(), 3);

        let ippu = taxonomy.all_variables(Some("ippu"));
        assert_eq!(ippu.len(), 2);
        assert!(!ippu.contains("ef_hfc23"));
    }

    #[test]
    fn test_field_names() {
        let taxonomy = sample();

        assert_eq!(
            taxonomy.field_name("ef_cf4", "aluminum"),
            Some("ef_cf4_aluminum".to_string())
        );
        assert_eq!(
            taxonomy.field_name("ef_hfc23", "chemicals"),
            Some("ef_ippu_tonne_hfc23_per_tonne_chemicals".to_string())
        );
        assert_eq!(taxonomy.field_name("ef_co2", "chemicals"), None);
    }

    #[test]
    fn test_rejects_undeclared_leaf() {
        let err = TaxonomyBuilder::new()
            .leaf("cf4", None)
            .group("pfc", ["cf4", "c2f6"])
            .build()
            .unwrap_err();

        assert!(matches!(err, TransformError::Taxonomy { .. }));
        assert!(err.to_string().contains("c2f6"));
    }

    #[test]
    fn test_rejects_duplicates_and_empty_categories() {
        let dup = TaxonomyBuilder::new()
            .leaf("cf4", None)
            .leaf("cf4", None)
            .build();
        assert!(dup.is_err());

        let empty = TaxonomyBuilder::new()
            .variable(VariableDefinition::new("ef_x", Vec::<String>::new()))
            .build();
        assert!(empty.is_err());
    }

    #[test]
    fn test_from_json_definition() {
        let json = r#"{
            "leaves": [{"id": "cf4", "category": "aluminum"}, {"id": "sf6"}],
            "groups": [{"name": "pfc", "leaves": ["cf4"]}],
            "variables": [
                {"id": "ef_cf4", "categories": ["aluminum"], "leaves": ["cf4"]}
            ]
        }"#;

        let definition: TaxonomyDefinition = serde_json::from_str(json).unwrap();
        let taxonomy = Taxonomy::from_definition(definition).unwrap();

        assert_eq!(taxonomy.leaf_count(), 2);
        assert_eq!(taxonomy.group_count(), 1);
        assert_eq!(taxonomy.variable_count(), 1);
        assert_eq!(
            taxonomy.variable("ef_cf4").unwrap().field_template,
            "{var}_{cat}"
        );
        // sf6 is a leaf nothing references
        assert!(taxonomy.variables_of_leaf("sf6").unwrap().is_empty());
    }
}
