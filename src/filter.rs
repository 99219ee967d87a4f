// 🧮 Category Filter - which categories of a variable actually get transformed
//
// declared ∩ allow-list (if any) ∩ key-implied restriction (if any)

use std::collections::BTreeSet;

/// Caller-level category restriction, shared by every key of one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    allow: Option<BTreeSet<String>>,
}

impl CategoryFilter {
    /// No caller restriction
    pub fn all() -> Self {
        CategoryFilter { allow: None }
    }

    pub fn allow<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CategoryFilter {
            allow: Some(categories.into_iter().map(Into::into).collect()),
        }
    }

    pub fn from_option(allow: Option<BTreeSet<String>>) -> Self {
        CategoryFilter { allow }
    }

    pub fn allow_list(&self) -> Option<&BTreeSet<String>> {
        self.allow.as_ref()
    }

    /// Final category subset; an empty result means "nothing to do here"
    pub fn apply(
        &self,
        declared: &BTreeSet<String>,
        implied: Option<&BTreeSet<String>>,
    ) -> BTreeSet<String> {
        declared
            .iter()
            .filter(|c| self.allow.as_ref().map_or(true, |allow| allow.contains(*c)))
            .filter(|c| implied.map_or(true, |implied| implied.contains(*c)))
            .cloned()
            .collect()
    }
}
