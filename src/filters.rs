use crate::catalog::Class;
use serde::Deserialize;

/// View-side narrowing of the unassigned pool. Never consulted by placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassFilter {
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub generation: Option<String>,
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ClassFilter {
    pub fn matches(&self, class: &Class) -> bool {
        attr_matches(self.degree.as_deref(), class.degree.as_deref())
            && attr_matches(self.generation.as_deref(), class.generation.as_deref())
            && attr_matches(self.shift.as_deref(), class.shift.as_deref())
            && self.search_matches(class)
    }

    fn search_matches(&self, class: &Class) -> bool {
        let Some(needle) = non_blank(self.search.as_deref()) else {
            return true;
        };
        let needle = needle.to_lowercase();
        [
            Some(class.id.0.as_str()),
            Some(class.name.as_str()),
            class.code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|hay| hay.to_lowercase().contains(&needle))
    }
}

// A blank filter value means "any".
fn attr_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match non_blank(wanted) {
        None => true,
        Some(w) => actual.is_some_and(|a| a.trim().eq_ignore_ascii_case(w)),
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}
