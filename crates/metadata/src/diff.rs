//! NEVRA diff sets for differential import
//!
//! A media refresh compares the NEVRA set already in the catalog with
//! the set in the newly fetched blob, then deletes and inserts only the
//! difference. An unchanged remote therefore touches zero rows.

use std::collections::HashSet;

/// Minimum-change plan between catalog state and a new metadata blob
#[derive(Debug, Clone, Default)]
pub struct DiffPlan {
    /// In the catalog but not in the new blob
    pub to_delete: Vec<String>,
    /// In the new blob but not in the catalog
    pub to_insert: HashSet<String>,
    pub unchanged: usize,
}

impl DiffPlan {
    /// Compute the plan. `old` is the catalog's NEVRA set for the media,
    /// `new` the set scanned out of the fresh blob.
    #[must_use]
    pub fn compute<I, J>(old: I, new: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        let old: HashSet<String> = old.into_iter().collect();
        let new: HashSet<String> = new.into_iter().collect();

        let to_delete: Vec<String> = old.difference(&new).cloned().collect();
        let unchanged = old.len() - to_delete.len();
        let to_insert: HashSet<String> = new.difference(&old).cloned().collect();

        Self {
            to_delete,
            to_insert,
            unchanged,
        }
    }

    /// True when the refresh would change nothing
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }

    /// True when the catalog side was empty (first ingestion): the
    /// caller should use bulk mode instead of row-by-row changes.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.unchanged == 0 && self.to_delete.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn computes_minimum_change() {
        let plan = DiffPlan::compute(s(&["a-1", "b-1"]), s(&["a-1", "c-1"]));
        assert_eq!(plan.to_delete, vec!["b-1".to_string()]);
        assert!(plan.to_insert.contains("c-1"));
        assert_eq!(plan.to_insert.len(), 1);
        assert_eq!(plan.unchanged, 1);
        assert!(!plan.is_noop());
        assert!(!plan.is_initial());
    }

    #[test]
    fn unchanged_remote_is_noop() {
        let plan = DiffPlan::compute(s(&["a-1", "b-1"]), s(&["b-1", "a-1"]));
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged, 2);
    }

    #[test]
    fn first_ingestion_is_initial() {
        let plan = DiffPlan::compute(Vec::new(), s(&["a-1"]));
        assert!(plan.is_initial());
        assert_eq!(plan.to_insert.len(), 1);
    }
}
