//! Which psalms take part in the rotation.
//!
//! Every consumer that needs to know whether a psalm is readable (the
//! scheduler, statistics, front ends) goes through this module.

use crate::config::DEFAULT_MAX_READABLE_VERSES;
use crate::psalm::Psalm;

/// Imprecatory psalms. Curated by content, never derived.
pub const IMPRECATORY_PSALMS: [i32; 24] = [
    5, 10, 17, 28, 31, 35, 40, 52, 54, 55, 56, 58, 59, 69, 70, 71, 79, 83, 94, 109, 129, 137, 140,
    143,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityFilter {
    max_verses: i32,
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_READABLE_VERSES)
    }
}

impl EligibilityFilter {
    pub fn new(max_verses: i32) -> Self {
        Self { max_verses }
    }

    pub fn max_verses(&self) -> i32 {
        self.max_verses
    }

    pub fn is_excluded(psalm_id: i32) -> bool {
        IMPRECATORY_PSALMS.contains(&psalm_id)
    }

    pub fn is_readable(&self, psalm: &Psalm) -> bool {
        psalm.total_verses <= self.max_verses && !Self::is_excluded(psalm.id)
    }

    /// Readable subset, ordered by psalm id.
    pub fn eligible<'a, I>(&self, psalms: I) -> Vec<Psalm>
    where
        I: IntoIterator<Item = &'a Psalm>,
    {
        let mut eligible: Vec<Psalm> = psalms
            .into_iter()
            .filter(|psalm| self.is_readable(psalm))
            .cloned()
            .collect();
        eligible.sort_by_key(|psalm| psalm.id);
        eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psalm(id: i32, verses: i32) -> Psalm {
        Psalm::new(id, format!("Psalm {id}"), verses, None, [""; 0], [""; 0]).unwrap()
    }

    #[test]
    fn ceiling_is_inclusive() {
        let filter = EligibilityFilter::default();
        assert!(filter.is_readable(&psalm(23, 30)));
        assert!(!filter.is_readable(&psalm(119, 31)));
    }

    #[test]
    fn imprecatory_psalms_are_excluded() {
        let filter = EligibilityFilter::default();
        assert!(!filter.is_readable(&psalm(137, 9)));
        assert!(!filter.is_readable(&psalm(5, 12)));
    }

    #[test]
    fn eligible_is_sorted_and_filtered() {
        let filter = EligibilityFilter::new(20);
        let psalms = vec![psalm(42, 11), psalm(35, 10), psalm(1, 6), psalm(120, 25)];
        let ids: Vec<i32> = filter.eligible(&psalms).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 42]);
    }
}
