use rand::{Rng, RngCore};
use std::collections::HashMap;

use crate::psalm::Psalm;

/// Tiers larger than this are sampled uniformly instead of taking the first member.
const DETERMINISTIC_TIER_SIZE: usize = 2;

pub fn read_count(read_counts: &HashMap<i32, usize>, psalm: &Psalm) -> usize {
    read_counts.get(&psalm.id).copied().unwrap_or(0)
}

/// Picks from the least-read tier of `candidates`.
///
/// A tier of one or two psalms yields its first member in the supplied order;
/// a larger tier yields a uniformly random member.
pub fn select_least_read<'a>(
    candidates: &[&'a Psalm],
    read_counts: &HashMap<i32, usize>,
    rng: &mut dyn RngCore,
) -> Option<&'a Psalm> {
    let fewest = candidates
        .iter()
        .map(|psalm| read_count(read_counts, psalm))
        .min()?;
    let tier: Vec<&'a Psalm> = candidates
        .iter()
        .copied()
        .filter(|psalm| read_count(read_counts, psalm) == fewest)
        .collect();

    if tier.len() <= DETERMINISTIC_TIER_SIZE {
        return tier.first().copied();
    }
    let index = rng.random_range(0..tier.len());
    tier.get(index).copied()
}

pub fn select_by_theme<'a>(
    candidates: &[&'a Psalm],
    read_counts: &HashMap<i32, usize>,
    theme: &str,
    rng: &mut dyn RngCore,
) -> Option<&'a Psalm> {
    let matching = filter(candidates, |psalm| psalm.has_theme(theme));
    select_least_read(&matching, read_counts, rng)
}

/// Type match first, then theme, then epigraph.
pub fn select_by_type_theme_or_epigraph<'a>(
    candidates: &[&'a Psalm],
    read_counts: &HashMap<i32, usize>,
    tag: &str,
    rng: &mut dyn RngCore,
) -> Option<&'a Psalm> {
    let by_type = filter(candidates, |psalm| psalm.has_type(tag));
    if let Some(psalm) = select_least_read(&by_type, read_counts, rng) {
        return Some(psalm);
    }

    let by_theme = filter(candidates, |psalm| psalm.has_theme(tag));
    if let Some(psalm) = select_least_read(&by_theme, read_counts, rng) {
        return Some(psalm);
    }

    let by_epigraph = filter(candidates, |psalm| psalm.has_epigraph(tag));
    select_least_read(&by_epigraph, read_counts, rng)
}

fn filter<'a, F>(candidates: &[&'a Psalm], predicate: F) -> Vec<&'a Psalm>
where
    F: Fn(&Psalm) -> bool,
{
    candidates
        .iter()
        .copied()
        .filter(|psalm| predicate(psalm))
        .collect()
}
