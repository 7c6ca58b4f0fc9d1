use rand::seq::SliceRandom;
use rand::Rng;

/// Stratified draw across per-module candidate pools.
///
/// The quota is spread as evenly as possible over the modules that still
/// have questions left: each round takes up to
/// `ceil(remaining / active_modules)` from every active pool, exhausted
/// pools drop out, and the loop repeats until the quota is filled or every
/// pool is empty. A small module therefore always contributes before a
/// large one can swallow the whole quota. Returns fewer than `quota`
/// items when the pools run dry; callers treat that as success.
pub fn stratified_draw<T>(pools: &mut Vec<Vec<T>>, quota: usize, rng: &mut impl Rng) -> Vec<T> {
    for pool in pools.iter_mut() {
        pool.shuffle(rng);
    }
    pools.retain(|pool| !pool.is_empty());

    let mut selected = Vec::with_capacity(quota);
    let mut remaining = quota;

    while remaining > 0 && !pools.is_empty() {
        let per_module = remaining.div_ceil(pools.len());

        let mut index = 0;
        while index < pools.len() && remaining > 0 {
            let take = per_module.min(pools[index].len()).min(remaining);
            let pool = &mut pools[index];
            selected.extend(pool.drain(pool.len() - take..));
            remaining -= take;

            if pools[index].is_empty() {
                pools.swap_remove(index);
            } else {
                index += 1;
            }
        }
    }

    selected
}

/// Final presentation order is shuffled independently of the per-module
/// draw so a session does not cluster questions by module.
pub fn shuffle_presentation<T>(selected: &mut [T], rng: &mut impl Rng) {
    selected.shuffle(rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn pool(range: std::ops::Range<u32>) -> Vec<u32> {
        range.collect()
    }

    #[test]
    fn fills_quota_evenly_across_modules() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pools = vec![pool(0..20), pool(100..120), pool(200..220), pool(300..320)];

        let selected = stratified_draw(&mut pools, 12, &mut rng);
        assert_eq!(selected.len(), 12);

        // ceil(12 / 4) == 3 from each module
        for base in [0, 100, 200, 300] {
            let from_module = selected
                .iter()
                .filter(|q| **q >= base && **q < base + 100)
                .count();
            assert_eq!(from_module, 3, "module starting at {} was starved", base);
        }
    }

    #[test]
    fn small_module_is_never_starved() {
        // 5 vs 50 unmastered questions, quota 10: the small module must
        // still be represented.
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut pools = vec![pool(0..5), pool(1000..1050)];

            let selected = stratified_draw(&mut pools, 10, &mut rng);
            assert_eq!(selected.len(), 10);

            let from_small = selected.iter().filter(|q| **q < 5).count();
            assert!(from_small >= 1, "seed {}: small module starved", seed);
            assert_eq!(from_small, 5, "seed {}: even split takes all 5", seed);
        }
    }

    #[test]
    fn redistributes_quota_when_a_pool_runs_dry() {
        let mut rng = StdRng::seed_from_u64(3);
        // 2 + 30 available, quota 10: the exhausted module contributes 2
        // and the rest comes from the other pool.
        let mut pools = vec![pool(0..2), pool(100..130)];

        let selected = stratified_draw(&mut pools, 10, &mut rng);
        assert_eq!(selected.len(), 10);
        assert_eq!(selected.iter().filter(|q| **q < 2).count(), 2);
        assert_eq!(selected.iter().filter(|q| **q >= 100).count(), 8);
    }

    #[test]
    fn returns_everything_when_quota_exceeds_supply() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut pools = vec![pool(0..3), pool(10..14)];

        let selected = stratified_draw(&mut pools, 50, &mut rng);
        assert_eq!(selected.len(), 7);

        let unique: HashSet<_> = selected.iter().collect();
        assert_eq!(unique.len(), 7, "no duplicates expected");
    }

    #[test]
    fn empty_pools_yield_empty_selection() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut pools: Vec<Vec<u32>> = vec![Vec::new(), Vec::new()];
        assert!(stratified_draw(&mut pools, 10, &mut rng).is_empty());

        let mut no_pools: Vec<Vec<u32>> = Vec::new();
        assert!(stratified_draw(&mut no_pools, 10, &mut rng).is_empty());
    }

    #[test]
    fn never_selects_the_same_question_twice() {
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut pools = vec![pool(0..7), pool(10..13), pool(20..29)];
            let selected = stratified_draw(&mut pools, 15, &mut rng);

            let unique: HashSet<_> = selected.iter().collect();
            assert_eq!(unique.len(), selected.len());
        }
    }

    #[test]
    fn presentation_shuffle_keeps_the_same_set() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut selected: Vec<u32> = (0..30).collect();
        let before: HashSet<u32> = selected.iter().copied().collect();

        shuffle_presentation(&mut selected, &mut rng);

        let after: HashSet<u32> = selected.iter().copied().collect();
        assert_eq!(before, after);
    }
}
