use mongodb::bson::oid::ObjectId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

use quizbank_api::services::selection::{shuffle_presentation, stratified_draw};

fn pool_of(size: usize) -> Vec<ObjectId> {
    (0..size).map(|_| ObjectId::new()).collect()
}

#[test]
fn two_uneven_modules_both_contribute() {
    // 5 and 50 unmastered questions, 10 requested: the 5-question module
    // must not be starved by the larger pool.
    let small = pool_of(5);
    let large = pool_of(50);
    let small_set: HashSet<ObjectId> = small.iter().copied().collect();

    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pools = vec![small.clone(), large.clone()];
        let selected = stratified_draw(&mut pools, 10, &mut rng);

        assert_eq!(selected.len(), 10);
        let from_small = selected.iter().filter(|id| small_set.contains(id)).count();
        assert!(
            from_small >= 1,
            "seed {}: small module got no questions",
            seed
        );
    }
}

#[test]
fn quota_splits_evenly_across_equal_modules() {
    let pools_src: Vec<Vec<ObjectId>> = (0..5).map(|_| pool_of(30)).collect();
    let sets: Vec<HashSet<ObjectId>> = pools_src
        .iter()
        .map(|p| p.iter().copied().collect())
        .collect();

    let mut rng = StdRng::seed_from_u64(99);
    let mut pools = pools_src.clone();
    let selected = stratified_draw(&mut pools, 20, &mut rng);

    assert_eq!(selected.len(), 20);
    for (index, set) in sets.iter().enumerate() {
        let share = selected.iter().filter(|id| set.contains(id)).count();
        assert_eq!(share, 4, "module {} did not receive its even share", index);
    }
}

#[test]
fn short_supply_returns_fewer_without_error() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut pools = vec![pool_of(2), pool_of(3)];
    let selected = stratified_draw(&mut pools, 25, &mut rng);

    // Fewer than requested is success, never an error.
    assert_eq!(selected.len(), 5);
}

#[test]
fn exhausted_modules_redirect_quota_to_the_rest() {
    let tiny = pool_of(1);
    let big = pool_of(40);
    let tiny_set: HashSet<ObjectId> = tiny.iter().copied().collect();

    let mut rng = StdRng::seed_from_u64(5);
    let mut pools = vec![tiny, big];
    let selected = stratified_draw(&mut pools, 12, &mut rng);

    assert_eq!(selected.len(), 12);
    assert_eq!(selected.iter().filter(|id| tiny_set.contains(id)).count(), 1);
}

#[test]
fn selection_has_no_duplicates() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pools = vec![pool_of(8), pool_of(13), pool_of(4)];
        let selected = stratified_draw(&mut pools, 20, &mut rng);

        let unique: HashSet<ObjectId> = selected.iter().copied().collect();
        assert_eq!(unique.len(), selected.len(), "seed {}: duplicate drawn", seed);
    }
}

#[test]
fn presentation_shuffle_is_a_permutation() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut selected = pool_of(25);
    let before: HashSet<ObjectId> = selected.iter().copied().collect();

    shuffle_presentation(&mut selected, &mut rng);

    assert_eq!(selected.len(), 25);
    let after: HashSet<ObjectId> = selected.iter().copied().collect();
    assert_eq!(before, after);
}
