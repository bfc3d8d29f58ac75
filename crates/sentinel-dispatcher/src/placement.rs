//! Load-aware queue selection for the legacy multi-instance topology.

/// Index of the queue with the fewest waiting jobs; ties go to the earlier
/// instance so placement is deterministic.
pub fn least_loaded(depths: &[u64]) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (index, &depth) in depths.iter().enumerate() {
        match best {
            Some((_, best_depth)) if depth >= best_depth => {}
            _ => best = Some((index, depth)),
        }
    }
    best.map(|(index, _)| index)
}
