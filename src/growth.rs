// Tendril growth engine - one discrete growth step per tip arrival, with
// food consumption, collision handling and branching.
//
// Growth decisions are computed against the grid plus the set of cells
// already claimed earlier in the same phase; the actual cell writes are
// batched and applied when the phase ends.

use std::collections::HashSet;

use rand::Rng;

use crate::config::SimConfig;
use crate::grid::{relative_direction, CellKind, CellUpdate, NEIGHBOR_OFFSETS};
use crate::simulation::SimulationState;
use crate::tendril::Tendril;
use crate::types::{TendrilId, TendrilState};

/// Weighted random draw over a positive-weight candidate set.
fn weighted_pick<R: Rng>(candidates: &[((i32, i32), f32)], rng: &mut R) -> Option<(i32, i32)> {
    let total: f32 = candidates.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }
    let mut draw = rng.gen_range(0.0..total);
    for &(pos, w) in candidates {
        if draw < w {
            return Some(pos);
        }
        draw -= w;
    }
    candidates.last().map(|&(pos, _)| pos)
}

/// Empty neighbors of `head` that are legal growth targets: not the previous
/// path cell, not in the path, not adjacent to an older stretch of it, each
/// weighted by its direction relative to the last movement heading.
fn directional_candidates(
    tendril: &Tendril,
    head: (i32, i32),
    prev: Option<(i32, i32)>,
    empties: &[(i32, i32)],
    config: &SimConfig,
) -> Vec<((i32, i32), f32)> {
    let heading = tendril.heading();
    let mut candidates = Vec::new();
    for &n in empties {
        if prev == Some(n) || tendril.contains(n) || tendril.touches_older_path(n) {
            continue;
        }
        let step = (n.0 - head.0, n.1 - head.1);
        let Some(rel) = relative_direction(heading, step) else {
            continue;
        };
        let w = config.tunables.direction_weights[rel];
        if w > 0.0 {
            candidates.push((n, w));
        }
    }
    candidates
}

pub(crate) fn attempt_growth<R: Rng>(
    state: &mut SimulationState,
    config: &SimConfig,
    id: TendrilId,
    claimed: &mut HashSet<(i32, i32)>,
    updates: &mut Vec<CellUpdate>,
    rng: &mut R,
) {
    let tick = state.tick;
    let (head, prev, source_id) = {
        let Some(t) = state.tendrils.get(&id) else {
            return;
        };
        if !matches!(t.state, TendrilState::Growing | TendrilState::Connected) {
            return;
        }
        let prev = if t.path.len() >= 2 {
            Some(t.path[t.path.len() - 2])
        } else {
            None
        };
        (t.head(), prev, t.source_id)
    };

    if !state.grid.within_bounds(head.0, head.1) {
        // Stale head, e.g. after a shrink without reinit. Recover locally.
        tracing::warn!(tendril = ?id, ?head, "growth from out-of-bounds head");
        if let Some(t) = state.tendrils.get_mut(&id) {
            t.mark_blocked(tick);
        }
        return;
    }

    // 1. Affordability: a step the source cannot pay for is rejected.
    if !state.sources.can_afford(source_id, config.cell_energy_cost) {
        if let Some(t) = state.tendrils.get_mut(&id) {
            t.mark_blocked(tick);
        }
        return;
    }

    // 2. Classify the 8 neighbors. Cells claimed earlier this phase count
    // as occupied.
    let mut food_target: Option<(i32, i32)> = None;
    let mut collision: Option<((i32, i32), TendrilId)> = None;
    let mut empties: Vec<(i32, i32)> = Vec::new();
    for off in NEIGHBOR_OFFSETS {
        let n = (head.0 + off.0, head.1 + off.1);
        if claimed.contains(&n) {
            continue;
        }
        let Some(cell) = state.grid.get(n.0, n.1) else {
            continue;
        };
        match cell.kind {
            CellKind::Food => {
                if food_target.is_none() {
                    food_target = Some(n);
                }
            }
            CellKind::Tendril => {
                if cell.owner_source != Some(source_id) && collision.is_none() {
                    let other = cell.owner_tendrils.iter().copied().find(|oid| {
                        state
                            .tendrils
                            .get(oid)
                            .map_or(false, |o| !o.state.is_decaying())
                    });
                    if let Some(other) = other {
                        collision = Some((n, other));
                    }
                }
            }
            CellKind::Empty => empties.push(n),
            CellKind::Source => {}
        }
    }

    // 3a. Food takes priority: grow onto the cell and digest it.
    if let Some(target) = food_target {
        if !state.sources.try_spend(source_id, config.cell_energy_cost, tick) {
            if let Some(t) = state.tendrils.get_mut(&id) {
                t.mark_blocked(tick);
            }
            return;
        }
        match state.food.consume(target) {
            Some(gained) => state.sources.credit(source_id, gained, tick),
            None => {
                tracing::warn!(?target, "food cell without a pellet record");
            }
        }
        claimed.insert(target);
        updates.push(CellUpdate::OccupyTendril {
            pos: target,
            tendril: id,
            source: source_id,
            tick,
        });
        if let Some(t) = state.tendrils.get_mut(&id) {
            t.path.push(target);
        }
        return;
    }

    // 3b. Collision with another source's tendril: both become Connected.
    if let Some((target, other_id)) = collision {
        if !state.sources.try_spend(source_id, config.cell_energy_cost, tick) {
            if let Some(t) = state.tendrils.get_mut(&id) {
                t.mark_blocked(tick);
            }
            return;
        }
        claimed.insert(target);
        updates.push(CellUpdate::AddOwner { pos: target, tendril: id });
        updates.push(CellUpdate::MarkConnectionPoint { pos: target });
        if let Some(t) = state.tendrils.get_mut(&id) {
            t.path.push(target);
            t.state = TendrilState::Connected;
        }
        if let Some(other) = state.tendrils.get_mut(&other_id) {
            if !other.state.is_decaying() {
                other.state = TendrilState::Connected;
            }
        }
        return;
    }

    // 3c. Weighted directional growth over the empty neighbors.
    let target = {
        let Some(t) = state.tendrils.get(&id) else {
            return;
        };
        let candidates = directional_candidates(t, head, prev, &empties, config);
        weighted_pick(&candidates, rng)
    };
    let Some(target) = target else {
        if let Some(t) = state.tendrils.get_mut(&id) {
            t.mark_blocked(tick);
        }
        return;
    };

    // 4. Commit.
    if !state.sources.try_spend(source_id, config.cell_energy_cost, tick) {
        if let Some(t) = state.tendrils.get_mut(&id) {
            t.mark_blocked(tick);
        }
        return;
    }
    claimed.insert(target);
    updates.push(CellUpdate::OccupyTendril {
        pos: target,
        tendril: id,
        source: source_id,
        tick,
    });
    if let Some(t) = state.tendrils.get_mut(&id) {
        t.path.push(target);
    }

    // 5. Branch attempt, gated on path length, a Bernoulli draw and energy.
    attempt_branch(state, config, id, head, target, claimed, updates, rng);
}

#[allow(clippy::too_many_arguments)]
fn attempt_branch<R: Rng>(
    state: &mut SimulationState,
    config: &SimConfig,
    id: TendrilId,
    branch_point: (i32, i32),
    growth_target: (i32, i32),
    claimed: &mut HashSet<(i32, i32)>,
    updates: &mut Vec<CellUpdate>,
    rng: &mut R,
) {
    let tick = state.tick;
    {
        let Some(t) = state.tendrils.get(&id) else {
            return;
        };
        if t.state != TendrilState::Growing || t.path.len() < config.min_branch_path_len {
            return;
        }
    }
    if rng.gen::<f32>() >= config.tunables.branch_probability {
        return;
    }
    if !state.sources.can_afford(
        state.tendrils[&id].source_id,
        config.cell_energy_cost,
    ) {
        return;
    }

    let target = {
        let t = &state.tendrils[&id];
        let heading = t.heading();
        let mut candidates = Vec::new();
        for off in NEIGHBOR_OFFSETS {
            let n = (branch_point.0 + off.0, branch_point.1 + off.1);
            if n == growth_target || claimed.contains(&n) || t.contains(n) {
                continue;
            }
            let is_empty = state
                .grid
                .get(n.0, n.1)
                .map_or(false, |c| c.kind == CellKind::Empty);
            if !is_empty {
                continue;
            }
            let Some(rel) = relative_direction(heading, off) else {
                continue;
            };
            let w = config.tunables.direction_weights[rel];
            if w > 0.0 {
                candidates.push((n, w));
            }
        }
        weighted_pick(&candidates, rng)
    };
    let Some(target) = target else { return };

    let source_id = state.tendrils[&id].source_id;
    if !state.sources.try_spend(source_id, config.cell_energy_cost, tick) {
        return;
    }
    let branch_id = state.ids.tendril();
    let branch = {
        let parent = &state.tendrils[&id];
        Tendril::branch(branch_id, parent, branch_point, target, tick)
    };
    claimed.insert(target);
    updates.push(CellUpdate::OccupyTendril {
        pos: target,
        tendril: branch_id,
        source: source_id,
        tick,
    });
    // The branch-point cell is jointly owned by parent and child.
    updates.push(CellUpdate::AddOwner {
        pos: branch_point,
        tendril: branch_id,
    });
    updates.push(CellUpdate::MarkBranchPoint { pos: branch_point });
    state.tendrils.insert(branch_id, branch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn weighted_pick_with_single_candidate_is_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..32 {
            assert_eq!(weighted_pick(&[((3, 4), 1.0)], &mut rng), Some((3, 4)));
        }
    }

    #[test]
    fn weighted_pick_rejects_zero_total() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(weighted_pick(&[], &mut rng), None);
    }
}
