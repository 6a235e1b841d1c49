// Signal propagation - pulses travel from source toward tip at a speed
// scaled by per-cell conductivity, and trigger a growth attempt on arrival.

use crate::config::SimConfig;
use crate::simulation::SimulationState;
use crate::types::{SignalState, SourceId, TendrilId};

/// Conductivity of a path cell as a linear function of its age, saturating
/// at `max_cell_age_ticks`. Older, matured cells conduct faster.
pub(crate) fn conductivity(config: &SimConfig, cell_age: u64) -> f32 {
    let age = cell_age.min(config.max_cell_age_ticks) as f32;
    let t = if config.max_cell_age_ticks == 0 {
        1.0
    } else {
        age / config.max_cell_age_ticks as f32
    };
    config.min_conductivity + (config.max_conductivity - config.min_conductivity) * t
}

/// Emit signals from active sources at the configured frequency: every idle
/// root tendril of an emitting source starts propagating from index 0.
pub(crate) fn emit(state: &mut SimulationState, config: &SimConfig, dt_secs: f32) {
    let period = 1.0 / config.tunables.signal_frequency_hz;
    let mut emitting: Vec<SourceId> = Vec::new();
    for source in &mut state.sources.sources {
        if !source.is_active {
            continue;
        }
        source.emission_accum += dt_secs;
        if source.emission_accum >= period {
            source.emission_accum %= period;
            emitting.push(source.id);
        }
    }
    if emitting.is_empty() {
        return;
    }
    for tendril in state.tendrils.values_mut() {
        if tendril.is_branch
            || tendril.signal_state != SignalState::Idle
            || tendril.state.is_decaying()
            || !emitting.contains(&tendril.source_id)
        {
            continue;
        }
        tendril.signal_state = SignalState::Propagating;
        tendril.signal_position = 0.0;
    }
}

enum Advance {
    /// New position, whether the tip was reached, branch cells crossed.
    Moved(f32, bool, Vec<(i32, i32)>),
    /// Stale or out-of-bounds reference; reset the signal.
    Anomaly,
}

/// Advance every propagating signal by one tick. Returns the tendrils whose
/// signal reached the tip, in ascending id order.
pub(crate) fn propagate(
    state: &mut SimulationState,
    config: &SimConfig,
    dt_secs: f32,
) -> Vec<TendrilId> {
    let tick = state.tick;
    let ids: Vec<TendrilId> = state
        .tendrils
        .iter()
        .filter(|(_, t)| t.signal_state == SignalState::Propagating)
        .map(|(id, _)| *id)
        .collect();

    let mut arrivals = Vec::new();
    let mut sibling_wakes: Vec<(TendrilId, (i32, i32))> = Vec::new();

    for id in ids {
        let advance = {
            let Some(t) = state.tendrils.get(&id) else {
                continue;
            };
            let len = t.path.len();
            let idx = t.signal_position.floor() as usize;
            if idx >= len {
                Advance::Anomaly
            } else {
                let pos = t.path[idx];
                match state.grid.get(pos.0, pos.1) {
                    Some(cell) if cell.owner_tendrils.contains(&id) => {
                        let age = tick.saturating_sub(cell.creation_tick);
                        let speed = config.tunables.base_pulse_speed * conductivity(config, age);
                        let new_pos = t.signal_position + speed * dt_secs;
                        let reached = new_pos >= (len - 1) as f32;
                        let last = if reached {
                            len - 1
                        } else {
                            new_pos.floor() as usize
                        };
                        // Cells newly passed this tick; branch points among
                        // them copy the signal onto idle siblings.
                        let mut crossed = Vec::new();
                        for i in (idx + 1)..=last {
                            let cell_pos = t.path[i];
                            let is_branch_point = state
                                .grid
                                .get(cell_pos.0, cell_pos.1)
                                .map_or(false, |c| c.is_branch_point);
                            if is_branch_point {
                                crossed.push(cell_pos);
                            }
                        }
                        Advance::Moved(new_pos, reached, crossed)
                    }
                    _ => Advance::Anomaly,
                }
            }
        };

        match advance {
            Advance::Anomaly => {
                tracing::warn!(tendril = ?id, "signal on stale path cell, resetting");
                if let Some(t) = state.tendrils.get_mut(&id) {
                    t.signal_state = SignalState::Idle;
                    t.signal_position = 0.0;
                }
            }
            Advance::Moved(new_pos, reached, crossed) => {
                for cell_pos in &crossed {
                    if let Some(cell) = state.grid.get(cell_pos.0, cell_pos.1) {
                        for other in &cell.owner_tendrils {
                            if *other != id {
                                sibling_wakes.push((*other, *cell_pos));
                            }
                        }
                    }
                }
                let Some(t) = state.tendrils.get_mut(&id) else {
                    continue;
                };
                if reached {
                    t.signal_position = (t.path.len() - 1) as f32;
                    t.signal_state = SignalState::ReachedTip;
                    arrivals.push(id);
                } else {
                    t.signal_position = new_pos;
                }
            }
        }
    }

    // Apply branch-point copies after the pass so ordering within the tick
    // cannot double-advance a sibling.
    for (sibling_id, cell_pos) in sibling_wakes {
        let Some(sibling) = state.tendrils.get_mut(&sibling_id) else {
            continue;
        };
        if sibling.signal_state != SignalState::Idle || sibling.state.is_decaying() {
            continue;
        }
        if let Some(index) = sibling.index_of(cell_pos) {
            sibling.signal_state = SignalState::Propagating;
            sibling.signal_position = index as f32;
        }
    }

    arrivals
}
