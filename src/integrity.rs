// Path integrity verifier - periodic consistency pass that deactivates
// drained sources and fades tendrils no longer connected to an active one.

use crate::simulation::SimulationState;
use crate::types::{SourceId, TendrilState};

pub(crate) fn verify(state: &mut SimulationState) {
    // Pass 1: drained sources go inactive and drag their tendrils down.
    let mut deactivated: Vec<SourceId> = Vec::new();
    for source in &mut state.sources.sources {
        if source.is_active && source.energy <= 0.0 {
            source.is_active = false;
            deactivated.push(source.id);
        }
    }
    for id in &deactivated {
        for tendril in state.tendrils.values_mut() {
            if tendril.source_id == *id && !tendril.state.is_decaying() {
                tendril.state = TendrilState::Fading;
            }
        }
    }

    // Pass 2: connectivity fixpoint. Each iteration fades tendrils whose
    // anchor (source for roots, parent for branches) is gone or decaying;
    // repeating until quiescence propagates invalidation down branch chains
    // in at most chain-depth passes. The cap bounds it by tendril count.
    let cap = state.tendrils.len() + 1;
    for _ in 0..cap {
        let mut to_fade = Vec::new();
        for (id, tendril) in &state.tendrils {
            if tendril.state.is_decaying() {
                continue;
            }
            let invalid = if tendril.is_branch {
                match tendril.parent.and_then(|p| state.tendrils.get(&p)) {
                    Some(parent) => parent.state.is_decaying(),
                    None => true,
                }
            } else {
                match state.sources.get(tendril.source_id) {
                    Some(source) => !source.is_active || tendril.path[0] != source.pos(),
                    None => true,
                }
            };
            if invalid {
                to_fade.push(*id);
            }
        }
        if to_fade.is_empty() {
            break;
        }
        for id in to_fade {
            if let Some(tendril) = state.tendrils.get_mut(&id) {
                tendril.state = TendrilState::Fading;
            }
        }
    }
}
